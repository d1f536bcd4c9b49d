//! Release pipeline.
//!
//! This module provides the [`Releasifier`] orchestrator that takes each
//! candidate package in a release directory from discovery to publication.
//!
//! # Overview
//!
//! For every candidate the pipeline:
//! 1. Extracts the archive into a scoped temp directory
//! 2. Validates its layout ([`validation`])
//! 3. Stamps architecture, creates stubs, signs and places icons ([`content`])
//! 4. Repacks it as a full release and, when a base exists, a delta
//!
//! Published artifacts are hashed ([`checksum`]) and merged into `RELEASES`
//! once every artifact is on disk.
//!
//! # Module Organization
//!
//! - [`checksum`] - SHA-1 and SHA-256 helpers
//! - [`content`] - Content post-processing of a validated package
//! - [`orchestrator`] - [`Releasifier`] and the per-candidate state machine
//! - [`signing`] - Bounded worker pool and binary signing
//! - [`validation`] - Structural package checks

pub mod checksum;
pub mod content;
pub mod orchestrator;
pub mod signing;
pub mod validation;

pub use orchestrator::{CandidateStage, Rejection, ReleaseSummary, Releasifier};
