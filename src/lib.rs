//! Release packager for update-aware applications.
//!
//! This library turns a packaged application into release artifacts:
//! - reads package archives and their manifests ([`metadata`])
//! - decodes, extracts and regenerates single-file bundles ([`bundle`])
//! - keeps the `RELEASES` manifest of full and delta packages ([`releases`])
//! - runs the validate, post-process and publish pipeline ([`bundler`])
//!
//! It can be used both as a CLI tool and as a library dependency.

pub mod bundle;
pub mod bundler;
pub mod cli;
pub mod error;
pub mod metadata;
pub mod releases;
pub mod source;

// Re-export commonly used types
pub use error::{CliError, ReleasifyError, Result};
