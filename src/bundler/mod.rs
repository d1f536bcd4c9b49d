//! Release tooling: settings, collaborators and the release pipeline.
//!
//! The pipeline lives in [`builder`]; everything it delegates to an external
//! tool sits behind a trait in [`collaborators`].

pub mod builder;
pub mod collaborators;
pub mod error;
pub mod settings;
pub mod utils;

pub use builder::{CandidateStage, Rejection, ReleaseSummary, Releasifier};
pub use error::{Error, Result};
pub use settings::{Settings, SettingsBuilder};
