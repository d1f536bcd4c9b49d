//! Configuration for release runs.
//!
//! [`Settings`] is built once through [`SettingsBuilder`], optionally seeded
//! from a [`ReleaseConfig`] file, and passed down to every stage.

mod arch;
mod builder;
mod config;
mod core;

pub use arch::{
    ARCHITECTURE_PREFERENCE, ArchitectureResolution, ArchitectureWarning, RuntimeCpu,
    resolve_architecture,
};
pub use builder::SettingsBuilder;
pub use config::{CONFIG_FILE_NAME, ReleaseConfig, RetryConfig};
pub use self::core::{DEFAULT_UPDATER_NAME, Settings};
