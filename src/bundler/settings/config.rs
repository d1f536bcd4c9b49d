//! Optional `releasify.toml` configuration file.

use crate::bundler::{Error, Result, error::ErrorExt};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Name of the config file looked up in the release directory.
pub const CONFIG_FILE_NAME: &str = "releasify.toml";

/// Retry table of the config file.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    pub attempts: Option<u32>,
    pub delay_ms: Option<u64>,
}

/// Every key is optional; unset keys fall back to builder defaults.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReleaseConfig {
    pub release_dir: Option<PathBuf>,
    pub base_url: Option<String>,
    pub generate_deltas: Option<bool>,
    pub allow_unaware: Option<bool>,
    pub setup_icon: Option<PathBuf>,
    pub app_icon: Option<PathBuf>,
    pub splash_image: Option<PathBuf>,
    pub required_frameworks: Option<Vec<String>>,
    pub updater: Option<PathBuf>,
    pub updater_name: Option<String>,
    pub stub_template: Option<PathBuf>,
    pub sign_template: Option<String>,
    pub workers: Option<usize>,
    pub retry: Option<RetryConfig>,
}

impl ReleaseConfig {
    /// Reads and parses a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).fs_context("reading config", path)?;
        toml::from_str(&text)
            .map_err(|e| Error::validation(format!("invalid config `{}`: {e}", path.display())))
    }

    /// Loads `releasify.toml` from `dir` when present.
    pub fn discover(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.is_file() {
            log::debug!("Using config {}", path.display());
            Self::load(&path).map(Some)
        } else {
            Ok(None)
        }
    }
}
