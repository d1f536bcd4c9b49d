//! Builder for constructing Settings.

use super::{DEFAULT_UPDATER_NAME, ReleaseConfig, Settings};
use crate::bundler::{Error, utils::fs::RetryPolicy};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use url::Url;

/// Builder for constructing [`Settings`].
///
/// Only the release directory is required. Values set directly on the builder
/// win over values merged in from a [`ReleaseConfig`].
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    release_dir: Option<PathBuf>,
    base_url: Option<String>,
    generate_deltas: Option<bool>,
    allow_unaware: Option<bool>,
    setup_icon: Option<PathBuf>,
    app_icon: Option<PathBuf>,
    splash_image: Option<PathBuf>,
    required_frameworks: Option<Vec<String>>,
    updater_path: Option<PathBuf>,
    updater_name: Option<String>,
    stub_template: Option<PathBuf>,
    sign_template: Option<String>,
    worker_count: Option<usize>,
    retry_attempts: Option<u32>,
    retry_delay: Option<Duration>,
}

impl SettingsBuilder {
    /// Creates a new settings builder.
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the release directory.
    ///
    /// # Required
    ///
    /// This field is required for building.
    pub fn release_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.release_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the base URL written in front of release filenames.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Enables or disables delta packages.
    ///
    /// Default: true
    pub fn generate_deltas(mut self, enabled: bool) -> Self {
        self.generate_deltas = Some(enabled);
        self
    }

    /// Accepts packages without update-aware executables.
    ///
    /// Default: false
    pub fn allow_unaware(mut self, allow: bool) -> Self {
        self.allow_unaware = Some(allow);
        self
    }

    /// Sets the setup icon.
    pub fn setup_icon<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.setup_icon = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the application icon.
    pub fn app_icon<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.app_icon = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the splash image.
    pub fn splash_image<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.splash_image = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the runtime ids the application requires.
    pub fn required_frameworks(mut self, frameworks: Vec<String>) -> Self {
        self.required_frameworks = Some(frameworks);
        self
    }

    /// Sets the updater bundle.
    pub fn updater_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.updater_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the updater file name.
    ///
    /// Default: `Squirrel.exe`
    pub fn updater_name(mut self, name: impl Into<String>) -> Self {
        self.updater_name = Some(name.into());
        self
    }

    /// Sets the launcher stub template.
    pub fn stub_template<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.stub_template = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the sign command template.
    pub fn sign_template(mut self, template: impl Into<String>) -> Self {
        self.sign_template = Some(template.into());
        self
    }

    /// Sets the worker pool size.
    ///
    /// Default: number of logical CPUs
    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = Some(count);
        self
    }

    /// Sets the retry policy for contended filesystem operations.
    ///
    /// Default: 4 attempts, 500ms apart
    pub fn retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = Some(attempts);
        self.retry_delay = Some(delay);
        self
    }

    /// Fills every unset field from `config`.
    ///
    /// Relative paths in the file are resolved against `config_dir`.
    pub fn merge_config(mut self, config: ReleaseConfig, config_dir: &Path) -> Self {
        let resolve = |p: PathBuf| {
            if p.is_absolute() {
                p
            } else {
                config_dir.join(p)
            }
        };

        self.release_dir = self.release_dir.or(config.release_dir.map(resolve));
        self.base_url = self.base_url.or(config.base_url);
        self.generate_deltas = self.generate_deltas.or(config.generate_deltas);
        self.allow_unaware = self.allow_unaware.or(config.allow_unaware);
        self.setup_icon = self.setup_icon.or(config.setup_icon.map(resolve));
        self.app_icon = self.app_icon.or(config.app_icon.map(resolve));
        self.splash_image = self.splash_image.or(config.splash_image.map(resolve));
        self.required_frameworks = self.required_frameworks.or(config.required_frameworks);
        self.updater_path = self.updater_path.or(config.updater.map(resolve));
        self.updater_name = self.updater_name.or(config.updater_name);
        self.stub_template = self.stub_template.or(config.stub_template.map(resolve));
        self.sign_template = self.sign_template.or(config.sign_template);
        self.worker_count = self.worker_count.or(config.workers);
        if let Some(retry) = config.retry {
            self.retry_attempts = self.retry_attempts.or(retry.attempts);
            self.retry_delay = self
                .retry_delay
                .or(retry.delay_ms.map(Duration::from_millis));
        }
        self
    }

    /// Builds the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if `release_dir` is missing or the base URL does not
    /// parse.
    pub fn build(self) -> crate::bundler::Result<Settings> {
        use crate::bundler::error::Context;

        let base_url = self
            .base_url
            .filter(|u| !u.trim().is_empty())
            .map(|u| parse_base_url(&u))
            .transpose()?;

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            attempts: self.retry_attempts.unwrap_or(defaults.attempts),
            delay: self.retry_delay.unwrap_or(defaults.delay),
        };

        Ok(Settings::new(
            self.release_dir.context("release_dir is required")?,
            base_url,
            self.generate_deltas.unwrap_or(true),
            self.allow_unaware.unwrap_or(false),
            self.setup_icon,
            self.app_icon,
            self.splash_image,
            self.required_frameworks.unwrap_or_default(),
            self.updater_path,
            self.updater_name
                .unwrap_or_else(|| DEFAULT_UPDATER_NAME.to_string()),
            self.stub_template,
            self.sign_template,
            self.worker_count.unwrap_or_else(num_cpus::get),
            retry,
        ))
    }
}

/// Parses a base URL, ensuring it ends with `/` so filenames join under it.
fn parse_base_url(raw: &str) -> crate::bundler::Result<Url> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    Url::parse(&raw).map_err(|e| Error::validation(format!("invalid base url `{raw}`: {e}")))
}
