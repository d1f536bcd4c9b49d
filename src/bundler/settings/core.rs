//! Core Settings struct and implementations.

use crate::bundler::utils::fs::RetryPolicy;
use std::path::{Path, PathBuf};
use url::Url;

/// File name the updater is published under inside `lib/<framework>`.
pub const DEFAULT_UPDATER_NAME: &str = "Squirrel.exe";

/// Settings for a releasify run.
///
/// Constructed via [`SettingsBuilder`](super::SettingsBuilder) and immutable
/// afterwards.
///
/// # Examples
///
/// ```no_run
/// use kodegen_releasify::bundler::SettingsBuilder;
///
/// # fn example() -> kodegen_releasify::bundler::Result<()> {
/// let settings = SettingsBuilder::new()
///     .release_dir("Releases")
///     .generate_deltas(false)
///     .worker_count(2)
///     .build()?;
/// assert_eq!(settings.worker_count(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Settings {
    /// Directory holding published packages and the `RELEASES` file.
    release_dir: PathBuf,

    /// Prefix written in front of each filename in `RELEASES`.
    base_url: Option<Url>,

    /// Produce delta packages against the previous full release.
    generate_deltas: bool,

    /// Accept packages without update-aware executables.
    allow_unaware: bool,

    /// Icon for the installer and the updater.
    setup_icon: Option<PathBuf>,

    /// Icon placed in the package as `app.ico`.
    app_icon: Option<PathBuf>,

    /// Image shown while installing.
    splash_image: Option<PathBuf>,

    /// Runtime ids the application needs installed.
    required_frameworks: Vec<String>,

    /// Single-file updater bundle copied into every package.
    updater_path: Option<PathBuf>,

    /// File name the updater is published under.
    updater_name: String,

    /// Launcher stub executable template.
    stub_template: Option<PathBuf>,

    /// Sign command with a `{{file}}` placeholder.
    sign_template: Option<String>,

    /// Bound on concurrent signing and stub work.
    worker_count: usize,

    /// Retry policy for contended filesystem operations.
    retry: RetryPolicy,
}

impl Settings {
    /// Returns the release directory.
    pub fn release_dir(&self) -> &Path {
        &self.release_dir
    }

    /// Returns the base URL for release entries.
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Whether delta packages are produced.
    pub fn generate_deltas(&self) -> bool {
        self.generate_deltas
    }

    /// Whether packages without update-aware executables are accepted.
    pub fn allow_unaware(&self) -> bool {
        self.allow_unaware
    }

    /// Returns the setup icon path.
    pub fn setup_icon(&self) -> Option<&Path> {
        self.setup_icon.as_deref()
    }

    /// Returns the explicit application icon path.
    pub fn app_icon(&self) -> Option<&Path> {
        self.app_icon.as_deref()
    }

    /// Returns the splash image path.
    pub fn splash_image(&self) -> Option<&Path> {
        self.splash_image.as_deref()
    }

    /// Returns the required runtime ids.
    pub fn required_frameworks(&self) -> &[String] {
        &self.required_frameworks
    }

    /// Returns the updater bundle path.
    pub fn updater_path(&self) -> Option<&Path> {
        self.updater_path.as_deref()
    }

    /// Returns the updater file name.
    pub fn updater_name(&self) -> &str {
        &self.updater_name
    }

    /// Returns the launcher stub template.
    pub fn stub_template(&self) -> Option<&Path> {
        self.stub_template.as_deref()
    }

    /// Returns the sign command template.
    pub fn sign_template(&self) -> Option<&str> {
        self.sign_template.as_deref()
    }

    /// Returns the worker pool size (at least 1).
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Returns the filesystem retry policy.
    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Creates a new Settings instance (used by SettingsBuilder).
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        release_dir: PathBuf,
        base_url: Option<Url>,
        generate_deltas: bool,
        allow_unaware: bool,
        setup_icon: Option<PathBuf>,
        app_icon: Option<PathBuf>,
        splash_image: Option<PathBuf>,
        required_frameworks: Vec<String>,
        updater_path: Option<PathBuf>,
        updater_name: String,
        stub_template: Option<PathBuf>,
        sign_template: Option<String>,
        worker_count: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            release_dir,
            base_url,
            generate_deltas,
            allow_unaware,
            setup_icon,
            app_icon,
            splash_image,
            required_frameworks,
            updater_path,
            updater_name,
            stub_template,
            sign_template,
            worker_count: worker_count.max(1),
            retry,
        }
    }
}
