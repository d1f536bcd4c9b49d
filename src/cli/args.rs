//! Command line argument parsing and validation.
//!
//! Flags map one-to-one onto [`SettingsBuilder`] setters; anything left
//! unset falls back to `releasify.toml` and then to built-in defaults.

use crate::{
    bundler::{SettingsBuilder, settings::ReleaseConfig},
    error::CliError,
};
use clap::Parser;
use std::path::{Path, PathBuf};

/// Release packager for update-aware applications
#[derive(Parser, Debug, Clone)]
#[command(
    name = "kodegen_releasify",
    version,
    about = "Turns a packaged application into full and delta releases",
    long_about = "Validates a .nupkg built from an application's output, post-processes its content
(architecture stamping, launcher stubs, signing, updater and icons), writes full and
delta release packages into the release directory and updates the RELEASES file.

Usage:
  kodegen_releasify --package MyApp.1.2.0.nupkg
  kodegen_releasify --package MyApp.1.2.0.nupkg --release-dir dist --base-url https://cdn.example.com/myapp
  kodegen_releasify --package MyApp.1.2.0.nupkg --sign-template 'signtool sign /a {{file}}'

Exit code 0 = every candidate published, 2 = some candidates were rejected."
)]
pub struct Args {
    /// Package to release (.nupkg)
    #[arg(short, long, value_name = "PACKAGE")]
    pub package: PathBuf,

    /// Directory holding published releases and the RELEASES file
    #[arg(short = 'r', long, value_name = "DIR", default_value = "Releases")]
    pub release_dir: PathBuf,

    /// URL prefix written in front of each file name in RELEASES
    #[arg(short = 'b', long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Do not produce delta packages
    #[arg(long)]
    pub no_delta: bool,

    /// Accept packages without update-aware executables
    #[arg(long)]
    pub allow_unaware: bool,

    /// Icon for the setup and the updater
    #[arg(short, long, value_name = "ICO")]
    pub icon: Option<PathBuf>,

    /// Icon placed into the package as app.ico
    #[arg(long, value_name = "ICO")]
    pub app_icon: Option<PathBuf>,

    /// Image shown while installing
    #[arg(long, value_name = "IMAGE")]
    pub splash_image: Option<PathBuf>,

    /// Runtime ids the application needs, comma separated
    #[arg(short = 'f', long = "framework", value_name = "RUNTIMES", value_delimiter = ',')]
    pub frameworks: Vec<String>,

    /// Single-file updater bundle copied into every package
    #[arg(long, value_name = "EXE")]
    pub updater: Option<PathBuf>,

    /// Launcher stub template executable
    #[arg(long, value_name = "EXE")]
    pub stub: Option<PathBuf>,

    /// Sign command, `{{file}}` is replaced by the binary to sign
    #[arg(short = 'n', long, value_name = "COMMAND", env = "RELEASIFY_SIGN_TEMPLATE")]
    pub sign_template: Option<String>,

    /// Concurrent signing and stub workers (default: CPU count)
    #[arg(short = 'j', long, value_name = "N")]
    pub workers: Option<usize>,

    /// Configuration file (default: <release-dir>/releasify.toml)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), CliError> {
        let invalid = |reason: String| Err(CliError::InvalidArguments { reason });

        if self.package.as_os_str().is_empty() {
            return Err(CliError::MissingArgument {
                argument: "--package".to_string(),
            });
        }
        if self.workers == Some(0) {
            return invalid("--workers must be at least 1".to_string());
        }
        if let Some(template) = &self.sign_template
            && !template.contains("{{file}}")
        {
            return invalid(format!("Sign template must contain {{{{file}}}}: {template}"));
        }
        if self.frameworks.iter().any(|f| f.trim().is_empty()) {
            return invalid("Framework list contains an empty entry".to_string());
        }
        Ok(())
    }

    /// Settings builder carrying every flag that was given.
    ///
    /// `config` fills whatever the flags leave unset; its relative paths
    /// resolve against `config_dir`.
    pub fn settings_builder(&self, config: Option<(ReleaseConfig, &Path)>) -> SettingsBuilder {
        let mut builder = SettingsBuilder::new().release_dir(&self.release_dir);

        if let Some(url) = &self.base_url {
            builder = builder.base_url(url.clone());
        }
        if self.no_delta {
            builder = builder.generate_deltas(false);
        }
        if self.allow_unaware {
            builder = builder.allow_unaware(true);
        }
        if let Some(icon) = &self.icon {
            builder = builder.setup_icon(icon);
        }
        if let Some(icon) = &self.app_icon {
            builder = builder.app_icon(icon);
        }
        if let Some(image) = &self.splash_image {
            builder = builder.splash_image(image);
        }
        if !self.frameworks.is_empty() {
            let frameworks = self.frameworks.iter().map(|f| f.trim().to_string()).collect();
            builder = builder.required_frameworks(frameworks);
        }
        if let Some(updater) = &self.updater {
            builder = builder.updater_path(updater);
        }
        if let Some(stub) = &self.stub {
            builder = builder.stub_template(stub);
        }
        if let Some(template) = &self.sign_template {
            builder = builder.sign_template(template.clone());
        }
        if let Some(workers) = self.workers {
            builder = builder.worker_count(workers);
        }

        match config {
            Some((config, dir)) => builder.merge_config(config, dir),
            None => builder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["kodegen_releasify", "--package", "App.1.0.0.nupkg"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults() {
        let args = args(&[]);
        assert_eq!(args.release_dir, PathBuf::from("Releases"));
        assert!(!args.no_delta);
        assert!(args.frameworks.is_empty());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn frameworks_split_on_commas() {
        let args = args(&["--framework", "net6,vcredist143"]);
        assert_eq!(args.frameworks, vec!["net6", "vcredist143"]);
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(args(&["--workers", "0"]).validate().is_err());
        assert!(args(&["--sign-template", "signtool sign"]).validate().is_err());
        assert!(args(&["--sign-template", "signtool sign {{file}}"]).validate().is_ok());
    }

    #[test]
    fn empty_package_is_a_missing_argument() {
        let mut args = args(&[]);
        args.package = PathBuf::new();
        assert!(matches!(
            args.validate(),
            Err(CliError::MissingArgument { ref argument }) if argument == "--package"
        ));
    }

    #[test]
    fn flags_win_over_config() {
        let config: ReleaseConfig = toml::from_str(
            "generate_deltas = true\nworkers = 7\nupdater_name = \"Update.exe\"\n",
        )
        .unwrap();
        let settings = args(&["--no-delta", "--workers", "2"])
            .settings_builder(Some((config, Path::new("/cfg"))))
            .build()
            .unwrap();
        assert!(!settings.generate_deltas());
        assert_eq!(settings.worker_count(), 2);
        assert_eq!(settings.updater_name(), "Update.exe");
    }
}
