//! Command line interface for the release packager.
//!
//! Parses flags, layers them over the optional config file, locks the
//! release directory and runs the pipeline.

mod args;

pub use args::Args;

use crate::{
    bundler::{
        Releasifier, ReleaseSummary,
        collaborators::Collaborators,
        settings::{CONFIG_FILE_NAME, ReleaseConfig},
        utils::lock::DirLock,
    },
    error::{CliError, Result},
    source::PackageSource,
};
use std::path::{Path, PathBuf};

/// Exit code when at least one candidate was rejected.
pub const EXIT_REJECTED: i32 = 2;

/// Main CLI entry point
pub async fn run(args: Args) -> Result<i32> {
    args.validate()?;

    let config = load_config(&args)?;
    let settings = args
        .settings_builder(config.as_ref().map(|(c, dir)| (c.clone(), dir.as_path())))
        .build()?;

    let source = PackageSource::parse(&args.package)?;
    let _lock = DirLock::acquire(settings.release_dir())?;
    let collaborators = Collaborators::from_settings(&settings)?;
    let summary = Releasifier::new(settings, collaborators)
        .releasify(&source)
        .await?;

    report(&summary);
    Ok(if summary.is_clean() { 0 } else { EXIT_REJECTED })
}

/// Parse arguments without executing (for testing)
pub fn parse_args() -> Args {
    Args::parse_args()
}

fn load_config(args: &Args) -> Result<Option<(ReleaseConfig, PathBuf)>> {
    if let Some(path) = &args.config {
        if !path.is_file() {
            return Err(CliError::InvalidArguments {
                reason: format!("config file {} does not exist", path.display()),
            }
            .into());
        }
        let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        return Ok(Some((ReleaseConfig::load(path)?, dir)));
    }
    let discovered = ReleaseConfig::discover(&args.release_dir)?;
    if discovered.is_some() {
        log::info!(
            "Using {} from {}",
            CONFIG_FILE_NAME,
            args.release_dir.display()
        );
    }
    Ok(discovered.map(|c| (c, args.release_dir.clone())))
}

fn report(summary: &ReleaseSummary) {
    for entry in &summary.published {
        let kind = if entry.is_delta { "delta" } else { "full" };
        println!("published {kind} {} ({} bytes)", entry.filename, entry.filesize);
    }
    for rejection in &summary.rejected {
        eprintln!(
            "rejected {} after it was {}: {}",
            rejection.package.display(),
            rejection.stage,
            rejection.error
        );
    }
    if let Some(path) = &summary.manifest_path {
        println!("updated {}", path.display());
    }
}
