//! Release pipeline orchestration.
//!
//! This module provides the [`Releasifier`] that drives every candidate in a
//! release directory through validation, content processing and publishing,
//! then records the published artifacts in the `RELEASES` file.

use super::{
    content::process_content,
    validation::validate_package_contents,
};
use crate::{
    bundle::{is_single_file_bundle, update_bundle_icon},
    bundler::{
        Error, Result, Settings,
        collaborators::Collaborators,
        error::ErrorExt,
        utils::fs::{copy_file, remove_file},
    },
    metadata::PackageArchive,
    releases::{RELEASES_FILE_NAME, ReleaseEntry, load_from_dir, select_base},
    source::{PackageSource, discover_candidates},
};
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

/// How far a candidate got before it was published or rejected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CandidateStage {
    Discovered,
    Validated,
    ContentProcessed,
    Published,
}

impl fmt::Display for CandidateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Discovered => "discovered",
            Self::Validated => "validated",
            Self::ContentProcessed => "content processed",
            Self::Published => "published",
        })
    }
}

/// A candidate that failed with a format or validation error.
#[derive(Debug)]
pub struct Rejection {
    /// The candidate archive, left untouched.
    pub package: PathBuf,
    /// Last stage the candidate completed.
    pub stage: CandidateStage,
    pub error: Error,
}

/// Result of one release run.
#[derive(Debug, Default)]
pub struct ReleaseSummary {
    /// Entries added to the manifest, in publish order.
    pub published: Vec<ReleaseEntry>,
    pub rejected: Vec<Rejection>,
    /// Manifest written by this run, `None` when nothing was published.
    pub manifest_path: Option<PathBuf>,
}

impl ReleaseSummary {
    /// Whether every candidate was published.
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Release pipeline orchestrator.
///
/// Candidates are processed one at a time in file name order; only per-file
/// work inside a candidate runs concurrently.
///
/// # Examples
///
/// ```no_run
/// use kodegen_releasify::bundler::{Releasifier, SettingsBuilder, collaborators::Collaborators};
/// use kodegen_releasify::source::PackageSource;
///
/// # async fn example() -> kodegen_releasify::bundler::Result<()> {
/// let settings = SettingsBuilder::new().release_dir("Releases").build()?;
/// let collaborators = Collaborators::from_settings(&settings)?;
/// let releasifier = Releasifier::new(settings, collaborators);
///
/// let summary = releasifier
///     .releasify(&PackageSource::parse("MyApp.1.0.0.nupkg")?)
///     .await?;
/// println!("Published {} releases", summary.published.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Releasifier {
    settings: Settings,
    collaborators: Collaborators,
}

impl Releasifier {
    /// Creates a pipeline with explicit collaborators.
    pub fn new(settings: Settings, collaborators: Collaborators) -> Self {
        Self {
            settings,
            collaborators,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Stages `source` into the release directory and releases every
    /// pending candidate found there.
    ///
    /// # Errors
    ///
    /// Format and validation failures of a single candidate are collected in
    /// [`ReleaseSummary::rejected`]. Any other failure aborts the run before
    /// the manifest is written.
    pub async fn releasify(&self, source: &PackageSource) -> Result<ReleaseSummary> {
        let release_dir = self.settings.release_dir();
        tokio::fs::create_dir_all(release_dir)
            .await
            .fs_context("creating release directory", release_dir)?;

        let work = tempfile::tempdir().fs_context("creating temp directory", std::env::temp_dir())?;
        let updater = self.prepare_updater(work.path()).await?;

        source.stage(release_dir, self.settings.retry()).await?;
        let candidates = discover_candidates(release_dir)?;
        let previous = load_from_dir(release_dir)?;
        log::info!(
            "Found {} candidate(s) in {}",
            candidates.len(),
            release_dir.display()
        );

        let mut to_publish: Vec<PathBuf> = Vec::new();
        let mut consumed = Vec::new();
        let mut summary = ReleaseSummary::default();

        for candidate in candidates {
            let mut stage = CandidateStage::Discovered;
            match self
                .release_candidate(&candidate, previous.entries(), updater.as_deref(), &mut stage)
                .await
            {
                Ok(outputs) => {
                    for output in outputs {
                        if is_delta_artifact(&output) {
                            to_publish.insert(0, output);
                        } else {
                            to_publish.push(output);
                        }
                    }
                    consumed.push(candidate);
                }
                Err(error) if error.is_rejection() => {
                    log::error!(
                        "Rejected {} after it was {stage}: {error}",
                        candidate.display()
                    );
                    summary.rejected.push(Rejection {
                        package: candidate,
                        stage,
                        error,
                    });
                }
                Err(error) => return Err(error),
            }
        }

        for original in &consumed {
            remove_file(original, self.settings.retry()).await?;
        }

        if to_publish.is_empty() {
            log::info!("Nothing published, {} left unchanged", RELEASES_FILE_NAME);
            return Ok(summary);
        }

        let base_url = self.settings.base_url().cloned();
        let entries = blocking(move || {
            to_publish
                .iter()
                .map(|path| ReleaseEntry::generate_from_file(path, base_url.as_ref()))
                .collect::<Result<Vec<_>>>()
        })
        .await?;

        let manifest_path = release_dir.join(RELEASES_FILE_NAME);
        previous.merged_with(&entries).save(&manifest_path)?;
        log::info!(
            "Wrote {} with {} new entr{}",
            manifest_path.display(),
            entries.len(),
            if entries.len() == 1 { "y" } else { "ies" }
        );

        summary.published = entries;
        summary.manifest_path = Some(manifest_path);
        Ok(summary)
    }

    /// Copies the configured updater into `work`, re-iconed and signed.
    async fn prepare_updater(&self, work: &Path) -> Result<Option<PathBuf>> {
        let Some(source) = self.settings.updater_path() else {
            log::warn!("No updater configured, released packages will not carry one");
            return Ok(None);
        };
        if !is_single_file_bundle(source)? {
            return Err(Error::validation(format!(
                "updater {} is not a single-file bundle",
                source.display()
            )));
        }

        let prepared = work.join(self.settings.updater_name());
        match (self.settings.setup_icon(), &self.collaborators.resource_editor) {
            (Some(icon), Some(editor)) => {
                let (source, dest, icon, editor) =
                    (source.to_path_buf(), prepared.clone(), icon.to_path_buf(), Arc::clone(editor));
                blocking(move || update_bundle_icon(&source, &dest, &icon, editor.as_ref())).await?;
            }
            (Some(_), None) => {
                log::warn!("No resource editor available, the updater keeps its original icon");
                copy_file(source, &prepared, self.settings.retry()).await?;
            }
            (None, _) => copy_file(source, &prepared, self.settings.retry()).await?,
        }

        if let Some(signer) = &self.collaborators.signer {
            let (signer, path) = (Arc::clone(signer), prepared.clone());
            blocking(move || signer.sign(&path)).await?;
        }
        Ok(Some(prepared))
    }

    /// Runs one candidate through the pipeline and returns the artifacts it
    /// wrote, delta (if any) first.
    async fn release_candidate(
        &self,
        candidate: &Path,
        previous: &[ReleaseEntry],
        updater: Option<&Path>,
        stage: &mut CandidateStage,
    ) -> Result<Vec<PathBuf>> {
        log::info!("Releasifying {}", candidate.display());
        let work = tempfile::tempdir().fs_context("creating temp directory", std::env::temp_dir())?;
        let root = work.path().join("package");

        let archive = {
            let (candidate, root) = (candidate.to_path_buf(), root.clone());
            blocking(move || {
                let archive = PackageArchive::open(&candidate)?;
                archive.extract_to(&root)?;
                Ok(archive)
            })
            .await?
        };
        let metadata = archive.metadata();

        let validated = validate_package_contents(
            &root,
            self.settings.allow_unaware(),
            self.collaborators.inspector.as_ref(),
        )?;
        *stage = CandidateStage::Validated;

        process_content(
            &validated,
            metadata,
            &self.settings,
            &self.collaborators,
            updater,
        )
        .await?;
        *stage = CandidateStage::ContentProcessed;

        let release_dir = self.settings.release_dir();
        let full_path = release_dir.join(ReleaseEntry::suggested_filename(
            &metadata.id,
            &metadata.version,
            false,
        ));
        {
            let (root, full_path) = (root.clone(), full_path.clone());
            blocking(move || PackageArchive::create_from_directory(&root, &full_path)).await?;
        }
        log::info!("Wrote full release {}", full_path.display());

        let mut outputs = vec![full_path.clone()];
        match self.build_delta(&metadata.id, &metadata.version, previous, &full_path).await {
            Ok(Some(delta)) => outputs.insert(0, delta),
            Ok(None) => {}
            Err(e) => {
                // Leave no half-published candidate behind.
                remove_file(&full_path, self.settings.retry()).await?;
                return Err(e);
            }
        }
        *stage = CandidateStage::Published;
        Ok(outputs)
    }

    async fn build_delta(
        &self,
        id: &str,
        version: &semver::Version,
        previous: &[ReleaseEntry],
        full_path: &Path,
    ) -> Result<Option<PathBuf>> {
        if !self.settings.generate_deltas() {
            return Ok(None);
        }
        let same_app: Vec<ReleaseEntry> = previous
            .iter()
            .filter(|e| e.package_id.eq_ignore_ascii_case(id))
            .cloned()
            .collect();
        let Some(base) = select_base(&same_app, version) else {
            log::debug!("No earlier full release of {id}, publishing {version} as full only");
            return Ok(None);
        };
        let base_path = self.settings.release_dir().join(&base.filename);
        if !base_path.is_file() {
            log::warn!(
                "Base release {} is listed but missing, skipping delta",
                base_path.display()
            );
            return Ok(None);
        }
        let Some(builder) = &self.collaborators.delta_builder else {
            log::warn!("No delta builder configured, skipping delta against {}", base.version);
            return Ok(None);
        };

        let delta_path = self
            .settings
            .release_dir()
            .join(ReleaseEntry::suggested_filename(id, version, true));
        log::info!("Building delta {} -> {version}", base.version);
        let (builder, new, output) = (Arc::clone(builder), full_path.to_path_buf(), delta_path.clone());
        blocking(move || builder.create_delta(&base_path, &new, &output)).await?;
        Ok(Some(delta_path))
    }
}

fn is_delta_artifact(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.to_ascii_lowercase().ends_with("-delta.nupkg"))
}

async fn blocking<T, F>(op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| Error::GenericError(format!("blocking task panicked: {e}")))?
}
