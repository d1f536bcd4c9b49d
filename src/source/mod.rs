//! Input package staging and candidate discovery.

use crate::{
    bundler::{
        error::{Error, ErrorExt, Result},
        utils::fs::{RetryPolicy, copy_file},
    },
    metadata::archive::PACKAGE_EXTENSION,
};
use std::path::{Path, PathBuf};

/// A package handed to a release run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageSource {
    path: PathBuf,
}

impl PackageSource {
    /// Accepts a path to an existing `.nupkg` file.
    pub fn parse(input: impl AsRef<Path>) -> Result<Self> {
        let path = input.as_ref();
        if !has_package_extension(path) {
            return Err(Error::validation(format!(
                "package must be packed with nuget and end in '{PACKAGE_EXTENSION}': {}",
                path.display()
            )));
        }
        if !path.is_file() {
            return Err(Error::validation(format!(
                "package {} does not exist",
                path.display()
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copies the package into `release_dir` and returns the copy's path.
    ///
    /// A package already inside `release_dir` is left where it is.
    pub async fn stage(&self, release_dir: &Path, retry: RetryPolicy) -> Result<PathBuf> {
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| Error::validation(format!("{} has no file name", self.path.display())))?;
        let target = release_dir.join(file_name);

        let same = match (self.path.canonicalize(), target.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };
        if !same {
            log::debug!("Copying {} into {}", self.path.display(), release_dir.display());
            copy_file(&self.path, &target, retry).await?;
        }
        Ok(target)
    }
}

/// Packages in `release_dir` that still need releasing, sorted by name.
///
/// Already produced `-full` and `-delta` packages are skipped.
pub fn discover_candidates(release_dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/*{PACKAGE_EXTENSION}",
        glob::Pattern::escape(&release_dir.to_string_lossy())
    );
    let options = glob::MatchOptions {
        case_sensitive: false,
        ..Default::default()
    };
    let paths = glob::glob_with(&pattern, options)
        .map_err(|e| Error::validation(format!("bad release directory `{}`: {e}", release_dir.display())))?;

    let mut candidates = Vec::new();
    for path in paths {
        let path = path
            .map_err(glob::GlobError::into_error)
            .fs_context("listing release directory", release_dir)?;
        if path.is_file() && is_candidate(&path) {
            candidates.push(path);
        }
    }
    candidates.sort();
    Ok(candidates)
}

fn is_candidate(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    !name.contains("-delta") && !name.contains("-full")
}

fn has_package_extension(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.to_ascii_lowercase().ends_with(PACKAGE_EXTENSION))
}
