//! Structural checks on an extracted candidate package.

use crate::{
    bundler::{Error, Result, collaborators::BinaryInspector, error::ErrorExt},
    metadata::archive::{LIB_DIRECTORY, MANIFEST_EXTENSION},
};
use std::path::{Path, PathBuf};

/// Marker that identifies a ClickOnce deployment manifest.
const CLICKONCE_MARKER: &str = "clickonce";

/// A package that passed validation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidatedPackage {
    /// Root of the extracted contents.
    pub root: PathBuf,
    /// The single top-level manifest.
    pub manifest_path: PathBuf,
    /// The single `lib/<framework>` directory.
    pub lib_dir: PathBuf,
    /// Update-aware executables directly inside `lib_dir`.
    pub aware_executables: Vec<PathBuf>,
}

/// Checks the extracted package at `root`.
///
/// # Errors
///
/// [`Error::Validation`] naming the violated constraint when:
/// - there is not exactly one top-level manifest
/// - `lib` does not contain exactly one framework directory
/// - no update-aware executable exists and `allow_unaware` is false
/// - a `.application` manifest declares a ClickOnce deployment
pub fn validate_package_contents(
    root: &Path,
    allow_unaware: bool,
    inspector: &dyn BinaryInspector,
) -> Result<ValidatedPackage> {
    let manifests = list(root, |p| p.is_file() && has_extension(p, MANIFEST_EXTENSION))?;
    let manifest_path = exactly_one(manifests, "*.nuspec manifest in the top level directory")?;

    let lib_root = root.join(LIB_DIRECTORY);
    if !lib_root.is_dir() {
        return Err(Error::validation("package has no 'lib' folder"));
    }
    let lib_dirs = list(&lib_root, |p| p.is_dir())?;
    let lib_dir = exactly_one(lib_dirs, "framework folder inside 'lib'")?;

    let executables = list(&lib_dir, |p| p.is_file() && has_extension(p, ".exe"))?;
    let mut aware_executables = Vec::new();
    for exe in executables {
        if inspector.is_update_aware(&exe)? {
            log::debug!("{} is update-aware", exe.display());
            aware_executables.push(exe);
        }
    }
    if aware_executables.is_empty() {
        if allow_unaware {
            log::warn!("Package has no update-aware executables; continuing because unaware packages are allowed");
        } else {
            return Err(Error::validation(
                "there are no update-aware executables in the package. Mark an executable \
                 as update-aware in its assembly manifest, or allow unaware packages to \
                 skip this check (not recommended)",
            ));
        }
    }

    for application in list(&lib_dir, |p| p.is_file() && has_extension(p, ".application"))? {
        let text = std::fs::read(&application).fs_context("reading deployment manifest", &application)?;
        if String::from_utf8_lossy(&text)
            .to_ascii_lowercase()
            .contains(CLICKONCE_MARKER)
        {
            return Err(Error::validation(format!(
                "{} is a ClickOnce deployment manifest; publish the application to a \
                 folder without ClickOnce",
                application.display()
            )));
        }
    }

    Ok(ValidatedPackage {
        root: root.to_path_buf(),
        manifest_path,
        lib_dir,
        aware_executables,
    })
}

fn list(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).fs_context("listing directory", dir)? {
        let path = entry.fs_context("listing directory", dir)?.path();
        if keep(&path) {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

fn exactly_one(mut found: Vec<PathBuf>, what: &str) -> Result<PathBuf> {
    match found.len() {
        1 => Ok(found.remove(0)),
        0 => Err(Error::validation(format!("package has no {what}"))),
        n => {
            let names: Vec<String> = found
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect();
            Err(Error::validation(format!(
                "package has {n} of {what}, expected exactly one: {}",
                names.join(", ")
            )))
        }
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.to_ascii_lowercase().ends_with(extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Treats files whose content starts with "aware" as update-aware.
    struct ContentInspector;

    impl BinaryInspector for ContentInspector {
        fn machine(&self, _path: &Path) -> Result<Option<u16>> {
            Ok(None)
        }
        fn is_windowed(&self, _path: &Path) -> Result<bool> {
            Ok(false)
        }
        fn is_update_aware(&self, path: &Path) -> Result<bool> {
            Ok(std::fs::read(path)?.starts_with(b"aware"))
        }
    }

    fn package() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib").join("net6.0");
        std::fs::create_dir_all(&lib).unwrap();
        std::fs::write(dir.path().join("App.nuspec"), "<package/>").unwrap();
        std::fs::write(lib.join("App.exe"), "aware").unwrap();
        std::fs::write(lib.join("Helper.exe"), "plain").unwrap();
        dir
    }

    #[test]
    fn accepts_well_formed_package() {
        let dir = package();
        let validated = validate_package_contents(dir.path(), false, &ContentInspector).unwrap();
        assert_eq!(validated.manifest_path, dir.path().join("App.nuspec"));
        assert!(validated.lib_dir.ends_with("net6.0"));
        assert_eq!(
            validated.aware_executables,
            vec![dir.path().join("lib/net6.0/App.exe")]
        );
    }

    #[test]
    fn manifest_count_must_be_one() {
        let dir = package();
        std::fs::write(dir.path().join("Other.nuspec"), "<package/>").unwrap();
        let err = validate_package_contents(dir.path(), false, &ContentInspector).unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m.contains("nuspec") && m.contains("exactly one")));

        let dir = package();
        std::fs::remove_file(dir.path().join("App.nuspec")).unwrap();
        let err = validate_package_contents(dir.path(), false, &ContentInspector).unwrap_err();
        assert!(err.to_string().contains("no *.nuspec"));
    }

    #[test]
    fn lib_must_hold_one_framework() {
        let dir = package();
        std::fs::create_dir_all(dir.path().join("lib").join("net48")).unwrap();
        let err = validate_package_contents(dir.path(), false, &ContentInspector).unwrap_err();
        assert!(err.to_string().contains("framework folder"));

        let dir = package();
        std::fs::remove_dir_all(dir.path().join("lib")).unwrap();
        let err = validate_package_contents(dir.path(), true, &ContentInspector).unwrap_err();
        assert!(err.to_string().contains("'lib'"));
    }

    #[test]
    fn unaware_packages_need_override() {
        let dir = package();
        std::fs::write(dir.path().join("lib/net6.0/App.exe"), "plain").unwrap();
        let err = validate_package_contents(dir.path(), false, &ContentInspector).unwrap_err();
        assert!(err.is_rejection());
        let validated = validate_package_contents(dir.path(), true, &ContentInspector).unwrap();
        assert!(validated.aware_executables.is_empty());
    }

    #[test]
    fn clickonce_is_rejected() {
        let dir = package();
        std::fs::write(
            dir.path().join("lib/net6.0/App.application"),
            "<deployment xmlns=\"urn:schemas-microsoft-com:clickonce.v1\"/>",
        )
        .unwrap();
        let err = validate_package_contents(dir.path(), false, &ContentInspector).unwrap_err();
        assert!(err.to_string().contains("ClickOnce"));

        let dir = package();
        std::fs::write(dir.path().join("lib/net6.0/App.application"), "<other/>").unwrap();
        assert!(validate_package_contents(dir.path(), false, &ContentInspector).is_ok());
    }
}
