//! Compressed package archives (`.nupkg`).
//!
//! A package archive is a zip container holding one manifest, the payload
//! files, and packaging bookkeeping (`[Content_Types].xml`, `_rels/`,
//! `package/`) that is never part of the payload.

use super::{framework::FrameworkName, manifest::PackageMetadata};
use crate::bundler::error::{Error, ErrorExt, Result};
use std::{
    fs::File,
    io::{BufReader, Read, Write},
    path::{Component, Path, PathBuf},
};
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter, result::ZipError, write::SimpleFileOptions};

/// Extension of the package manifest entry.
pub const MANIFEST_EXTENSION: &str = ".nuspec";

/// Extension of package archives.
pub const PACKAGE_EXTENSION: &str = ".nupkg";

/// OPC content types part, always excluded from package files.
pub const CONTENT_TYPES_FILE: &str = "[Content_Types].xml";

/// Directory of the package payload that holds the application.
pub const LIB_DIRECTORY: &str = "lib";

/// Directory of the package payload for content files.
pub const CONTENT_DIRECTORY: &str = "content";

/// Directories reserved for packaging metadata.
const EXCLUDED_PREFIXES: [&str; 2] = ["_rels", "package"];

/// A file inside the package payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFile {
    /// Path inside the archive, `/`-separated and unescaped.
    pub path: String,
    /// Uncompressed size in bytes.
    pub size: u64,
}

impl PackageFile {
    /// Framework inferred from the folder convention, if any.
    pub fn target_framework(&self) -> Option<FrameworkName> {
        FrameworkName::from_package_path(&self.path)
    }
}

/// An opened package archive with its parsed manifest.
#[derive(Debug, Clone)]
pub struct PackageArchive {
    path: PathBuf,
    manifest_entry: String,
    metadata: PackageMetadata,
}

impl PackageArchive {
    /// Opens `path` and reads its manifest.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut zip = open_zip(&path)?;

        let manifests: Vec<String> = zip
            .file_names()
            .filter(|name| has_extension(name, MANIFEST_EXTENSION))
            .map(String::from)
            .collect();

        let Some(manifest_entry) = manifests.first().cloned() else {
            return Err(Error::format(format!(
                "no manifest in package `{}`",
                path.display()
            )));
        };
        if manifests.len() > 1 {
            log::warn!(
                "Package {} contains {} manifests ({}), reading {}",
                path.display(),
                manifests.len(),
                manifests.join(", "),
                manifest_entry
            );
        }

        let metadata = {
            let entry = zip.by_name(&manifest_entry)?;
            PackageMetadata::parse(BufReader::new(entry)).map_err(|e| {
                Error::format(format!(
                    "{} in `{}` ({})",
                    e,
                    path.display(),
                    manifest_entry
                ))
            })?
        };

        log::debug!(
            "Read manifest {} from {}: {}",
            manifest_entry,
            path.display(),
            metadata.full_name()
        );

        Ok(Self {
            path,
            manifest_entry,
            metadata,
        })
    }

    /// Archive location on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the manifest entry inside the archive.
    pub fn manifest_entry(&self) -> &str {
        &self.manifest_entry
    }

    /// Parsed manifest.
    pub fn metadata(&self) -> &PackageMetadata {
        &self.metadata
    }

    /// `"{id} {version}"`
    pub fn full_name(&self) -> String {
        self.metadata.full_name()
    }

    /// All payload files, in archive order.
    pub fn files(&self) -> Result<Vec<PackageFile>> {
        let mut zip = open_zip(&self.path)?;
        let mut files = Vec::with_capacity(zip.len());
        for index in 0..zip.len() {
            let entry = zip.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let path = unescape_part_name(entry.name());
            if is_package_file(&path) {
                files.push(PackageFile {
                    path,
                    size: entry.size(),
                });
            }
        }
        Ok(files)
    }

    /// Payload files under `directory`, matched case-insensitively.
    pub fn files_in(&self, directory: &str) -> Result<Vec<PackageFile>> {
        let prefix = format!("{}/", directory.trim_end_matches(['/', '\\']));
        Ok(self
            .files()?
            .into_iter()
            .filter(|file| starts_with_ignore_case(&file.path, &prefix))
            .collect())
    }

    /// Files under `lib/`.
    pub fn lib_files(&self) -> Result<Vec<PackageFile>> {
        self.files_in(LIB_DIRECTORY)
    }

    /// Files under `content/`.
    pub fn content_files(&self) -> Result<Vec<PackageFile>> {
        self.files_in(CONTENT_DIRECTORY)
    }

    /// Frameworks declared by framework assemblies plus those implied by `lib/` folders.
    ///
    /// Order is first occurrence; duplicates are removed.
    pub fn supported_frameworks(&self) -> Result<Vec<FrameworkName>> {
        let declared = self
            .metadata
            .framework_assemblies
            .iter()
            .flat_map(|reference| reference.supported_frameworks.iter().cloned());
        let inferred: Vec<FrameworkName> = self
            .lib_files()?
            .iter()
            .filter_map(PackageFile::target_framework)
            .collect();

        let mut frameworks: Vec<FrameworkName> = Vec::new();
        for framework in declared.chain(inferred) {
            if !frameworks.contains(&framework) {
                frameworks.push(framework);
            }
        }
        Ok(frameworks)
    }

    /// Extracts every entry (bookkeeping parts included) below `destination`.
    pub fn extract_to(&self, destination: &Path) -> Result<Vec<PathBuf>> {
        let mut zip = open_zip(&self.path)?;
        std::fs::create_dir_all(destination)
            .fs_context("creating extraction directory", destination)?;

        let mut extracted = Vec::new();
        for index in 0..zip.len() {
            let mut entry = zip.by_index(index)?;
            let name = unescape_part_name(entry.name());
            let relative = safe_relative_path(&name).ok_or_else(|| {
                Error::format(format!(
                    "package `{}` has an entry escaping the package root: {}",
                    self.path.display(),
                    name
                ))
            })?;
            let target = destination.join(&relative);

            if entry.is_dir() {
                std::fs::create_dir_all(&target).fs_context("creating directory", &target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).fs_context("creating directory", parent)?;
            }
            let mut out = File::create(&target).fs_context("creating file", &target)?;
            std::io::copy(&mut entry, &mut out).fs_context("extracting file", &target)?;
            extracted.push(target);
        }
        Ok(extracted)
    }

    /// Packs `source_dir` into a new archive at `destination`.
    ///
    /// Entries are written in byte-wise path order with fixed timestamps so the
    /// same tree always produces the same archive.
    pub fn create_from_directory(source_dir: &Path, destination: &Path) -> Result<()> {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(source_dir).follow_links(false) {
            let entry = entry?;
            if entry.file_type().is_file() {
                let relative = entry.path().strip_prefix(source_dir)?;
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((name, entry.path().to_path_buf()));
            }
        }
        files.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

        let out = File::create(destination).fs_context("creating package", destination)?;
        let mut writer = ZipWriter::new(out);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644);

        let mut buffer = Vec::new();
        for (name, path) in files {
            buffer.clear();
            File::open(&path)
                .and_then(|mut f| f.read_to_end(&mut buffer))
                .fs_context("reading package file", &path)?;
            writer.start_file(name, options)?;
            writer
                .write_all(&buffer)
                .fs_context("writing package entry", destination)?;
        }
        writer
            .finish()?
            .sync_all()
            .fs_context("flushing package", destination)?;
        Ok(())
    }
}

fn open_zip(path: &Path) -> Result<ZipArchive<BufReader<File>>> {
    let file = File::open(path).fs_context("opening package", path)?;
    ZipArchive::new(BufReader::new(file)).map_err(|e| match e {
        ZipError::Io(error) => Error::Fs {
            context: "reading package",
            path: path.to_path_buf(),
            error,
        },
        other => Error::format(format!(
            "`{}` is not a readable package archive: {other}",
            path.display()
        )),
    })
}

/// Whether an archive path belongs to the package payload.
pub fn is_package_file(path: &str) -> bool {
    let (directory, file_name) = match path.rsplit_once(['/', '\\']) {
        Some((directory, file_name)) => (directory, file_name),
        None => ("", path),
    };

    if file_name.eq_ignore_ascii_case(CONTENT_TYPES_FILE) {
        return false;
    }
    if has_extension(file_name, MANIFEST_EXTENSION) {
        return false;
    }
    !EXCLUDED_PREFIXES
        .iter()
        .any(|prefix| starts_with_ignore_case(directory, prefix))
}

fn has_extension(name: &str, extension: &str) -> bool {
    let file_name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    file_name
        .rfind('.')
        .is_some_and(|dot| file_name[dot..].eq_ignore_ascii_case(extension))
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len()
        && text.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Part names are percent-escaped URIs; `%20` etc. map back to bytes.
fn unescape_part_name(name: &str) -> String {
    let name = name.trim_start_matches('/');
    if !name.contains('%') {
        return name.replace('\\', "/");
    }
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && let Some(value) = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
        {
            out.push(value);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).replace('\\', "/")
}

fn safe_relative_path(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!relative.as_os_str().is_empty()).then_some(relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_file_filter() {
        assert!(is_package_file("lib/net45/App.exe"));
        assert!(is_package_file("README.md"));
        assert!(!is_package_file("[Content_Types].xml"));
        assert!(!is_package_file("[content_types].XML"));
        assert!(!is_package_file("Foo.nuspec"));
        assert!(!is_package_file("nested/Foo.NUSPEC"));
        assert!(!is_package_file("_rels/.rels"));
        assert!(!is_package_file("package/services/metadata/core-properties/x.psmdcp"));
        assert!(!is_package_file("Package/services/x.psmdcp"));
        assert!(is_package_file("lib/package.dll"));
    }

    #[test]
    fn unescapes_part_names() {
        assert_eq!(unescape_part_name("lib/net45/My%20App.exe"), "lib/net45/My App.exe");
        assert_eq!(unescape_part_name("/lib\\x.dll"), "lib/x.dll");
        assert_eq!(unescape_part_name("100%"), "100%");
    }

    fn zip_with(path: &Path, entries: &[(&str, &str)]) {
        use std::io::Write;
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, body) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    const FIRST: &str = "<package><metadata><id>First</id><version>1.0.0</version></metadata></package>";
    const SECOND: &str = "<package><metadata><id>Second</id><version>2.0.0</version></metadata></package>";

    #[test]
    fn first_of_several_manifests_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Pkg.nupkg");
        zip_with(&path, &[("First.nuspec", FIRST), ("Second.nuspec", SECOND)]);

        let archive = PackageArchive::open(&path).unwrap();
        assert_eq!(archive.manifest_entry(), "First.nuspec");
        assert_eq!(archive.metadata().id, "First");
    }

    #[test]
    fn package_without_manifest_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Pkg.nupkg");
        zip_with(&path, &[("lib/net6.0/App.dll", "dll")]);

        let err = PackageArchive::open(&path).unwrap_err();
        assert!(err.is_rejection());
        assert!(err.to_string().contains("no manifest"));
    }

    #[test]
    fn rejects_escaping_paths() {
        assert!(safe_relative_path("../evil").is_none());
        assert!(safe_relative_path("/abs/path").is_none());
        assert_eq!(
            safe_relative_path("lib/./a.dll"),
            Some(PathBuf::from("lib").join("a.dll"))
        );
    }
}
