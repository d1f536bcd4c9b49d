//! Deterministic construction of single-file bundles.
//!
//! Output layout: host image (marker slot patched with the manifest offset),
//! payloads in file-spec order, then the manifest. Identical inputs always
//! produce identical bytes.

use super::header::{
    BundleEntry, BundleHeader, FileType, MAX_MAJOR_VERSION, find_marker,
};
use crate::bundler::{
    builder::checksum::sha256,
    error::{Error, ErrorExt, Result},
};
use base64::Engine;
use flate2::{Compression, write::DeflateEncoder};
use path_absolutize::Absolutize;
use std::{
    collections::HashSet,
    io::Write,
    path::{Path, PathBuf},
};

/// Assemblies start on this boundary so the runtime can map them in place.
const ASSEMBLY_ALIGNMENT: usize = 16;

/// Characters of the encoded digest kept as the bundle id.
const BUNDLE_ID_LEN: usize = 12;

/// A file to embed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileSpec {
    pub source: PathBuf,
    /// Path inside the bundle, `/` separated.
    pub relative_path: String,
}

impl FileSpec {
    pub fn new(source: impl Into<PathBuf>, relative_path: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            relative_path: relative_path.into(),
        }
    }
}

/// Bundle generation switches.
#[derive(Clone, Copy, Debug)]
pub struct BundleOptions {
    /// Deflate payloads when that makes them smaller.
    pub compress: bool,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self { compress: true }
    }
}

/// Lists every file below `source_dir` in byte-wise order of relative path.
///
/// `exclude` names relative paths to leave out (typically the host image).
pub fn collect_file_specs(source_dir: &Path, exclude: &[&str]) -> Result<Vec<FileSpec>> {
    let root = source_dir
        .absolutize()
        .fs_context("resolving bundle source directory", source_dir)?
        .into_owned();

    let mut specs = Vec::new();
    for entry in walkdir::WalkDir::new(&root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(&root)?;
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if exclude.contains(&relative.as_str()) {
            continue;
        }
        specs.push(FileSpec::new(entry.path(), relative));
    }

    specs.sort_by(|a, b| a.relative_path.as_bytes().cmp(b.relative_path.as_bytes()));
    Ok(specs)
}

/// Appends `specs` to `host` and returns the finished bundle.
///
/// # Errors
///
/// [`Error::Format`] when the host has no bundle marker or already carries
/// a bundle; [`Error::Validation`] on duplicate relative paths.
pub fn generate_bundle(host: &[u8], specs: &[FileSpec], options: BundleOptions) -> Result<Vec<u8>> {
    let marker = find_marker(host).ok_or_else(|| Error::format("host image has no bundle marker"))?;
    if marker.is_bundled() {
        return Err(Error::format("host image is already a bundle"));
    }

    let mut seen = HashSet::new();
    for spec in specs {
        if !seen.insert(spec.relative_path.as_str()) {
            return Err(Error::validation(format!(
                "duplicate bundle path `{}`",
                spec.relative_path
            )));
        }
    }

    let mut out = host.to_vec();
    let mut header = BundleHeader {
        major_version: MAX_MAJOR_VERSION,
        minor_version: 0,
        ..Default::default()
    };
    let mut digests = Vec::with_capacity(specs.len() * 32);

    for spec in specs {
        let data = std::fs::read(&spec.source).fs_context("reading bundle input", &spec.source)?;
        digests.extend_from_slice(&sha256(&data));

        let file_type = FileType::from_file_name(&spec.relative_path);
        if file_type == FileType::Assembly {
            let padding = (ASSEMBLY_ALIGNMENT - out.len() % ASSEMBLY_ALIGNMENT) % ASSEMBLY_ALIGNMENT;
            out.resize(out.len() + padding, 0);
        }

        let offset = out.len() as i64;
        let mut compressed_size = 0i64;
        let compressible = !matches!(file_type, FileType::DepsJson | FileType::RuntimeConfigJson);
        match (options.compress && compressible && !data.is_empty())
            .then(|| deflate(&data))
            .transpose()?
        {
            Some(packed) if packed.len() < data.len() => {
                compressed_size = packed.len() as i64;
                out.extend_from_slice(&packed);
            }
            _ => out.extend_from_slice(&data),
        }

        let size = data.len() as i64;
        match file_type {
            FileType::DepsJson => {
                header.deps_json_offset = offset;
                header.deps_json_size = size;
            }
            FileType::RuntimeConfigJson => {
                header.runtime_config_offset = offset;
                header.runtime_config_size = size;
            }
            _ => {}
        }

        header.entries.push(BundleEntry {
            offset,
            size,
            compressed_size,
            file_type,
            relative_path: spec.relative_path.clone(),
        });
    }

    header.bundle_id = bundle_id(&digests);
    let header_offset = out.len() as i64;
    out.extend_from_slice(&header.encode());
    out[marker.slot_offset..marker.slot_offset + 8].copy_from_slice(&header_offset.to_le_bytes());

    log::debug!(
        "Generated bundle {} with {} files ({} bytes)",
        header.bundle_id,
        header.entries.len(),
        out.len()
    );
    Ok(out)
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn bundle_id(digests: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(sha256(digests));
    encoded[..BUNDLE_ID_LEN].to_string()
}
