//! Reading and extracting files embedded in a single-file bundle.

use super::header::{BundleEntry, BundleHeader, BundleMarker, find_marker};
use crate::bundler::error::{Error, ErrorExt, Result};
use flate2::read::DeflateDecoder;
use memmap2::Mmap;
use std::{
    borrow::Cow,
    fs::File,
    io::Read,
    path::{Component, Path, PathBuf},
};

/// A bundle opened over a read-only memory map.
///
/// Entry payloads borrow from the map and cannot outlive this value.
#[derive(Debug)]
pub struct BundleFile {
    path: PathBuf,
    map: Mmap,
    marker: BundleMarker,
    header: BundleHeader,
}

impl BundleFile {
    /// Maps `path` and decodes its manifest.
    ///
    /// # Errors
    ///
    /// [`Error::Format`] when the file carries no marker, has not been
    /// bundled, or the manifest is malformed.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).fs_context("opening bundle", path)?;
        let len = file.metadata().fs_context("reading bundle metadata", path)?.len();
        if len == 0 {
            return Err(Error::format(format!("{} is empty", path.display())));
        }
        // SAFETY: The file is opened read-only and the map is only ever read.
        let map = unsafe { Mmap::map(&file) }.fs_context("mapping bundle", path)?;

        let marker = find_marker(&map)
            .ok_or_else(|| Error::format(format!("{} has no bundle marker", path.display())))?;
        if !marker.is_bundled() {
            return Err(Error::format(format!(
                "{} is a host with no bundled files",
                path.display()
            )));
        }
        let offset = usize::try_from(marker.header_offset).map_err(|_| {
            Error::format(format!(
                "{} has an invalid manifest offset {}",
                path.display(),
                marker.header_offset
            ))
        })?;
        let header = BundleHeader::decode(&map, offset)?;
        log::debug!(
            "Opened bundle {} v{}.{} with {} files",
            path.display(),
            header.major_version,
            header.minor_version,
            header.entries.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            map,
            marker,
            header,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &BundleHeader {
        &self.header
    }

    pub fn marker(&self) -> BundleMarker {
        self.marker
    }

    /// Raw bytes of the whole bundle.
    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    /// Length of the host image: everything before the first payload.
    pub fn host_len(&self) -> usize {
        self.header
            .entries
            .iter()
            .map(|e| e.offset as usize)
            .min()
            .unwrap_or(self.marker.header_offset as usize)
    }

    /// Payload of `entry`, decompressed when needed.
    pub fn read(&self, entry: &BundleEntry) -> Result<Cow<'_, [u8]>> {
        read_entry(&self.map, entry)
    }

    /// Writes every entry below `dest`.
    ///
    /// Returns the written paths in manifest order.
    pub fn extract_all(&self, dest: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.header.entries.len());
        for entry in &self.header.entries {
            let target = dest.join(safe_entry_path(&entry.relative_path)?);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).fs_context("creating directory", parent)?;
            }
            let data = self.read(entry)?;
            std::fs::write(&target, &data).fs_context("writing bundled file", &target)?;
            written.push(target);
        }
        Ok(written)
    }
}

/// Returns the payload of `entry` from `bundle`.
///
/// Stored entries borrow their byte range. Compressed entries are inflated
/// and must decompress to exactly the declared size.
pub fn read_entry<'a>(bundle: &'a [u8], entry: &BundleEntry) -> Result<Cow<'a, [u8]>> {
    let start = entry.offset as usize;
    let stored = entry.stored_size() as usize;
    let range = start
        .checked_add(stored)
        .filter(|end| *end <= bundle.len())
        .map(|end| &bundle[start..end])
        .ok_or_else(|| {
            Error::format(format!(
                "entry `{}` spans [{start}, {start}+{stored}) beyond the {}-byte bundle",
                entry.relative_path,
                bundle.len()
            ))
        })?;

    if !entry.is_compressed() {
        return Ok(Cow::Borrowed(range));
    }

    let declared = entry.size as u64;
    let mut out = Vec::with_capacity(entry.size as usize);
    DeflateDecoder::new(range)
        .take(declared + 1)
        .read_to_end(&mut out)
        .map_err(|e| {
            Error::format(format!(
                "corrupted entry `{}`: {e}",
                entry.relative_path
            ))
        })?;

    if out.len() as u64 != declared {
        return Err(Error::format(format!(
            "corrupted entry `{}`: size mismatch, declared {declared} bytes but decompressed {}{}",
            entry.relative_path,
            out.len(),
            if out.len() as u64 > declared { " or more" } else { "" }
        )));
    }
    Ok(Cow::Owned(out))
}

/// Rejects absolute paths and `..` so extraction stays below its root.
fn safe_entry_path(relative: &str) -> Result<PathBuf> {
    let path = Path::new(relative);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => {
                return Err(Error::format(format!(
                    "entry path `{relative}` escapes the bundle root"
                )));
            }
        }
    }
    if out.as_os_str().is_empty() {
        return Err(Error::format("bundle entry has an empty path"));
    }
    Ok(out)
}
