//! Single-file bundle manifest layout.
//!
//! A bundle is a host executable with payload files appended, followed by a
//! manifest describing them. The host carries a marker: an 8-byte slot holding
//! the manifest offset followed by [`BUNDLE_SIGNATURE`]. An offset of zero
//! means the host has not been bundled yet.

use super::cursor::{ByteCursor, ByteSink};
use crate::bundler::error::{Error, Result};
use std::fmt;

/// SHA-256 of ".net core bundle", as found in hosts after the offset slot.
pub const BUNDLE_SIGNATURE: [u8; 32] = [
    0x8b, 0x12, 0x02, 0xb9, 0x6a, 0x61, 0x20, 0x38, 0x72, 0x7b, 0x93, 0x02, 0x14, 0xd7, 0xa0, 0x32,
    0x13, 0xf5, 0xb9, 0xe6, 0xef, 0xae, 0x33, 0x18, 0xee, 0x3b, 0x2d, 0xce, 0x24, 0xb3, 0x6a, 0xae,
];

/// Lowest manifest major version understood.
pub const MIN_MAJOR_VERSION: u32 = 1;
/// Highest manifest major version understood, and the one written.
pub const MAX_MAJOR_VERSION: u32 = 6;

/// Kind of an embedded file.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum FileType {
    #[default]
    Unknown = 0,
    Assembly = 1,
    NativeBinary = 2,
    DepsJson = 3,
    RuntimeConfigJson = 4,
    Symbols = 5,
}

impl FileType {
    /// Infers the type from a file name.
    pub fn from_file_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".deps.json") {
            Self::DepsJson
        } else if lower.ends_with(".runtimeconfig.json") {
            Self::RuntimeConfigJson
        } else if lower.ends_with(".pdb") {
            Self::Symbols
        } else if lower.ends_with(".dll") {
            Self::Assembly
        } else if lower.ends_with(".so") || lower.ends_with(".dylib") {
            Self::NativeBinary
        } else {
            Self::Unknown
        }
    }
}

impl TryFrom<u8> for FileType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Self::Unknown,
            1 => Self::Assembly,
            2 => Self::NativeBinary,
            3 => Self::DepsJson,
            4 => Self::RuntimeConfigJson,
            5 => Self::Symbols,
            other => return Err(Error::format(format!("unknown bundle file type {other}"))),
        })
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Assembly => "assembly",
            Self::NativeBinary => "native binary",
            Self::DepsJson => "deps.json",
            Self::RuntimeConfigJson => "runtimeconfig.json",
            Self::Symbols => "symbols",
        };
        f.write_str(name)
    }
}

/// One embedded file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BundleEntry {
    /// Offset of the payload from the start of the bundle.
    pub offset: i64,
    /// Uncompressed size.
    pub size: i64,
    /// Stored size when compressed; 0 means stored uncompressed.
    pub compressed_size: i64,
    pub file_type: FileType,
    /// Path relative to the bundle root, `/` separated.
    pub relative_path: String,
}

impl BundleEntry {
    /// Whether the payload is deflate-compressed.
    pub fn is_compressed(&self) -> bool {
        self.compressed_size != 0
    }

    /// Bytes occupied in the bundle.
    pub fn stored_size(&self) -> i64 {
        if self.is_compressed() {
            self.compressed_size
        } else {
            self.size
        }
    }
}

/// Decoded bundle manifest.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BundleHeader {
    pub major_version: u32,
    pub minor_version: u32,
    pub bundle_id: String,
    pub deps_json_offset: i64,
    pub deps_json_size: i64,
    pub runtime_config_offset: i64,
    pub runtime_config_size: i64,
    pub flags: u64,
    pub entries: Vec<BundleEntry>,
}

impl BundleHeader {
    /// Decodes the manifest located at `offset` in `bytes`.
    ///
    /// # Errors
    ///
    /// [`Error::Format`] when the major version is outside
    /// [`MIN_MAJOR_VERSION`]..=[`MAX_MAJOR_VERSION`], a field is truncated or
    /// an entry carries an invalid type or negative extent.
    pub fn decode(bytes: &[u8], offset: usize) -> Result<Self> {
        let mut cursor = ByteCursor::new(bytes, offset)?;
        let major_version = cursor.read_u32("majorVersion")?;
        let minor_version = cursor.read_u32("minorVersion")?;
        if !(MIN_MAJOR_VERSION..=MAX_MAJOR_VERSION).contains(&major_version) {
            return Err(Error::format(format!(
                "unsupported manifest version {major_version}.{minor_version}"
            )));
        }

        let file_count = cursor.read_i32("fileCount")?;
        let file_count = usize::try_from(file_count)
            .map_err(|_| Error::format(format!("negative file count {file_count}")))?;
        let bundle_id = cursor.read_string("bundleId")?;

        let mut header = Self {
            major_version,
            minor_version,
            bundle_id,
            ..Default::default()
        };

        if major_version >= 2 {
            header.deps_json_offset = cursor.read_i64("depsJsonOffset")?;
            header.deps_json_size = cursor.read_i64("depsJsonSize")?;
            header.runtime_config_offset = cursor.read_i64("runtimeConfigOffset")?;
            header.runtime_config_size = cursor.read_i64("runtimeConfigSize")?;
            header.flags = cursor.read_u64("flags")?;
        }

        // Each entry takes at least 18 bytes; cap the reservation by what is left.
        header
            .entries
            .reserve(file_count.min(bytes.len().saturating_sub(cursor.position()) / 18));
        for index in 0..file_count {
            let offset = cursor.read_i64("entry offset")?;
            let size = cursor.read_i64("entry size")?;
            let compressed_size = if major_version >= 6 {
                cursor.read_i64("entry compressedSize")?
            } else {
                0
            };
            let file_type = FileType::try_from(cursor.read_u8("entry type")?)?;
            let relative_path = cursor.read_string("entry relativePath")?;

            if offset < 0 || size < 0 || compressed_size < 0 {
                return Err(Error::format(format!(
                    "entry {index} `{relative_path}` has a negative extent"
                )));
            }

            header.entries.push(BundleEntry {
                offset,
                size,
                compressed_size,
                file_type,
                relative_path,
            });
        }

        Ok(header)
    }

    /// Encodes the manifest in the layout its major version implies.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.put_u32(self.major_version);
        out.put_u32(self.minor_version);
        out.put_i32(self.entries.len() as i32);
        out.put_string(&self.bundle_id);
        if self.major_version >= 2 {
            out.put_i64(self.deps_json_offset);
            out.put_i64(self.deps_json_size);
            out.put_i64(self.runtime_config_offset);
            out.put_i64(self.runtime_config_size);
            out.put_u64(self.flags);
        }
        for entry in &self.entries {
            out.put_i64(entry.offset);
            out.put_i64(entry.size);
            if self.major_version >= 6 {
                out.put_i64(entry.compressed_size);
            }
            out.push(entry.file_type as u8);
            out.put_string(&entry.relative_path);
        }
        out
    }

    /// Looks up an entry by relative path.
    pub fn entry(&self, relative_path: &str) -> Option<&BundleEntry> {
        self.entries.iter().find(|e| e.relative_path == relative_path)
    }
}

/// Position of the bundle marker in a host image.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BundleMarker {
    /// Offset of the 8-byte manifest-offset slot.
    pub slot_offset: usize,
    /// Value held in the slot; 0 for an unbundled host.
    pub header_offset: i64,
}

impl BundleMarker {
    /// Whether payloads have been appended to this host.
    pub fn is_bundled(&self) -> bool {
        self.header_offset != 0
    }
}

/// Finds the bundle marker in `bytes`.
pub fn find_marker(bytes: &[u8]) -> Option<BundleMarker> {
    let sig_at = bytes
        .windows(BUNDLE_SIGNATURE.len())
        .position(|w| w == BUNDLE_SIGNATURE)?;
    let slot_offset = sig_at.checked_sub(8)?;
    let mut slot = [0u8; 8];
    slot.copy_from_slice(&bytes[slot_offset..sig_at]);
    Some(BundleMarker {
        slot_offset,
        header_offset: i64::from_le_bytes(slot),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(major: u32) -> BundleHeader {
        BundleHeader {
            major_version: major,
            minor_version: 0,
            bundle_id: "AbCdEf012345".into(),
            deps_json_offset: if major >= 2 { 64 } else { 0 },
            deps_json_size: if major >= 2 { 10 } else { 0 },
            entries: vec![
                BundleEntry {
                    offset: 48,
                    size: 16,
                    compressed_size: 0,
                    file_type: FileType::Assembly,
                    relative_path: "App.dll".into(),
                },
                BundleEntry {
                    offset: 64,
                    size: 10,
                    compressed_size: if major >= 6 { 8 } else { 0 },
                    file_type: FileType::DepsJson,
                    relative_path: "App.deps.json".into(),
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn version_one_omits_extended_fields() {
        let v1 = sample(1).encode();
        let v2 = sample(2).encode();
        assert_eq!(v2.len() - v1.len(), 4 * 8 + 8);
        let decoded = BundleHeader::decode(&v1, 0).unwrap();
        assert_eq!(decoded.deps_json_offset, 0);
        assert_eq!(decoded.flags, 0);
        assert_eq!(decoded.entries.len(), 2);
    }

    #[test]
    fn compressed_size_only_from_version_six() {
        let v5 = BundleHeader::decode(&sample(5).encode(), 0).unwrap();
        assert!(v5.entries.iter().all(|e| e.compressed_size == 0));
        let v6 = BundleHeader::decode(&sample(6).encode(), 0).unwrap();
        assert_eq!(v6, sample(6));
        assert!(v6.entry("App.deps.json").unwrap().is_compressed());
    }

    #[test]
    fn decodes_at_offset() {
        let mut bytes = vec![0xffu8; 37];
        bytes.extend(sample(6).encode());
        let decoded = BundleHeader::decode(&bytes, 37).unwrap();
        assert_eq!(decoded.bundle_id, "AbCdEf012345");
    }

    #[test]
    fn rejects_unknown_major_versions() {
        for major in [0, 7, 100] {
            let mut header = sample(6);
            header.major_version = major;
            let err = BundleHeader::decode(&header.encode(), 0).unwrap_err();
            assert!(err.is_rejection());
            assert!(err.to_string().contains("unsupported manifest version"));
        }
    }

    #[test]
    fn rejects_truncated_and_invalid_entries() {
        let bytes = sample(6).encode();
        assert!(BundleHeader::decode(&bytes[..bytes.len() - 3], 0).is_err());

        let mut bad_type = sample(6);
        bad_type.entries.truncate(1);
        let mut bytes = bad_type.encode();
        // type byte sits right before the "App.dll" length prefix
        let type_at = bytes.len() - "App.dll".len() - 2;
        bytes[type_at] = 9;
        let err = BundleHeader::decode(&bytes, 0).unwrap_err();
        assert!(err.to_string().contains("unknown bundle file type 9"));
    }

    #[test]
    fn marker_lookup() {
        let mut host = vec![0u8; 100];
        host.extend_from_slice(&1234i64.to_le_bytes());
        host.extend_from_slice(&BUNDLE_SIGNATURE);
        host.extend_from_slice(&[0u8; 20]);
        let marker = find_marker(&host).unwrap();
        assert_eq!(marker.slot_offset, 100);
        assert_eq!(marker.header_offset, 1234);
        assert!(marker.is_bundled());
        assert!(find_marker(&[0u8; 64]).is_none());
    }

    #[test]
    fn file_types_from_names() {
        assert_eq!(FileType::from_file_name("App.deps.json"), FileType::DepsJson);
        assert_eq!(
            FileType::from_file_name("App.runtimeconfig.json"),
            FileType::RuntimeConfigJson
        );
        assert_eq!(FileType::from_file_name("App.PDB"), FileType::Symbols);
        assert_eq!(FileType::from_file_name("lib/x.dll"), FileType::Assembly);
        assert_eq!(FileType::from_file_name("libe_sqlite3.so"), FileType::NativeBinary);
        assert_eq!(FileType::from_file_name("appsettings.json"), FileType::Unknown);
    }
}
