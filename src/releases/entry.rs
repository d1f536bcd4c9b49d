//! One published release artifact.

use crate::{
    bundler::{
        builder::checksum::sha1_file,
        error::{Error, Result},
    },
    metadata::parse_version,
};
use regex::Regex;
use semver::Version;
use std::{fmt, path::Path, str::FromStr, sync::LazyLock};
use url::Url;

/// `{id}-{version}` once the extension and kind suffix are stripped.
static RELEASE_STEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<id>.+?)-(?P<version>\d+(?:\.\d+){0,2}(?:-[0-9A-Za-z.-]+)?(?:\+[0-9A-Za-z.-]+)?)$",
    )
    .unwrap_or_else(|e| panic!("release filename pattern is invalid: {e}"))
});

/// A line of the `RELEASES` file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReleaseEntry {
    /// Uppercase hex SHA-1 of the artifact.
    pub sha1: String,
    pub filename: String,
    pub filesize: u64,
    pub is_delta: bool,
    /// Prefix written before the filename, ending in `/`.
    pub base_url: Option<String>,
    pub package_id: String,
    pub version: Version,
}

impl ReleaseEntry {
    /// Builds an entry, deriving id, version and kind from `filename`.
    pub fn new(sha1: impl Into<String>, filename: impl Into<String>, filesize: u64) -> Result<Self> {
        let sha1 = sha1.into();
        let filename = filename.into();
        if sha1.len() != 40 || !sha1.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::format(format!("`{sha1}` is not a SHA-1 hash")));
        }
        let (package_id, version, is_delta) = parse_filename(&filename)?;
        Ok(Self {
            sha1: sha1.to_ascii_uppercase(),
            filename,
            filesize,
            is_delta,
            base_url: None,
            package_id,
            version,
        })
    }

    /// Hashes and measures a published package.
    pub fn generate_from_file(path: &Path, base_url: Option<&Url>) -> Result<Self> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::format(format!("{} has no usable file name", path.display())))?;
        let filesize = std::fs::metadata(path)
            .map_err(|error| Error::Fs {
                context: "reading package size",
                path: path.to_path_buf(),
                error,
            })?
            .len();
        let mut entry = Self::new(sha1_file(path)?, filename, filesize)?;
        entry.base_url = base_url.map(|u| u.to_string());
        Ok(entry)
    }

    /// Name under which a release of `id` at `version` is published.
    pub fn suggested_filename(id: &str, version: &Version, is_delta: bool) -> String {
        let kind = if is_delta { "delta" } else { "full" };
        format!("{id}-{version}-{kind}.nupkg")
    }

    /// Filename with the base URL, as written in `RELEASES`.
    pub fn location(&self) -> String {
        match &self.base_url {
            Some(base) => format!("{base}{}", self.filename),
            None => self.filename.clone(),
        }
    }
}

impl FromStr for ReleaseEntry {
    type Err = Error;

    /// Parses `SHA1 [base_url]filename size [ignored...]`.
    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim_start_matches('\u{feff}');
        let mut fields = line.split_whitespace();
        let (Some(sha1), Some(location), Some(size)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(Error::format(format!(
                "release line `{line}` needs a hash, a file name and a size"
            )));
        };
        let filesize = size
            .parse::<u64>()
            .map_err(|e| Error::format(format!("release size `{size}` is invalid: {e}")))?;

        let (base_url, filename) = match location.rfind('/') {
            Some(split) => (Some(location[..=split].to_string()), &location[split + 1..]),
            None => (None, location),
        };

        let mut entry = Self::new(sha1, filename, filesize)?;
        entry.base_url = base_url;
        Ok(entry)
    }
}

impl fmt::Display for ReleaseEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.sha1, self.location(), self.filesize)
    }
}

fn parse_filename(filename: &str) -> Result<(String, Version, bool)> {
    let mismatch = || {
        Error::format(format!(
            "release file name `{filename}` does not match `<id>-<version>[-full|-delta].nupkg`"
        ))
    };
    let stem = strip_suffix_ignore_case(filename, ".nupkg").ok_or_else(mismatch)?;
    let (stem, is_delta) = match strip_suffix_ignore_case(stem, "-delta") {
        Some(stem) => (stem, true),
        None => (strip_suffix_ignore_case(stem, "-full").unwrap_or(stem), false),
    };
    let captures = RELEASE_STEM.captures(stem).ok_or_else(mismatch)?;
    Ok((
        captures["id"].to_string(),
        parse_version(&captures["version"])?,
        is_delta,
    ))
}

fn strip_suffix_ignore_case<'a>(text: &'a str, suffix: &str) -> Option<&'a str> {
    let split = text.len().checked_sub(suffix.len())?;
    (text.is_char_boundary(split) && text[split..].eq_ignore_ascii_case(suffix)).then(|| &text[..split])
}
