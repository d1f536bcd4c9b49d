//! The `RELEASES` file: ordered release entries for one application.

use super::entry::ReleaseEntry;
use crate::bundler::{
    error::{Context, Error, ErrorExt, Result},
    utils::fs::write_atomic,
};
use semver::Version;
use std::{fmt, path::Path};

/// File name of the manifest inside a release directory.
pub const RELEASES_FILE_NAME: &str = "RELEASES";

/// Ordered release entries.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReleaseManifest {
    entries: Vec<ReleaseEntry>,
}

impl ReleaseManifest {
    pub fn new(entries: Vec<ReleaseEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ReleaseEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ReleaseEntry> {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses manifest text. Blank lines are skipped; any malformed line fails
    /// the whole parse.
    pub fn parse(text: &str) -> Result<Self> {
        let entries = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim_start_matches('\u{feff}').trim().is_empty())
            .map(|(index, line)| {
                line.parse::<ReleaseEntry>()
                    .with_context(|| format!("RELEASES line {}", index + 1))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    /// Reads `path`; a missing file is an empty manifest.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).fs_context("reading release manifest", path),
        }
    }

    /// Writes the manifest so readers never observe a partial file.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.to_string().as_bytes())
    }

    /// Entry for `version` of the given kind.
    pub fn entry_for(&self, version: &Version, is_delta: bool) -> Option<&ReleaseEntry> {
        self.entries
            .iter()
            .find(|e| &e.version == version && e.is_delta == is_delta)
    }

    /// Newest full release.
    pub fn latest_full(&self) -> Option<&ReleaseEntry> {
        self.entries
            .iter()
            .filter(|e| !e.is_delta)
            .max_by(|a, b| a.version.cmp(&b.version))
    }

    /// Merges `incoming` into this manifest. See [`merge`].
    pub fn merged_with(&self, incoming: &[ReleaseEntry]) -> Self {
        Self::new(merge(&self.entries, incoming))
    }
}

impl fmt::Display for ReleaseManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

/// Previous entries whose version is not in `incoming`, followed by `incoming`.
///
/// Keys on version only: any previous entry sharing a version with an
/// incoming one is dropped, whether full or delta.
pub fn merge(previous: &[ReleaseEntry], incoming: &[ReleaseEntry]) -> Vec<ReleaseEntry> {
    previous
        .iter()
        .filter(|p| !incoming.iter().any(|n| n.version == p.version))
        .chain(incoming)
        .cloned()
        .collect()
}

/// The full release with the greatest version strictly below `candidate`.
pub fn select_base<'a>(previous: &'a [ReleaseEntry], candidate: &Version) -> Option<&'a ReleaseEntry> {
    previous
        .iter()
        .filter(|e| !e.is_delta && &e.version < candidate)
        .max_by(|a, b| a.version.cmp(&b.version))
}

/// Wraps a parse failure with the file it came from.
pub fn load_from_dir(release_dir: &Path) -> Result<ReleaseManifest> {
    let path = release_dir.join(RELEASES_FILE_NAME);
    ReleaseManifest::load(&path).map_err(|e| match e {
        e @ Error::Fs { .. } => e,
        other => Error::Context {
            context: format!("parsing {}", path.display()),
            source: Box::new(other),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "94689FEDE03FED7AB59C24337673A27837F0C3EC";

    fn entry(version: &str, is_delta: bool) -> ReleaseEntry {
        let name = ReleaseEntry::suggested_filename("App", &Version::parse(version).unwrap(), is_delta);
        ReleaseEntry::new(HASH, name, 100).unwrap()
    }

    #[test]
    fn merge_drops_previous_versions_present_in_incoming() {
        let previous = vec![entry("1.0.0", false), entry("1.1.0", false)];
        let incoming = vec![entry("1.1.0", false), entry("1.1.0", true)];
        let merged = merge(&previous, &incoming);
        assert_eq!(
            merged,
            vec![entry("1.0.0", false), entry("1.1.0", false), entry("1.1.0", true)]
        );
    }

    #[test]
    fn delta_only_incoming_discards_previous_full() {
        let previous = vec![entry("1.0.0", false), entry("1.1.0", false)];
        let incoming = vec![entry("1.1.0", true)];
        let merged = merge(&previous, &incoming);
        assert_eq!(merged, vec![entry("1.0.0", false), entry("1.1.0", true)]);
    }

    #[test]
    fn republishing_drops_stale_delta() {
        let previous = vec![entry("1.0.0", false), entry("1.1.0", true), entry("1.1.0", false)];
        let rebuilt = ReleaseEntry::new(
            "A9993E364706816ABA3E25717850C26C9CD0D89D",
            "App-1.1.0-full.nupkg",
            7,
        )
        .unwrap();
        let merged = merge(&previous, std::slice::from_ref(&rebuilt));
        assert_eq!(merged, vec![entry("1.0.0", false), rebuilt]);

        let manifest = ReleaseManifest::new(merged);
        assert!(manifest.entry_for(&Version::new(1, 1, 0), true).is_none());
        assert_eq!(manifest.latest_full().unwrap().filesize, 7);
        let base = select_base(manifest.entries(), &Version::new(1, 1, 0)).unwrap();
        assert_eq!(base.version, Version::new(1, 0, 0));
    }

    #[test]
    fn base_is_greatest_full_below_candidate() {
        let previous = vec![
            entry("0.9.0", false),
            entry("1.0.0", false),
            entry("1.0.5", true),
            entry("2.0.0", false),
        ];
        let base = select_base(&previous, &Version::new(1, 1, 0)).unwrap();
        assert_eq!(base.version, Version::new(1, 0, 0));
        assert!(select_base(&previous, &Version::new(0, 9, 0)).is_none());
        assert!(select_base(&[], &Version::new(1, 0, 0)).is_none());
    }

    #[test]
    fn parse_is_all_or_nothing() {
        let text = format!(
            "{HASH} App-1.0.0-full.nupkg 10\n\n{HASH} App-1.1.0-delta.nupkg 5\r\n"
        );
        let manifest = ReleaseManifest::parse(&text).unwrap();
        assert_eq!(manifest.entries().len(), 2);
        assert!(manifest.entry_for(&Version::new(1, 1, 0), true).is_some());
        assert_eq!(manifest.latest_full().unwrap().version, Version::new(1, 0, 0));

        let broken = format!("{HASH} App-1.0.0-full.nupkg 10\nnot a release line\n");
        let err = ReleaseManifest::parse(&broken).unwrap_err();
        assert!(err.is_rejection());
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_from_dir(dir.path()).unwrap().is_empty());

        let manifest = ReleaseManifest::new(vec![entry("1.0.0", false), entry("1.1.0", true)]);
        manifest.save(&dir.path().join(RELEASES_FILE_NAME)).unwrap();
        assert_eq!(load_from_dir(dir.path()).unwrap(), manifest);

        std::fs::write(dir.path().join(RELEASES_FILE_NAME), "garbage").unwrap();
        let err = load_from_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("RELEASES"));
    }
}
