//! PE header introspection with goblin.

use super::BinaryInspector;
use crate::bundler::{Result, error::ErrorExt};
use goblin::pe::PE;
use std::path::Path;

/// Marker an executable embeds to opt in to updates.
pub const UPDATE_AWARE_MARKER: &str = "SquirrelAwareVersion";

/// `IMAGE_SUBSYSTEM_WINDOWS_GUI`
const SUBSYSTEM_WINDOWS_GUI: u16 = 2;

/// Reads machine, subsystem and the update-aware marker from PE files.
#[derive(Clone, Copy, Debug, Default)]
pub struct GoblinInspector;

impl GoblinInspector {
    fn with_pe<T>(path: &Path, f: impl FnOnce(Option<&PE<'_>>) -> T) -> Result<T> {
        let buffer = std::fs::read(path).fs_context("failed to read binary", path)?;
        match PE::parse(&buffer) {
            Ok(pe) => Ok(f(Some(&pe))),
            Err(e) => {
                log::debug!("{} is not a readable PE image: {e}", path.display());
                Ok(f(None))
            }
        }
    }
}

impl BinaryInspector for GoblinInspector {
    fn machine(&self, path: &Path) -> Result<Option<u16>> {
        Self::with_pe(path, |pe| pe.map(|pe| pe.header.coff_header.machine))
    }

    fn is_windowed(&self, path: &Path) -> Result<bool> {
        Self::with_pe(path, |pe| {
            pe.and_then(|pe| pe.header.optional_header.as_ref())
                .is_some_and(|oh| oh.windows_fields.subsystem == SUBSYSTEM_WINDOWS_GUI)
        })
    }

    fn is_update_aware(&self, path: &Path) -> Result<bool> {
        let buffer = std::fs::read(path).fs_context("failed to read binary", path)?;
        Ok(contains_marker(&buffer))
    }
}

/// Looks for the marker as UTF-8 (embedded manifest) or UTF-16LE (version resource).
fn contains_marker(haystack: &[u8]) -> bool {
    let utf8 = UPDATE_AWARE_MARKER.as_bytes();
    let utf16: Vec<u8> = UPDATE_AWARE_MARKER
        .encode_utf16()
        .flat_map(u16::to_le_bytes)
        .collect();
    find(haystack, utf8) || find(haystack, &utf16)
}

fn find(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
