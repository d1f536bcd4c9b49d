//! Published release bookkeeping.
//!
//! A release directory holds full and delta packages plus a `RELEASES` file
//! listing them. New entries are merged in by version and the file is
//! replaced atomically once every artifact it names exists.

pub mod entry;
pub mod manifest;

pub use entry::ReleaseEntry;
pub use manifest::{RELEASES_FILE_NAME, ReleaseManifest, load_from_dir, merge, select_base};
