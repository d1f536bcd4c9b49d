//! Single-file executable bundles.
//!
//! - [`header`] - manifest layout, versions 1 through 6, and the host marker
//! - [`extract`] - memory-mapped reading and extraction of embedded files
//! - [`writer`] - deterministic bundle generation from a directory tree
//! - [`patch`] - replacing the host icon of an existing bundle

pub mod cursor;
pub mod extract;
pub mod header;
pub mod patch;
pub mod writer;

pub use extract::{BundleFile, read_entry};
pub use header::{BUNDLE_SIGNATURE, BundleEntry, BundleHeader, BundleMarker, FileType, find_marker};
pub use patch::{is_single_file_bundle, update_bundle_icon};
pub use writer::{BundleOptions, FileSpec, collect_file_specs, generate_bundle};
