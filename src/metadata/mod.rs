//! Package metadata and payload discovery from package archives.
//!
//! - [`archive`] - opening `.nupkg` archives, listing and extracting payload files
//! - [`manifest`] - parsing the embedded `.nuspec` manifest
//! - [`framework`] - target framework tokens
//! - [`version`] - lenient versions and dependency ranges
//! - [`stamp`] - writing release metadata back into a manifest

pub mod archive;
pub mod framework;
pub mod manifest;
pub mod stamp;
pub mod version;

pub use archive::{PackageArchive, PackageFile, is_package_file};
pub use framework::FrameworkName;
pub use manifest::{Dependency, DependencySet, FrameworkAssemblyReference, PackageMetadata};
pub use stamp::stamp_release_metadata;
pub use version::{VersionRange, parse_version};
