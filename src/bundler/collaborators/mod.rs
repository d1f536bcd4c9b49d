//! External collaborators the release pipeline delegates to.
//!
//! Each concern sits behind a trait so the pipeline receives its signer,
//! introspector, converter, downloader, resource editor and delta builder
//! explicitly. [`Collaborators::from_settings`] wires the default adapters.

mod editor;
mod icon;
mod inspector;
mod signer;

pub use editor::RceditEditor;
pub use icon::ImageIconConverter;
pub use inspector::{GoblinInspector, UPDATE_AWARE_MARKER};
pub use signer::CommandSigner;

use crate::bundler::{Result, settings::Settings, utils::http::HttpDownloader};
use std::{path::Path, sync::Arc};
use url::Url;

/// Signs a binary in place.
pub trait Signer: Send + Sync {
    fn sign(&self, path: &Path) -> Result<()>;
}

/// Reads facts out of executable headers.
pub trait BinaryInspector: Send + Sync {
    /// Machine code from the file header, `None` if the file is not an executable image.
    fn machine(&self, path: &Path) -> Result<Option<u16>>;

    /// Whether the executable runs under the GUI subsystem.
    fn is_windowed(&self, path: &Path) -> Result<bool>;

    /// Whether the executable declares that it participates in updates.
    fn is_update_aware(&self, path: &Path) -> Result<bool>;
}

/// Converts image bytes to an ICO file.
pub trait IconConverter: Send + Sync {
    fn convert(&self, image: &[u8]) -> Result<Vec<u8>>;
}

/// Fetches remote resources.
pub trait Downloader: Send + Sync {
    fn download(&self, url: &Url) -> Result<Vec<u8>>;
}

/// Edits Win32 resources of executables.
pub trait ResourceEditor: Send + Sync {
    /// Replaces the main icon of `exe`.
    fn set_icon(&self, exe: &Path, icon: &Path) -> Result<()>;

    /// Copies version and icon resources from `from` onto `to`.
    fn copy_resources(&self, from: &Path, to: &Path) -> Result<()>;
}

/// Produces a delta package from two full packages.
pub trait DeltaBuilder: Send + Sync {
    fn create_delta(&self, base: &Path, new: &Path, output: &Path) -> Result<()>;
}

/// The set of collaborators handed to the pipeline.
///
/// Optional members are skipped by the pipeline with a log line when absent.
#[derive(Clone)]
pub struct Collaborators {
    pub inspector: Arc<dyn BinaryInspector>,
    pub signer: Option<Arc<dyn Signer>>,
    pub icon_converter: Arc<dyn IconConverter>,
    pub downloader: Arc<dyn Downloader>,
    pub resource_editor: Option<Arc<dyn ResourceEditor>>,
    pub delta_builder: Option<Arc<dyn DeltaBuilder>>,
}

impl Collaborators {
    /// Default adapters for `settings`.
    ///
    /// No delta builder is provided; deltas need one injected by the caller.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let signer = settings
            .sign_template()
            .map(CommandSigner::new)
            .transpose()?
            .map(|s| Arc::new(s) as Arc<dyn Signer>);

        let resource_editor = RceditEditor::detect().map(|e| Arc::new(e) as Arc<dyn ResourceEditor>);

        Ok(Self {
            inspector: Arc::new(GoblinInspector),
            signer,
            icon_converter: Arc::new(ImageIconConverter),
            downloader: Arc::new(HttpDownloader::default()),
            resource_editor,
            delta_builder: None,
        })
    }

    /// Replaces the delta builder.
    pub fn with_delta_builder(mut self, builder: Arc<dyn DeltaBuilder>) -> Self {
        self.delta_builder = Some(builder);
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("signer", &self.signer.is_some())
            .field("resource_editor", &self.resource_editor.is_some())
            .field("delta_builder", &self.delta_builder.is_some())
            .finish_non_exhaustive()
    }
}
