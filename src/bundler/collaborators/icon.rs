//! Icon conversion with the `image` crate.

use super::IconConverter;
use crate::bundler::Result;
use image::{DynamicImage, ImageFormat, imageops::FilterType};
use std::io::Cursor;

/// Largest edge an ICO entry can carry.
const MAX_ICON_EDGE: u32 = 256;

/// Decodes any supported image and re-encodes it as a single-entry ICO.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageIconConverter;

impl IconConverter for ImageIconConverter {
    fn convert(&self, image: &[u8]) -> Result<Vec<u8>> {
        let mut decoded = image::load_from_memory(image)?;
        if decoded.width() > MAX_ICON_EDGE || decoded.height() > MAX_ICON_EDGE {
            decoded = decoded.resize(MAX_ICON_EDGE, MAX_ICON_EDGE, FilterType::Lanczos3);
        }
        let rgba = DynamicImage::ImageRgba8(decoded.to_rgba8());

        let mut out = Cursor::new(Vec::new());
        rgba.write_to(&mut out, ImageFormat::Ico)?;
        Ok(out.into_inner())
    }
}
