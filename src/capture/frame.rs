//! Frame capture seam and crop helpers.
//!
//! Grabbing pixels from a host is the windowing shell's job; the core only
//! needs "give me the host's current frame" and crops it itself.

use std::io::Cursor;
use std::path::Path;

use async_trait::async_trait;
use image::{imageops, ImageFormat, RgbaImage};

use super::rect::PixelRect;
use crate::error::CaptureError;
use crate::host::HostDescriptor;

/// Something that can produce the pixels currently shown by a host.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Captures the whole host surface at its current pixel size.
    async fn capture_host(&self, host: &HostDescriptor) -> Result<RgbaImage, CaptureError>;
}

/// Crops `rect` out of `img`, clamping it to the image bounds.
pub fn crop_pixels(img: &RgbaImage, rect: PixelRect) -> Result<RgbaImage, CaptureError> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(CaptureError::EmptyRegion(rect));
    }
    let r = rect.clamp_to(w, h);
    Ok(imageops::crop_imm(img, r.x, r.y, r.width, r.height).to_image())
}

/// Encodes an image as PNG bytes for the recognition worker.
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// A frame source that always returns the same still image, scaled to the
/// host's size. Used by the command line tools and tests.
pub struct StillFrameSource {
    image: RgbaImage,
}

impl StillFrameSource {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    /// Loads a still frame from an image file.
    pub fn open(path: &Path) -> Result<Self, CaptureError> {
        Ok(Self::new(image::open(path)?.to_rgba8()))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

#[async_trait]
impl FrameSource for StillFrameSource {
    async fn capture_host(&self, host: &HostDescriptor) -> Result<RgbaImage, CaptureError> {
        let (w, h) = host.rect.pixel_size();
        if self.image.dimensions() == (w, h) {
            return Ok(self.image.clone());
        }
        Ok(imageops::resize(&self.image, w, h, imageops::FilterType::Triangle))
    }
}
