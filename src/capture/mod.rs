//! Host frame capture and coordinate conversion.
//!
//! This module provides:
//! - Screen/pixel rectangle types and normalized-region conversion (`rect`)
//! - The `FrameSource` capture seam plus crop and PNG helpers (`frame`)

pub mod frame;
pub mod rect;

pub use frame::{crop_pixels, encode_png, FrameSource, StillFrameSource};
pub use rect::{pixels_to_region, region_to_pixels, PixelRect, ScreenRect};
