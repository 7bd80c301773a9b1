//! Rectangle types and conversions between normalized and pixel space.

use serde::{Deserialize, Serialize};

use crate::regions::Region;

/// A rectangle in absolute screen coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScreenRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl ScreenRect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// A rectangle with no area is never a valid host.
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Places a rectangle given relative to this one's origin into screen space.
    ///
    /// Used to turn a tab view's bounds (relative to its window's content
    /// area) into absolute coordinates.
    pub fn translate_child(&self, child: ScreenRect) -> ScreenRect {
        ScreenRect {
            x: self.x + child.x,
            y: self.y + child.y,
            width: child.width,
            height: child.height,
        }
    }

    /// Pixel size, with non-positive dimensions floored to 1.
    pub fn pixel_size(&self) -> (u32, u32) {
        (self.width.max(1) as u32, self.height.max(1) as u32)
    }
}

/// A rectangle in pixels, relative to an image's top-left corner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Clamps so the rectangle lies within a `w`×`h` surface and covers at
    /// least one pixel.
    pub fn clamp_to(self, w: u32, h: u32) -> PixelRect {
        let w = w.max(1);
        let h = h.max(1);
        let x = self.x.min(w - 1);
        let y = self.y.min(h - 1);
        PixelRect {
            x,
            y,
            width: self.width.clamp(1, w - x),
            height: self.height.clamp(1, h - y),
        }
    }
}

/// Converts a normalized region to pixels on a `width`×`height` surface.
///
/// Each component is rounded, then the result is clamped to the surface.
pub fn region_to_pixels(region: &Region, width: u32, height: u32) -> PixelRect {
    let scale = |ratio: f64, size: u32| (ratio * size as f64).round().max(0.0) as u32;
    PixelRect {
        x: scale(region.x, width),
        y: scale(region.y, height),
        width: scale(region.w, width),
        height: scale(region.h, height),
    }
    .clamp_to(width, height)
}

/// Converts a pixel rectangle drawn on a `canvas_w`×`canvas_h` canvas to a
/// normalized region (clamped, with width/height floored at the minimum extent).
pub fn pixels_to_region(x: f64, y: f64, w: f64, h: f64, canvas_w: f64, canvas_h: f64) -> Region {
    let canvas_w = canvas_w.max(1.0);
    let canvas_h = canvas_h.max(1.0);
    Region::new(x / canvas_w, y / canvas_h, w / canvas_w, h / canvas_h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_child() {
        let window = ScreenRect::new(100, 50, 1280, 720);
        let view = ScreenRect::new(0, 40, 1280, 680);
        assert_eq!(window.translate_child(view), ScreenRect::new(100, 90, 1280, 680));
    }

    #[test]
    fn test_degenerate() {
        assert!(ScreenRect::new(0, 0, 0, 10).is_degenerate());
        assert!(ScreenRect::new(0, 0, 10, -1).is_degenerate());
        assert!(!ScreenRect::new(-5, -5, 1, 1).is_degenerate());
    }

    #[test]
    fn test_region_to_pixels_rounds() {
        let r = Region::new(0.055, 0.078, 0.16, 0.05);
        assert_eq!(region_to_pixels(&r, 1000, 800), PixelRect::new(55, 62, 160, 40));
    }

    #[test]
    fn test_region_to_pixels_clamps_to_surface() {
        let r = Region::new(0.9, 0.95, 0.5, 0.5);
        let px = region_to_pixels(&r, 100, 100);
        assert_eq!(px, PixelRect::new(90, 95, 10, 5));

        let edge = Region::new(1.0, 1.0, 0.001, 0.001);
        assert_eq!(region_to_pixels(&edge, 100, 100), PixelRect::new(99, 99, 1, 1));
    }

    #[test]
    fn test_pixels_to_region() {
        let r = pixels_to_region(50.0, 100.0, 50.0, 80.0, 1000.0, 800.0);
        assert!((r.x - 0.05).abs() < 1e-9);
        assert!((r.y - 0.125).abs() < 1e-9);
        assert!((r.w - 0.05).abs() < 1e-9);
        assert!((r.h - 0.1).abs() < 1e-9);
    }
}
