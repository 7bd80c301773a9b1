//! Preview rendering for calibration.
//!
//! Draws every calibrated region onto a screenshot as a coloured, labelled
//! rectangle. The active field is drawn with a thicker border.

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgba, RgbaImage};

use crate::capture::{region_to_pixels, PixelRect};
use crate::regions::{RegionKey, RegionSet};

const SHADE: Rgba<u8> = Rgba([0, 0, 0, 64]);
const LABEL_BG: Rgba<u8> = Rgba([0, 0, 0, 160]);
const LABEL_FG: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const COLOR_CANDIDATE: Rgba<u8> = Rgba([255, 255, 255, 242]);

/// Border colour of each field.
pub fn key_color(key: RegionKey) -> Rgba<u8> {
    match key {
        RegionKey::Lvl => Rgba([255, 215, 0, 230]),      // Gold
        RegionKey::Charname => Rgba([255, 140, 0, 230]), // Orange
        RegionKey::Exp => Rgba([0, 255, 255, 230]),      // Cyan
        RegionKey::Lauftext => Rgba([180, 120, 255, 230]),
        RegionKey::RmExp => Rgba([0, 255, 120, 230]),
        RegionKey::EnemyName => Rgba([255, 80, 80, 230]),
        RegionKey::EnemyHp => Rgba([255, 0, 160, 230]),
    }
}

/// Renders `regions` onto a copy of `screenshot`.
pub fn render_regions(
    screenshot: &RgbaImage,
    regions: &RegionSet,
    active: Option<RegionKey>,
) -> RgbaImage {
    let mut img = screenshot.clone();
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return img;
    }

    for (key, region) in regions.iter() {
        let rect = region_to_pixels(&region, width, height);
        let thickness = if active == Some(key) { 4 } else { 2 };
        fill_rect(&mut img, rect, SHADE);
        draw_rect(&mut img, rect, key_color(key), thickness);
        draw_label(&mut img, rect.x + 4, rect.y + 4, key.label());
    }

    img
}

/// Draws a rectangle border on an image, clipped to its bounds.
pub fn draw_rect(img: &mut RgbaImage, rect: PixelRect, color: Rgba<u8>, thickness: u32) {
    let PixelRect { x, y, width: w, height: h } = rect;
    let t = thickness.min(w).min(h);
    for dy in 0..h {
        for dx in 0..w {
            let edge = dy < t || dy >= h - t || dx < t || dx >= w - t;
            if edge {
                blend(img, x + dx, y + dy, color);
            }
        }
    }
}

/// Blends `color` over every pixel of `rect`.
pub fn fill_rect(img: &mut RgbaImage, rect: PixelRect, color: Rgba<u8>) {
    for dy in 0..rect.height {
        for dx in 0..rect.width {
            blend(img, rect.x + dx, rect.y + dy, color);
        }
    }
}

/// Draws `text` in 8×8 bitmap glyphs on a dark plate.
pub fn draw_label(img: &mut RgbaImage, x: u32, y: u32, text: &str) {
    let chars = text.chars().count() as u32;
    fill_rect(img, PixelRect::new(x.saturating_sub(2), y.saturating_sub(2), chars * 8 + 4, 12), LABEL_BG);

    for (i, ch) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            continue;
        };
        let gx = x + i as u32 * 8;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..8u32 {
                if (bits >> col) & 1 == 1 {
                    blend(img, gx + col, y + row as u32, LABEL_FG);
                }
            }
        }
    }
}

fn blend(img: &mut RgbaImage, x: u32, y: u32, src: Rgba<u8>) {
    if x >= img.width() || y >= img.height() {
        return;
    }
    let a = f32::from(src[3]) / 255.0;
    let dst = img.get_pixel_mut(x, y);
    for c in 0..3 {
        dst[c] = (f32::from(dst[c]) * (1.0 - a) + f32::from(src[c]) * a).round() as u8;
    }
    dst[3] = dst[3].max(src[3]);
}
