//! Text rasterization onto RGB images

use crate::error::{Error, Result};
use image::{Rgb, RgbImage};
use std::path::Path;

/// Draws single lines of text at a pixel size
pub trait TextRenderer: Send + Sync {
    /// Advance width of `text` in pixels
    fn text_width(&self, text: &str, size: u32) -> u32;

    /// Draw `text` with its line box's top-left corner at `(x, y)`
    ///
    /// Pixels falling outside the canvas are clipped.
    fn draw_text(&self, canvas: &mut RgbImage, x: i32, y: i32, text: &str, size: u32, color: Rgb<u8>);

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// TrueType font rasterized with fontdue
pub struct TrueTypeRenderer {
    font: fontdue::Font,
}

impl TrueTypeRenderer {
    /// Load a TrueType/OpenType font file
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Parse a font from memory
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())
            .map_err(|e| Error::config(format!("unusable font: {e}"), "annotation.font_path"))?;
        Ok(Self { font })
    }
}

impl TextRenderer for TrueTypeRenderer {
    fn text_width(&self, text: &str, size: u32) -> u32 {
        let px = size as f32;
        let width: f32 = text
            .chars()
            .map(|c| self.font.metrics(c, px).advance_width)
            .sum();
        width.ceil() as u32
    }

    fn draw_text(&self, canvas: &mut RgbImage, x: i32, y: i32, text: &str, size: u32, color: Rgb<u8>) {
        let px = size as f32;
        let ascent = self
            .font
            .horizontal_line_metrics(px)
            .map(|m| m.ascent)
            .unwrap_or(px);
        let baseline = y + ascent.round() as i32;
        let mut pen_x = x as f32;

        for c in text.chars() {
            let (metrics, coverage) = self.font.rasterize(c, px);
            let glyph_x = (pen_x + metrics.xmin as f32).round() as i32;
            let glyph_y = baseline - metrics.height as i32 - metrics.ymin;

            for row in 0..metrics.height {
                for col in 0..metrics.width {
                    let alpha = coverage[row * metrics.width + col];
                    if alpha > 0 {
                        blend(canvas, glyph_x + col as i32, glyph_y + row as i32, color, alpha);
                    }
                }
            }
            pen_x += metrics.advance_width;
        }
    }

    fn name(&self) -> &'static str {
        "truetype"
    }
}

const GLYPH_COLUMNS: u32 = 5;
const GLYPH_ROWS: u32 = 7;
const CELL_COLUMNS: u32 = GLYPH_COLUMNS + 1;

/// Built-in 5x7 bitmap font used when no TrueType font is available
///
/// Glyphs are scaled by whole pixels to approximate the requested size.
/// Lowercase letters render as uppercase; unknown characters render as `?`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BitmapRenderer;

impl BitmapRenderer {
    fn scale(size: u32) -> u32 {
        (size / GLYPH_ROWS).max(1)
    }
}

impl TextRenderer for BitmapRenderer {
    fn text_width(&self, text: &str, size: u32) -> u32 {
        text.chars().count() as u32 * CELL_COLUMNS * Self::scale(size)
    }

    fn draw_text(&self, canvas: &mut RgbImage, x: i32, y: i32, text: &str, size: u32, color: Rgb<u8>) {
        let scale = Self::scale(size);
        let top = y + (size.saturating_sub(GLYPH_ROWS * scale) / 2) as i32;

        for (index, c) in text.chars().enumerate() {
            let origin_x = x + (index as u32 * CELL_COLUMNS * scale) as i32;
            for (row, bits) in glyph(c).iter().enumerate() {
                for col in 0..GLYPH_COLUMNS {
                    if bits & (1 << (GLYPH_COLUMNS - 1 - col)) == 0 {
                        continue;
                    }
                    for dy in 0..scale {
                        for dx in 0..scale {
                            blend(
                                canvas,
                                origin_x + (col * scale + dx) as i32,
                                top + (row as u32 * scale + dy) as i32,
                                color,
                                u8::MAX,
                            );
                        }
                    }
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "bitmap"
    }
}

fn blend(canvas: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>, alpha: u8) {
    if x < 0 || y < 0 || x as u32 >= canvas.width() || y as u32 >= canvas.height() {
        return;
    }
    let pixel = canvas.get_pixel_mut(x as u32, y as u32);
    let a = u16::from(alpha);
    for channel in 0..3 {
        let under = u16::from(pixel.0[channel]);
        let over = u16::from(color.0[channel]);
        pixel.0[channel] = ((under * (255 - a) + over * a) / 255) as u8;
    }
}

fn glyph(c: char) -> [u8; 7] {
    match c.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        ' ' => [0x00; 7],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ',' => [0x00, 0x00, 0x00, 0x00, 0x0C, 0x04, 0x08],
        '^' => [0x04, 0x0A, 0x11, 0x00, 0x00, 0x00, 0x00],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        '\'' => [0x0C, 0x04, 0x08, 0x00, 0x00, 0x00, 0x00],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        _ => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
    }
}
