//! Corner annotations burned into fetched JPEGs
//!
//! Text is laid out in the four corners of the image:
//!
//! ```text
//! Name: …                      Series: …
//! ID: …                         Image: …
//! Date: …
//!
//! Modality: …                 Institution
//! Study: … / …          Referring physician
//! ```
//!
//! Right-hand blocks are aligned using the measured text width so they end
//! one padding short of the right edge.

mod text;

pub use text::{BitmapRenderer, TextRenderer, TrueTypeRenderer};

use crate::config::AnnotationConfig;
use crate::error::Result;
use crate::types::InstanceMetadata;
use chrono::NaiveDate;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Smallest font size used for annotations
pub const MIN_FONT_SIZE: u32 = 9;

/// Font metrics derived from the image height
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Text pixel size
    pub font_size: u32,
    /// Distance between text and the image edges
    pub padding: u32,
    /// Vertical distance between consecutive lines
    pub line_spacing: u32,
}

impl Layout {
    /// Layout for an image of the given height
    ///
    /// Font size is 1.7% of the height rounded up, never below
    /// [`MIN_FONT_SIZE`]; padding is half the font size and line spacing adds
    /// a quarter of it, both rounded up.
    pub fn for_height(height: u32) -> Self {
        let font_size = font_size(height);
        Self {
            font_size,
            padding: font_size.div_ceil(2),
            line_spacing: font_size + font_size.div_ceil(4),
        }
    }
}

/// Annotation font size for an image of the given height
pub fn font_size(height: u32) -> u32 {
    // ceil(height * 0.017) in integer arithmetic
    let scaled = (u64::from(height) * 17).div_ceil(1000) as u32;
    scaled.max(MIN_FONT_SIZE)
}

/// Render a DICOM person name as `Given Middle Family`
///
/// Only the alphabetic component group is used; empty parts are omitted.
pub fn format_person_name(raw: &str) -> String {
    let alphabetic = raw.split('=').next().unwrap_or_default();
    let mut parts = alphabetic.split('^').map(str::trim);
    let family = parts.next().unwrap_or_default();
    let given = parts.next().unwrap_or_default();
    let middle = parts.next().unwrap_or_default();

    [given, middle, family]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render a `YYYYMMDD` date as `DD-Mon-YYYY`, or the raw value if it does not parse
pub fn format_study_date(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    match NaiveDate::parse_from_str(trimmed, "%Y%m%d") {
        Ok(date) => date.format("%d-%b-%Y").to_string(),
        Err(_) => raw.to_string(),
    }
}

/// One positioned line of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPlacement {
    /// Left edge in pixels
    pub x: i32,
    /// Top edge in pixels
    pub y: i32,
    /// Text to draw
    pub text: String,
}

/// Burns instance metadata into images
#[derive(Clone)]
pub struct Annotator {
    renderer: Arc<dyn TextRenderer>,
    color: Rgb<u8>,
    jpeg_quality: u8,
}

impl Annotator {
    /// Create an annotator with an explicit renderer
    pub fn new(renderer: Arc<dyn TextRenderer>, color: [u8; 3], jpeg_quality: u8) -> Self {
        Self {
            renderer,
            color: Rgb(color),
            jpeg_quality,
        }
    }

    /// Create an annotator from configuration
    ///
    /// A missing or unreadable font falls back to the built-in bitmap font.
    pub fn from_config(config: &AnnotationConfig) -> Self {
        let renderer: Arc<dyn TextRenderer> = match &config.font_path {
            Some(path) => match TrueTypeRenderer::load(path) {
                Ok(renderer) => Arc::new(renderer),
                Err(e) => {
                    warn!(?path, error = %e, "annotation font not usable, using built-in bitmap font");
                    Arc::new(BitmapRenderer)
                }
            },
            None => Arc::new(BitmapRenderer),
        };
        debug!(renderer = renderer.name(), "annotation renderer selected");
        Self::new(renderer, config.color, config.jpeg_quality)
    }

    /// Name of the active text renderer
    pub fn renderer_name(&self) -> &'static str {
        self.renderer.name()
    }

    /// Where each line goes on an image of the given size
    pub fn placements(&self, width: u32, height: u32, metadata: &InstanceMetadata) -> Vec<TextPlacement> {
        let layout = Layout::for_height(height);
        let padding = layout.padding as i32;
        let spacing = layout.line_spacing as i32;
        let width = width as i32;
        let height = height as i32;

        let top_left = [
            format!("Name: {}", format_person_name(&metadata.patient_name)),
            format!("ID: {}", metadata.patient_id),
            format!("Date: {}", format_study_date(&metadata.study_date)),
        ];
        let top_right = [
            format!("Series: {}", metadata.series_number),
            format!("Image: {}", metadata.instance_number),
        ];
        let bottom_left = [
            format!("Modality: {}", metadata.modality),
            format!(
                "Study: {} / {}",
                metadata.study_description, metadata.body_part
            ),
        ];
        let bottom_right = [
            metadata.institution.clone(),
            format_person_name(&metadata.referring_physician),
        ];

        let right_x = |text: &str| {
            let text_width = self.renderer.text_width(text, layout.font_size) as i32;
            (width - text_width - padding).max(0)
        };
        let bottom_y = |lines: usize| height - lines as i32 * spacing - padding;

        let mut placements = Vec::with_capacity(9);
        for (i, text) in top_left.into_iter().enumerate() {
            placements.push(TextPlacement {
                x: padding,
                y: padding + i as i32 * spacing,
                text,
            });
        }
        for (i, text) in top_right.into_iter().enumerate() {
            placements.push(TextPlacement {
                x: right_x(&text),
                y: padding + i as i32 * spacing,
                text,
            });
        }
        let start = bottom_y(bottom_left.len());
        for (i, text) in bottom_left.into_iter().enumerate() {
            placements.push(TextPlacement {
                x: padding,
                y: start + i as i32 * spacing,
                text,
            });
        }
        let start = bottom_y(bottom_right.len());
        for (i, text) in bottom_right.into_iter().enumerate() {
            placements.push(TextPlacement {
                x: right_x(&text),
                y: start + i as i32 * spacing,
                text,
            });
        }
        placements
    }

    /// Return a copy of `image` with metadata in its corners
    pub fn annotate(&self, image: &RgbImage, metadata: &InstanceMetadata) -> RgbImage {
        let mut annotated = image.clone();
        self.annotate_in_place(&mut annotated, metadata);
        annotated
    }

    /// Draw metadata into `image`
    pub fn annotate_in_place(&self, image: &mut RgbImage, metadata: &InstanceMetadata) {
        let font_size = Layout::for_height(image.height()).font_size;
        for placement in self.placements(image.width(), image.height(), metadata) {
            if placement.text.is_empty() {
                continue;
            }
            self.renderer.draw_text(
                image,
                placement.x,
                placement.y,
                &placement.text,
                font_size,
                self.color,
            );
        }
    }

    /// Decode the JPEG at `path`, annotate it and write it back as JPEG
    ///
    /// Blocking; run it on a blocking thread from async code.
    pub fn annotate_file(&self, path: &Path, metadata: &InstanceMetadata) -> Result<()> {
        let mut image = image::open(path)?.to_rgb8();
        self.annotate_in_place(&mut image, metadata);

        let mut encoded = Vec::new();
        image.write_with_encoder(JpegEncoder::new_with_quality(&mut encoded, self.jpeg_quality))?;
        std::fs::write(path, encoded)?;
        Ok(())
    }
}
