use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decode;

/// All output is JPEG at this quality, regardless of input format.
pub const JPEG_QUALITY: u8 = 95;

pub const DEFAULT_CANVAS_WIDTH: u32 = 1080;
pub const DEFAULT_CANVAS_HEIGHT: u32 = 1350;
pub const DEFAULT_VERTICAL_PADDING: u32 = 32;
pub const DEFAULT_HORIZONTAL_PADDING: u32 = 114;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error(
        "canvas {canvas_width}x{canvas_height} leaves no room inside \
         padding h={horizontal_padding} v={vertical_padding}"
    )]
    DegenerateGeometry {
        canvas_width: u32,
        canvas_height: u32,
        vertical_padding: u32,
        horizontal_padding: u32,
    },

    #[error("scaled size {width}x{height} is degenerate")]
    DegenerateSize { width: u32, height: u32 },

    #[error("decode error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "heif")]
    #[error("HEIF decode error: {0}")]
    Heif(#[from] libheif_rs::HeifError),
}

/// Target canvas dimensions plus the padding reserved on each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasGeometry {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub vertical_padding: u32,
    pub horizontal_padding: u32,
}

impl Default for CanvasGeometry {
    fn default() -> Self {
        Self {
            canvas_width: DEFAULT_CANVAS_WIDTH,
            canvas_height: DEFAULT_CANVAS_HEIGHT,
            vertical_padding: DEFAULT_VERTICAL_PADDING,
            horizontal_padding: DEFAULT_HORIZONTAL_PADDING,
        }
    }
}

impl CanvasGeometry {
    pub fn new(
        canvas_width: u32,
        canvas_height: u32,
        vertical_padding: u32,
        horizontal_padding: u32,
    ) -> Self {
        Self {
            canvas_width,
            canvas_height,
            vertical_padding,
            horizontal_padding,
        }
    }

    /// Canvas dimensions minus padding on both sides of each axis.
    /// Errors when the padding consumes the whole canvas.
    pub fn fittable_area(&self) -> Result<(u32, u32), TransformError> {
        let max_width = self
            .canvas_width
            .checked_sub(2 * self.horizontal_padding)
            .filter(|w| *w > 0);
        let max_height = self
            .canvas_height
            .checked_sub(2 * self.vertical_padding)
            .filter(|h| *h > 0);

        match (max_width, max_height) {
            (Some(w), Some(h)) => Ok((w, h)),
            _ => Err(TransformError::DegenerateGeometry {
                canvas_width: self.canvas_width,
                canvas_height: self.canvas_height,
                vertical_padding: self.vertical_padding,
                horizontal_padding: self.horizontal_padding,
            }),
        }
    }
}

/// Where the scaled image lands on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

/// Compute the uniform scale that fits (width, height) inside the padded
/// canvas interior and the centered offset for the result. The binding
/// axis determines the scale; new dimensions truncate.
pub fn fit(width: u32, height: u32, geometry: &CanvasGeometry) -> Result<Placement, TransformError> {
    if width == 0 || height == 0 {
        return Err(TransformError::DegenerateSize { width, height });
    }

    let (max_width, max_height) = geometry.fittable_area()?;

    let width_ratio = max_width as f64 / width as f64;
    let height_ratio = max_height as f64 / height as f64;
    let scale = width_ratio.min(height_ratio);

    let new_width = (width as f64 * scale) as u32;
    let new_height = (height as f64 * scale) as u32;
    if new_width == 0 || new_height == 0 {
        // Extreme aspect ratios can floor the short axis to nothing.
        return Err(TransformError::DegenerateSize {
            width: new_width,
            height: new_height,
        });
    }

    Ok(Placement {
        width: new_width,
        height: new_height,
        x: (geometry.canvas_width - new_width) / 2,
        y: (geometry.canvas_height - new_height) / 2,
    })
}

/// Scale the image to fit the padded interior and paste it centered onto
/// a solid white canvas. Alpha flattens against the white background;
/// the result is always RGB at exactly the canvas dimensions.
pub fn resize_and_center(
    img: &DynamicImage,
    geometry: &CanvasGeometry,
) -> Result<RgbImage, TransformError> {
    let placement = fit(img.width(), img.height(), geometry)?;

    let resized = img
        .resize_exact(placement.width, placement.height, FilterType::Lanczos3)
        .to_rgba8();

    let mut canvas = RgbaImage::from_pixel(
        geometry.canvas_width,
        geometry.canvas_height,
        Rgba([255, 255, 255, 255]),
    );
    imageops::overlay(&mut canvas, &resized, placement.x as i64, placement.y as i64);

    Ok(DynamicImage::ImageRgba8(canvas).to_rgb8())
}

/// Apply any embedded EXIF orientation to the decoded image so that the
/// transform measures upright dimensions. Missing or unreadable metadata
/// leaves the image untouched.
pub fn normalize_orientation(raw_bytes: &[u8], img: DynamicImage) -> DynamicImage {
    match exif_orientation(raw_bytes) {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

fn exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let Ok(data) = exif::Reader::new().read_from_container(&mut cursor) else {
        return 1;
    };
    data.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .unwrap_or(1)
}

pub fn encode_jpeg(img: &RgbImage) -> Result<Vec<u8>, TransformError> {
    let mut buffer = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
    encoder.encode(img.as_raw(), img.width(), img.height(), image::ColorType::Rgb8)?;
    Ok(buffer.into_inner())
}

/// Full single-image pipeline: decode, correct orientation, fit and
/// center, encode JPEG. Both the web and folder callers run each file
/// through this.
pub fn process_bytes(
    bytes: &[u8],
    file_name: &str,
    geometry: &CanvasGeometry,
) -> Result<Vec<u8>, TransformError> {
    let img = decode::decode_image(bytes, file_name)?;
    let img = normalize_orientation(bytes, img);
    let canvas = resize_and_center(&img, geometry)?;
    encode_jpeg(&canvas)
}
