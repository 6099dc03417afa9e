use std::io::Cursor;
use std::path::Path;

use image::io::Reader as ImageReader;
use image::DynamicImage;

use crate::transform::TransformError;

/// Decode raw upload/file bytes into a generic bitmap. The container
/// format is sniffed from magic bytes; HEIC/HEIF goes through the
/// external libheif decoder when the `heif` feature is enabled.
pub fn decode_image(bytes: &[u8], file_name: &str) -> Result<DynamicImage, TransformError> {
    if has_heif_extension(file_name) {
        return decode_heif(bytes, file_name);
    }

    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    Ok(reader.decode()?)
}

fn has_heif_extension(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "heic" | "heif"))
        .unwrap_or(false)
}

#[cfg(feature = "heif")]
fn decode_heif(bytes: &[u8], file_name: &str) -> Result<DynamicImage, TransformError> {
    use image::RgbImage;
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    let lib_heif = LibHeif::new();
    let ctx = HeifContext::read_from_bytes(bytes)?;
    let handle = ctx.primary_image_handle()?;
    let decoded = lib_heif.decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)?;

    let planes = decoded.planes();
    let plane = planes.interleaved.ok_or_else(|| {
        TransformError::UnsupportedFormat(format!("{file_name}: no interleaved RGB plane"))
    })?;

    let width = plane.width;
    let height = plane.height;
    let stride = plane.stride;
    let mut rgb = RgbImage::new(width, height);
    for y in 0..height {
        let row = &plane.data[y as usize * stride..y as usize * stride + width as usize * 3];
        for x in 0..width {
            let i = x as usize * 3;
            rgb.put_pixel(x, y, image::Rgb([row[i], row[i + 1], row[i + 2]]));
        }
    }
    Ok(DynamicImage::ImageRgb8(rgb))
}

#[cfg(not(feature = "heif"))]
fn decode_heif(_bytes: &[u8], file_name: &str) -> Result<DynamicImage, TransformError> {
    Err(TransformError::UnsupportedFormat(format!(
        "{file_name}: HEIC/HEIF support requires the `heif` feature"
    )))
}
