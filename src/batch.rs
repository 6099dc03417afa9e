use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::transform::{self, CanvasGeometry, TransformError};

/// Extensions the folder scan picks up. Everything else is ignored.
pub const SUPPORTED_EXTENSIONS: &[&str] =
    &["jpg", "jpeg", "png", "bmp", "gif", "tiff", "heic", "heif"];

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("input folder does not exist: {0}")]
    MissingInput(PathBuf),

    #[error("input path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error(
        "output folder {} is inside watched folder {}; every result would be picked up again",
        output.display(),
        input.display()
    )]
    OutputInsideInput { input: PathBuf, output: PathBuf },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Files transformed and written.
    pub processed: usize,
    /// Recognized images that failed to decode, transform, or write.
    pub failed: usize,
    /// Directory entries with unrecognized extensions.
    pub skipped: usize,
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let lower = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

/// Transform every recognized image in `input_dir` and write the JPEG
/// results to `output_dir`, creating it if absent. Per-file failures are
/// logged and skipped; the scan always runs to completion.
pub fn process_folder(
    input_dir: &Path,
    output_dir: &Path,
    geometry: &CanvasGeometry,
) -> Result<BatchSummary, BatchError> {
    if !input_dir.exists() {
        return Err(BatchError::MissingInput(input_dir.to_path_buf()));
    }
    if !input_dir.is_dir() {
        return Err(BatchError::NotADirectory(input_dir.to_path_buf()));
    }
    fs::create_dir_all(output_dir)?;

    let mut entries: Vec<PathBuf> = fs::read_dir(input_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    // Deterministic processing order regardless of directory layout.
    entries.sort();

    let mut summary = BatchSummary::default();
    for path in entries {
        if !is_image_file(&path) {
            summary.skipped += 1;
            continue;
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        match process_file(&path, output_dir, geometry) {
            Ok(output_path) => {
                summary.processed += 1;
                println!(
                    "✓ Processed: {} -> {}",
                    name,
                    output_path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default()
                );
            }
            Err(e) => {
                summary.failed += 1;
                log::warn!("skipping {}: {}", name, e);
                eprintln!("⚠ Skipping {}: {}", name, e);
            }
        }
    }

    Ok(summary)
}

/// Run one file through the transform pipeline and write the JPEG next
/// to its siblings in `output_dir`. Used by both the scan and watch mode.
pub fn process_file(
    path: &Path,
    output_dir: &Path,
    geometry: &CanvasGeometry,
) -> Result<PathBuf, TransformError> {
    let bytes = fs::read(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let jpeg = transform::process_bytes(&bytes, &name, geometry)?;

    let output_path = output_path_for(output_dir, path);
    fs::write(&output_path, jpeg)?;
    Ok(output_path)
}

/// Output name is the input stem with a .jpg extension. An existing file
/// of that name gets a timestamp suffix instead of being overwritten.
fn output_path_for(output_dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());

    let candidate = output_dir.join(format!("{stem}.jpg"));
    if !candidate.exists() {
        return candidate;
    }

    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%3f");
    output_dir.join(format!("{stem}_{timestamp}.jpg"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::io::Cursor;

    fn temp_workspace(tag: &str) -> (PathBuf, PathBuf) {
        let base = std::env::temp_dir().join(format!(
            "canvas_resizer_{}_{}",
            tag,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&base);
        let input = base.join("input");
        let output = base.join("output");
        fs::create_dir_all(&input).unwrap();
        (input, output)
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([80, 80, 80])));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, image::ImageOutputFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("test.jpg")));
        assert!(is_image_file(Path::new("test.jpeg")));
        assert!(is_image_file(Path::new("test.png")));
        assert!(is_image_file(Path::new("test.heic")));
        assert!(is_image_file(Path::new("TEST.TIFF")));
        assert!(!is_image_file(Path::new("test.txt")));
        assert!(!is_image_file(Path::new("test.tif")));
        assert!(!is_image_file(Path::new("test")));
    }

    #[test]
    fn test_process_folder_isolates_failures() {
        let (input, output) = temp_workspace("isolate");
        fs::write(input.join("a.png"), png_bytes(640, 480)).unwrap();
        fs::write(input.join("b.png"), png_bytes(200, 900)).unwrap();
        fs::write(input.join("broken.png"), b"definitely not a png").unwrap();
        fs::write(input.join("notes.txt"), b"ignore me").unwrap();

        let summary = process_folder(&input, &output, &CanvasGeometry::default()).unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);

        let mut written: Vec<String> = fs::read_dir(&output)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        written.sort();
        assert_eq!(written, vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn test_process_folder_creates_output_dir() {
        let (input, output) = temp_workspace("mkdir");
        fs::write(input.join("only.png"), png_bytes(100, 100)).unwrap();
        assert!(!output.exists());

        let summary = process_folder(&input, &output, &CanvasGeometry::default()).unwrap();
        assert_eq!(summary.processed, 1);
        assert!(output.join("only.jpg").exists());
    }

    #[test]
    fn test_process_folder_rejects_missing_input() {
        let (input, output) = temp_workspace("missing");
        let gone = input.join("nope");
        assert!(matches!(
            process_folder(&gone, &output, &CanvasGeometry::default()),
            Err(BatchError::MissingInput(_))
        ));
    }

    #[test]
    fn test_empty_folder_yields_empty_summary() {
        let (input, output) = temp_workspace("empty");
        let summary = process_folder(&input, &output, &CanvasGeometry::default()).unwrap();
        assert_eq!(summary, BatchSummary::default());
    }

    #[test]
    fn test_collision_gets_timestamp_suffix() {
        let (input, output) = temp_workspace("collision");
        fs::create_dir_all(&output).unwrap();
        let source = input.join("photo.png");
        fs::write(&source, png_bytes(300, 300)).unwrap();

        let geometry = CanvasGeometry::default();
        let first = process_file(&source, &output, &geometry).unwrap();
        let second = process_file(&source, &output, &geometry).unwrap();
        assert_ne!(first, second);
        assert!(first.exists());
        assert!(second.exists());
        assert!(second
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("photo_"));
    }

    #[test]
    fn test_degenerate_geometry_counts_as_failure() {
        let (input, output) = temp_workspace("degenerate");
        fs::write(input.join("a.png"), png_bytes(640, 480)).unwrap();

        // Padding wider than the canvas: every image fails, none abort.
        let geometry = CanvasGeometry::new(100, 1350, 32, 114);
        let summary = process_folder(&input, &output, &geometry).unwrap();
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.failed, 1);
    }
}
