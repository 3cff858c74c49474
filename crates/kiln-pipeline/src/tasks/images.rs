//! Image optimization.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ImageFormat, ImageReader};
use rayon::prelude::*;

use crate::config::PipelineConfig;
use crate::sources::{SourceFile, SourceSet};
use crate::tasks::{write_output, TaskError};

/// Optimize images into `images.dest` in parallel.
///
/// PNG and JPEG files are re-encoded and the result kept only when it is
/// smaller. Everything else is copied as-is.
pub fn images(config: &PipelineConfig) -> Result<usize, TaskError> {
    let files = SourceSet::new(&config.root, &config.images.src)?.files();
    let dest = config.output(&config.images.dest);
    let quality = config.images.jpeg_quality;

    let results: Vec<Result<(), TaskError>> = files
        .par_iter()
        .map(|file| optimize_file(file, &dest.join(&file.relative), quality))
        .collect();

    let mut failed = 0;
    for result in results {
        if let Err(e) = result {
            tracing::error!("{}", e);
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(TaskError::Partial {
            task: "images",
            failed,
            total: files.len(),
        });
    }

    Ok(files.len())
}

fn optimize_file(file: &SourceFile, output: &Path, quality: u8) -> Result<(), TaskError> {
    let original = fs::read(&file.path).map_err(|e| TaskError::io(&file.path, e))?;

    let optimized = match ImageFormat::from_path(&file.path) {
        Ok(ImageFormat::Png) => reencode(&original, ImageFormat::Png, quality),
        Ok(ImageFormat::Jpeg) => reencode(&original, ImageFormat::Jpeg, quality),
        _ => None,
    };

    match optimized {
        Some(bytes) if bytes.len() < original.len() => {
            tracing::debug!(
                "{}: {} -> {} bytes",
                file.relative.display(),
                original.len(),
                bytes.len()
            );
            write_output(output, bytes)
        }
        _ => write_output(output, original),
    }
}

/// Decode and encode again. `None` when the image cannot be processed.
fn reencode(bytes: &[u8], format: ImageFormat, quality: u8) -> Option<Vec<u8>> {
    let img = ImageReader::with_format(Cursor::new(bytes), format)
        .decode()
        .inspect_err(|e| tracing::warn!("Could not decode image: {}", e))
        .ok()?;

    let mut out = Vec::new();
    let encoded = match format {
        ImageFormat::Png => img.write_with_encoder(PngEncoder::new_with_quality(
            &mut out,
            CompressionType::Best,
            FilterType::Adaptive,
        )),
        ImageFormat::Jpeg => {
            img.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))
        }
        _ => return None,
    };

    encoded
        .inspect_err(|e| tracing::warn!("Could not encode image: {}", e))
        .ok()?;
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::testing::{config, write};
    use image::{ImageEncoder, RgbImage};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    /// A gradient PNG written without filtering at the fastest level.
    fn bloated_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut out = Vec::new();
        PngEncoder::new_with_quality(&mut out, CompressionType::Fast, FilterType::NoFilter)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();
        out
    }

    fn jpeg(width: u32, height: u32, quality: u8) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();
        out
    }

    #[test]
    fn shrinks_png_and_jpeg() {
        let temp = tempdir().unwrap();
        let png = bloated_png(128, 128);
        let jpg = jpeg(64, 64, 100);
        write(temp.path(), "src/assets/images/gradient.png", &png);
        write(temp.path(), "src/assets/images/photos/grad.jpg", &jpg);

        let written = images(&config(temp.path(), false)).unwrap();

        assert_eq!(written, 2);
        let out_png = fs::read(temp.path().join("dist/assets/images/gradient.png")).unwrap();
        let out_jpg = fs::read(temp.path().join("dist/assets/images/photos/grad.jpg")).unwrap();
        assert!(out_png.len() < png.len());
        assert!(out_jpg.len() < jpg.len());
    }

    #[test]
    fn keeps_original_when_not_smaller() {
        let temp = tempdir().unwrap();
        let jpg = jpeg(32, 32, 20);
        write(temp.path(), "src/assets/images/small.jpg", &jpg);

        images(&config(temp.path(), false)).unwrap();

        let out = fs::read(temp.path().join("dist/assets/images/small.jpg")).unwrap();
        assert_eq!(out, jpg);
    }

    #[test]
    fn copies_other_formats_verbatim() {
        let temp = tempdir().unwrap();
        let svg = "<svg xmlns=\"http://www.w3.org/2000/svg\"></svg>";
        write(temp.path(), "src/assets/images/logo.svg", svg);
        write(temp.path(), "src/assets/images/broken.png", "not a png");

        let written = images(&config(temp.path(), false)).unwrap();

        assert_eq!(written, 2);
        assert_eq!(
            fs::read_to_string(temp.path().join("dist/assets/images/logo.svg")).unwrap(),
            svg
        );
        assert_eq!(
            fs::read_to_string(temp.path().join("dist/assets/images/broken.png")).unwrap(),
            "not a png"
        );
    }
}
