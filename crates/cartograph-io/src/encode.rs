use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tiff::TiffEncoder;
use image::{ExtendedColorType, ImageEncoder};

use cartograph_core::feature::ImageData;

use crate::error::EncodeError;

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Output image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg { quality: u8 },
    Bmp,
    Tiff,
}

impl ImageFormat {
    /// Infer the format from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self, EncodeError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg {
                quality: DEFAULT_JPEG_QUALITY,
            }),
            "bmp" => Ok(ImageFormat::Bmp),
            "tif" | "tiff" => Ok(ImageFormat::Tiff),
            _ => Err(EncodeError::UnsupportedFormat(
                path.extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string()),
            )),
        }
    }

    /// Parse a format string: `png`, `png32`, `jpeg`, `jpegNN`, `bmp`, `tiff`.
    pub fn from_name(name: &str) -> Result<Self, EncodeError> {
        let lower = name.trim().to_ascii_lowercase();
        let format = match lower.as_str() {
            "png" | "png32" => ImageFormat::Png,
            "jpeg" | "jpg" => ImageFormat::Jpeg {
                quality: DEFAULT_JPEG_QUALITY,
            },
            "bmp" => ImageFormat::Bmp,
            "tif" | "tiff" => ImageFormat::Tiff,
            other => {
                let quality = other
                    .strip_prefix("jpeg")
                    .and_then(|q| q.parse::<u8>().ok())
                    .filter(|q| (1..=100).contains(q))
                    .ok_or_else(|| EncodeError::UnsupportedFormat(name.to_string()))?;
                ImageFormat::Jpeg { quality }
            }
        };
        Ok(format)
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageFormat::Png => write!(f, "png"),
            ImageFormat::Jpeg { quality } => write!(f, "jpeg{}", quality),
            ImageFormat::Bmp => write!(f, "bmp"),
            ImageFormat::Tiff => write!(f, "tiff"),
        }
    }
}

/// Encode an image into memory.
pub fn encode_to_vec(image: &ImageData, format: ImageFormat) -> Result<Vec<u8>, EncodeError> {
    let (w, h) = (image.width(), image.height());
    let data = image.data();
    let mut buf = Vec::new();
    match format {
        ImageFormat::Png => {
            PngEncoder::new(&mut buf).write_image(data, w, h, ExtendedColorType::Rgba8)?
        }
        ImageFormat::Jpeg { quality } => {
            // No alpha channel: flatten over black.
            let rgb: Vec<u8> = data
                .chunks_exact(4)
                .flat_map(|p| {
                    let a = p[3] as u16;
                    [0, 1, 2].map(|i| ((p[i] as u16 * a + 127) / 255) as u8)
                })
                .collect();
            JpegEncoder::new_with_quality(&mut buf, quality).write_image(
                &rgb,
                w,
                h,
                ExtendedColorType::Rgb8,
            )?
        }
        ImageFormat::Bmp => {
            BmpEncoder::new(&mut buf).write_image(data, w, h, ExtendedColorType::Rgba8)?
        }
        ImageFormat::Tiff => {
            let mut cursor = Cursor::new(Vec::new());
            TiffEncoder::new(&mut cursor).write_image(
                data,
                w,
                h,
                ExtendedColorType::Rgba8,
            )?;
            buf = cursor.into_inner();
        }
    }
    Ok(buf)
}

/// Write an image to `path`, choosing the format from the extension.
///
/// The format is resolved and the image encoded before the file is
/// created, so a failure leaves no file behind.
pub fn save(image: &ImageData, path: impl AsRef<Path>) -> Result<(), EncodeError> {
    let path = path.as_ref();
    let format = ImageFormat::from_path(path)?;
    save_as(image, path, format)
}

/// Write an image to `path` in an explicit format.
pub fn save_as(image: &ImageData, path: impl AsRef<Path>, format: ImageFormat) -> Result<(), EncodeError> {
    let path = path.as_ref();
    let bytes = encode_to_vec(image, format)?;
    fs::write(path, &bytes)?;
    log::info!(
        "Wrote {} image {}x{} to {} ({} bytes)",
        format,
        image.width(),
        image.height(),
        path.display(),
        bytes.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ImageData {
        let mut data = Vec::new();
        for i in 0..(6 * 3) {
            data.extend_from_slice(&[(i * 10) as u8, 100, 200, 255]);
        }
        ImageData::new(6, 3, data).unwrap()
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ImageFormat::from_path(Path::new("a.PNG")).unwrap(), ImageFormat::Png);
        assert_eq!(
            ImageFormat::from_path(Path::new("a.jpeg")).unwrap(),
            ImageFormat::Jpeg { quality: 85 }
        );
        assert_eq!(ImageFormat::from_path(Path::new("a.tif")).unwrap(), ImageFormat::Tiff);
        assert!(matches!(
            ImageFormat::from_path(Path::new("a.webp")),
            Err(EncodeError::UnsupportedFormat(ref e)) if e == "webp"
        ));
        assert!(ImageFormat::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_format_from_name() {
        assert_eq!(ImageFormat::from_name("png32").unwrap(), ImageFormat::Png);
        assert_eq!(
            ImageFormat::from_name("jpeg70").unwrap(),
            ImageFormat::Jpeg { quality: 70 }
        );
        assert!(ImageFormat::from_name("jpeg0").is_err());
        assert!(ImageFormat::from_name("png8").is_err());
        assert_eq!(ImageFormat::Jpeg { quality: 70 }.to_string(), "jpeg70");
    }

    #[test]
    fn test_round_trip_through_decoders() {
        let img = sample();
        for format in [ImageFormat::Png, ImageFormat::Bmp, ImageFormat::Tiff] {
            let bytes = encode_to_vec(&img, format).unwrap();
            let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
            assert_eq!(decoded.dimensions(), (6, 3), "{}", format);
            assert_eq!(decoded.into_raw(), img.data(), "{}", format);
        }
        let jpeg = encode_to_vec(&img, ImageFormat::Jpeg { quality: 90 }).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_unsupported_extension_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.gif");
        assert!(matches!(save(&sample(), &path), Err(EncodeError::UnsupportedFormat(_))));
        assert!(!path.exists());

        let png = dir.path().join("out.png");
        save(&sample(), &png).unwrap();
        assert!(png.metadata().unwrap().len() > 0);
    }
}
