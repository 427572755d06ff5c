//! Output encodings over a finished [`ProcessingResult`].

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Instant;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat};
use tracing::{debug, warn};

use crate::errors::{PerspectraError, Result};
use crate::types::{ProcessingResult, Stage};

impl ProcessingResult<DynamicImage> {
    /// Re-encode the rectified image and wrap it in standard base64.
    pub fn encode_base64(self, format: ImageFormat) -> ProcessingResult<String> {
        self.encode_with(|image| to_base64(image, format))
    }

    /// Write the rectified image to `path`, the format following its extension.
    pub fn write_to(self, path: impl AsRef<Path>) -> ProcessingResult<PathBuf> {
        let path = path.as_ref();
        self.encode_with(|image| {
            write_file(image, path)?;
            Ok(path.to_path_buf())
        })
    }

    fn encode_with<T>(self, encode: impl FnOnce(&DynamicImage) -> Result<T>) -> ProcessingResult<T> {
        let Some(image) = self.image.as_ref().filter(|_| self.success) else {
            return self.map_failure();
        };

        let started = Instant::now();
        let outcome = encode(image);
        let duration = self.duration + started.elapsed();
        match outcome {
            Ok(encoded) => ProcessingResult::succeeded(encoded, Stage::Encoded, duration),
            Err(err) => {
                warn!(error = %err, "Encoding failed");
                ProcessingResult::failed(&err, Stage::Warped, duration)
            }
        }
    }
}

pub fn to_base64(image: &DynamicImage, format: ImageFormat) -> Result<String> {
    let bytes = to_bytes(image, format)?;
    debug!(?format, bytes = bytes.len(), "Image encoded for base64");
    Ok(STANDARD.encode(bytes))
}

pub fn to_bytes(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    let flattened;
    let image = if format == ImageFormat::Jpeg && image.color().has_alpha() {
        flattened = DynamicImage::ImageRgb8(image.to_rgb8());
        &flattened
    } else {
        image
    };
    image
        .write_to(&mut buffer, format)
        .map_err(|e| PerspectraError::encode(format!("{format:?} encoding"), e))?;
    Ok(buffer.into_inner())
}

pub fn write_file(image: &DynamicImage, path: &Path) -> Result<()> {
    let format = ImageFormat::from_path(path)
        .map_err(|e| PerspectraError::encode(format!("choosing a format for {}", path.display()), e))?;
    let bytes = to_bytes(image, format)?;
    std::fs::write(path, bytes)
        .map_err(|e| PerspectraError::encode(format!("writing {}", path.display()), e))?;
    debug!(path = %path.display(), ?format, "Image written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use std::time::Duration;

    fn rectified() -> ProcessingResult {
        ProcessingResult::succeeded(
            DynamicImage::new_rgb8(6, 4),
            Stage::Encoded,
            Duration::from_millis(5),
        )
    }

    #[test]
    fn test_base64_roundtrips_to_same_size() {
        let encoded = rectified().encode_base64(ImageFormat::Png);
        assert!(encoded.success);
        assert!(encoded.duration >= Duration::from_millis(5));
        let bytes = STANDARD.decode(encoded.image.unwrap()).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (6, 4));
    }

    #[test]
    fn test_jpeg_drops_alpha() {
        let rgba = DynamicImage::new_rgba8(4, 4);
        assert!(to_bytes(&rgba, ImageFormat::Jpeg).is_ok());
    }

    #[test]
    fn test_unwritable_path_is_encode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.png");
        let result = rectified().write_to(&path);
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::EncodeError));
        assert_eq!(result.stage, Stage::Warped);
        assert!(result.duration >= Duration::from_millis(5));
    }

    #[test]
    fn test_unknown_extension_is_encode_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = rectified().write_to(dir.path().join("out.unknown"));
        assert_eq!(result.error_kind, Some(ErrorKind::EncodeError));
    }

    #[test]
    fn test_failure_passes_through() {
        let err = PerspectraError::NoContourFound { min_area: 2.0 };
        let failed: ProcessingResult =
            ProcessingResult::failed(&err, Stage::Segmented, Duration::from_millis(1));
        let encoded = failed.encode_base64(ImageFormat::Png);
        assert!(!encoded.success);
        assert_eq!(encoded.error_kind, Some(ErrorKind::NoContourFound));
        assert_eq!(encoded.stage, Stage::Segmented);
    }
}
