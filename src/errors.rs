use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Structured error types for the document correction pipeline.
///
/// # Why structured errors
///
/// Each variant captures context specific to the stage that failed (decoding, segmentation,
/// corner extraction, warping, encoding), so callers can inspect the failure without parsing
/// strings. [`PerspectraError::kind`] collapses the variants onto the coarse [`ErrorKind`]
/// taxonomy that callers use to decide whether an input is worth retrying.
#[derive(Error, Debug)]
pub enum PerspectraError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Decode error: could not decode image ({origin})")]
    Decode {
        origin: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Decode error: could not read {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Resource unavailable: {resource:?} {reason}")]
    ResourceUnavailable { resource: PathBuf, reason: String },

    #[error("Model error: {operation} failed")]
    Inference {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("No contour found: mask has no foreground region of at least {min_area:.1} px²")]
    NoContourFound { min_area: f64 },

    #[error("Degenerate shape: {reason}")]
    DegenerateShape { reason: String },

    #[error("Invalid geometry: destination rectangle is {width}x{height}")]
    InvalidGeometry { width: u32, height: u32 },

    #[error("Encode error: {operation} failed")]
    Encode {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Coarse failure taxonomy exposed on every [`crate::ProcessingResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    DecodeError,
    ResourceUnavailable,
    NoContourFound,
    DegenerateShape,
    InvalidGeometry,
    EncodeError,
}

impl PerspectraError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Decode { .. } | Self::Read { .. } => ErrorKind::DecodeError,
            Self::ResourceUnavailable { .. } | Self::Inference { .. } => {
                ErrorKind::ResourceUnavailable
            }
            Self::NoContourFound { .. } => ErrorKind::NoContourFound,
            Self::DegenerateShape { .. } => ErrorKind::DegenerateShape,
            Self::InvalidGeometry { .. } => ErrorKind::InvalidGeometry,
            Self::Encode { .. } => ErrorKind::EncodeError,
        }
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn degenerate(reason: impl Into<String>) -> Self {
        Self::DegenerateShape {
            reason: reason.into(),
        }
    }

    pub(crate) fn encode(
        operation: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Encode {
            operation: operation.into(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, PerspectraError>;

/// Convert image crate errors to decode errors.
///
/// # Why decode category
///
/// The only place the pipeline lets an `ImageError` escape without extra context is while
/// turning caller-supplied bytes into pixels. Encoders wrap their errors explicitly through
/// [`PerspectraError::encode`] so they keep their own kind.
impl From<image::ImageError> for PerspectraError {
    fn from(err: image::ImageError) -> Self {
        Self::Decode {
            origin: "memory".to_string(),
            source: err,
        }
    }
}

/// Convert ONNX Runtime errors to inference errors.
impl From<ort::Error> for PerspectraError {
    fn from(err: ort::Error) -> Self {
        Self::Inference {
            operation: "ort operation".to_string(),
            source: Box::new(err),
        }
    }
}

/// Convert ndarray shape errors to inference errors.
///
/// Shape errors occur while reshaping model outputs, so they share the inference category
/// instead of growing a separate tensor error type.
impl From<ndarray::ShapeError> for PerspectraError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Inference {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}
