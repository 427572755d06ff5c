//! Background removal and perspective correction for photographed documents.
//!
//! A [`DocumentProcessor`] takes a photo of a rectangular object (document, card, print),
//! separates it from the background, finds its four corners and rectifies it into an upright,
//! optionally padded image:
//!
//! ```no_run
//! use perspectra_rs::{Config, DocumentProcessor};
//!
//! let processor = DocumentProcessor::new(Config::default())?;
//! let result = processor.process_path("receipt.jpg").write_to("receipt-flat.png");
//! if !result.success {
//!     eprintln!("{}", result.error_message);
//! }
//! # Ok::<(), perspectra_rs::PerspectraError>(())
//! ```

pub mod blend;
pub mod config;
pub mod corners;
pub mod debug;
pub mod encode;
pub mod errors;
pub mod geometry;
pub mod logging;
pub mod model;
pub mod processor;
pub mod response;
pub mod segmentation;
pub mod traits;
pub mod types;
pub mod warp;

pub mod mocks;

pub use config::{Config, SegmentationMethod};
pub use corners::{detect_corners, extract_corners, CornerDetection, CornerParams};
pub use debug::DirectorySink;
pub use errors::{ErrorKind, PerspectraError, Result};
pub use model::OnnxModel;
pub use processor::DocumentProcessor;
pub use response::ProcessingResponse;
pub use segmentation::Segmenter;
pub use traits::*;
pub use types::{Mask, ProcessingResult, Quadrilateral, Stage};
pub use warp::{warp, WarpGeometry};
