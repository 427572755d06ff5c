use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use image::{DynamicImage, ImageFormat};
use tracing::{debug, error, info, instrument, warn};

use crate::blend::apply_mask;
use crate::config::Config;
use crate::corners::{detect_corners, CornerParams};
use crate::debug::{
    contour_overlay, corners_overlay, DirectorySink, LABEL_CONTOURS, LABEL_CORNERS, LABEL_MASK,
    LABEL_WARPED,
};
use crate::errors::{PerspectraError, Result};
use crate::segmentation::Segmenter;
use crate::traits::DebugSink;
use crate::types::{ProcessingResult, Stage};
use crate::warp::warp;

/// Runs decode, segmentation, corner extraction and rectification as one call.
///
/// A processor is immutable after construction and can be shared between threads; every
/// invocation is independent apart from the process-wide segmentation model.
#[derive(Clone)]
pub struct DocumentProcessor {
    config: Config,
    segmenter: Segmenter,
    corner_params: CornerParams,
    debug_sink: Option<Arc<dyn DebugSink>>,
}

impl std::fmt::Debug for DocumentProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentProcessor")
            .field("config", &self.config)
            .field("segmenter", &self.segmenter)
            .field("corner_params", &self.corner_params)
            .field("debug_sink", &self.debug_sink.is_some())
            .finish()
    }
}

impl DocumentProcessor {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let debug_sink = config.debug_enabled().then(|| {
            Arc::new(DirectorySink::new(config.debug_output_path.clone())) as Arc<dyn DebugSink>
        });
        Ok(Self {
            segmenter: Segmenter::from_config(&config),
            corner_params: CornerParams::default(),
            debug_sink,
            config,
        })
    }

    pub fn with_segmenter(mut self, segmenter: Segmenter) -> Self {
        self.segmenter = segmenter;
        self
    }

    pub fn with_corner_params(mut self, corner_params: CornerParams) -> Self {
        self.corner_params = corner_params;
        self
    }

    /// Replace the artifact sink. Artifacts are still only produced for the stages whose debug
    /// toggle is on.
    pub fn with_debug_sink(mut self, sink: Arc<dyn DebugSink>) -> Self {
        self.debug_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn segmenter(&self) -> &Segmenter {
        &self.segmenter
    }

    /// Process encoded image bytes (JPEG, PNG, ...).
    pub fn process_bytes(&self, bytes: &[u8]) -> ProcessingResult {
        self.run(Instant::now(), || {
            image::load_from_memory(bytes).map_err(|source| PerspectraError::Decode {
                origin: format!("{} bytes in memory", bytes.len()),
                source,
            })
        })
    }

    pub fn process_path(&self, path: impl AsRef<Path>) -> ProcessingResult {
        let path = path.as_ref();
        self.run(Instant::now(), || {
            let bytes = std::fs::read(path).map_err(|source| PerspectraError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            image::load_from_memory(&bytes).map_err(|source| PerspectraError::Decode {
                origin: path.display().to_string(),
                source,
            })
        })
    }

    pub fn process_image(&self, image: DynamicImage) -> ProcessingResult {
        self.run(Instant::now(), || Ok(image))
    }

    /// [`Self::process_bytes`] followed by a base64 re-encoding of the result.
    pub fn process_bytes_to_base64(&self, bytes: &[u8], format: ImageFormat) -> ProcessingResult<String> {
        self.process_bytes(bytes).encode_base64(format)
    }

    /// [`Self::process_path`] followed by writing the result to `output`.
    pub fn process_path_to_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> ProcessingResult<std::path::PathBuf> {
        self.process_path(input).write_to(output)
    }

    fn run(&self, started: Instant, decode: impl FnOnce() -> Result<DynamicImage>) -> ProcessingResult {
        let mut stage = Stage::Start;
        let outcome = self.pipeline(&mut stage, decode);
        let duration = started.elapsed();
        match outcome {
            Ok(image) => {
                info!(
                    width = image.width(),
                    height = image.height(),
                    duration_secs = duration.as_secs_f64(),
                    "Document processed"
                );
                ProcessingResult::succeeded(image, stage, duration)
            }
            Err(err) => {
                error!(
                    error = %err,
                    ?stage,
                    duration_secs = duration.as_secs_f64(),
                    "Document processing failed"
                );
                ProcessingResult::failed(&err, stage, duration)
            }
        }
    }

    #[instrument(skip_all, fields(method = self.segmenter.name()))]
    fn pipeline(
        &self,
        stage: &mut Stage,
        decode: impl FnOnce() -> Result<DynamicImage>,
    ) -> Result<DynamicImage> {
        let image = decode()?;
        *stage = Stage::Decoded;
        debug!(width = image.width(), height = image.height(), "Image decoded");

        let rgb = image.to_rgb8();
        let mask = self.segmenter.segment(&rgb)?;
        *stage = Stage::Segmented;
        if self.config.save_contours {
            self.emit(LABEL_MASK, || DynamicImage::ImageLuma8(mask.as_image().clone()));
        }

        let detection = detect_corners(&mask, &self.corner_params)?;
        let quad = if mask.dimensions() == rgb.dimensions() {
            detection.quad
        } else {
            detection.quad.scaled(
                rgb.width() as f32 / mask.width() as f32,
                rgb.height() as f32 / mask.height() as f32,
            )
        };
        *stage = Stage::CornersFound;
        if self.config.save_contours {
            self.emit(LABEL_CONTOURS, || {
                DynamicImage::ImageRgb8(contour_overlay(&mask, &detection.contour, &detection.quad))
            });
        }
        if self.config.save_transformed {
            self.emit(LABEL_CORNERS, || DynamicImage::ImageRgb8(corners_overlay(&rgb, &quad)));
        }

        let source = if self.config.mask_only {
            DynamicImage::ImageRgb8(rgb)
        } else {
            DynamicImage::ImageRgba8(apply_mask(&rgb, &mask))
        };
        let warped = warp(&source, &quad, self.config.padding_ratio)?;
        *stage = Stage::Warped;
        if self.config.save_transformed {
            self.emit(LABEL_WARPED, || warped.clone());
        }

        *stage = Stage::Encoded;
        Ok(warped)
    }

    fn emit(&self, label: &str, render: impl FnOnce() -> DynamicImage) {
        let Some(sink) = &self.debug_sink else {
            return;
        };
        if let Err(err) = sink.record(label, &render()) {
            warn!(label, error = %err, "Failed to record debug artifact");
        }
    }
}
