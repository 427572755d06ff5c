use std::path::PathBuf;

use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::errors::{PerspectraError, Result};

pub const DEFAULT_PADDING_RATIO: f64 = 0.05;
pub const DEFAULT_MODEL_PATH: &str = "models/u2net.onnx";
pub const DEFAULT_DEBUG_OUTPUT_PATH: &str = "debug_output";

/// Foreground/background separation algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentationMethod {
    /// Global Otsu cut plus morphological cleanup. Fastest.
    #[default]
    Threshold,
    /// Marker-based watershed flooding over the gradient magnitude.
    Watershed,
    /// Iterative colour-model refinement from an inset rectangle.
    Grabcut,
    /// Pretrained U²-Net style ONNX model.
    Neural,
}

/// Processor settings. Built once and never mutated while a processor is alive.
///
/// The binary flattens this into its command line; services deserialize it from whatever
/// configuration source they own.
#[derive(Args, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Margin added on each side of the rectified output, as a fraction of its size
    #[arg(long, default_value_t = DEFAULT_PADDING_RATIO)]
    pub padding_ratio: f64,

    #[arg(short = 's', long, value_enum, default_value_t = SegmentationMethod::Threshold)]
    pub segmentation_method: SegmentationMethod,

    /// ONNX model used by the neural segmentation method
    #[arg(short, long, default_value = DEFAULT_MODEL_PATH)]
    pub model_path: PathBuf,

    /// Warp the original image (true) or the background-removed cutout (false)
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub mask_only: bool,

    #[arg(long)]
    pub save_contours: bool,

    #[arg(long)]
    pub save_transformed: bool,

    #[arg(long, default_value = DEFAULT_DEBUG_OUTPUT_PATH)]
    pub debug_output_path: PathBuf,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub enable_logging: bool,

    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// ONNX Runtime intra-op threads
    #[arg(long, default_value_t = 4)]
    pub intra_threads: usize,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            padding_ratio: DEFAULT_PADDING_RATIO,
            segmentation_method: SegmentationMethod::default(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            mask_only: true,
            save_contours: false,
            save_transformed: false,
            debug_output_path: PathBuf::from(DEFAULT_DEBUG_OUTPUT_PATH),
            enable_logging: true,
            log_level: "info".to_string(),
            intra_threads: 4,
            device_id: 0,
        }
    }
}

impl Config {
    pub fn with_method(mut self, method: SegmentationMethod) -> Self {
        self.segmentation_method = method;
        self
    }

    pub fn with_padding_ratio(mut self, padding_ratio: f64) -> Self {
        self.padding_ratio = padding_ratio;
        self
    }

    pub fn debug_enabled(&self) -> bool {
        self.save_contours || self.save_transformed
    }

    pub fn validate(&self) -> Result<()> {
        if !self.padding_ratio.is_finite() || self.padding_ratio < 0.0 {
            return Err(PerspectraError::configuration(format!(
                "padding_ratio must be a finite value >= 0, got {}",
                self.padding_ratio
            )));
        }
        if self.intra_threads == 0 {
            return Err(PerspectraError::configuration(
                "intra_threads must be at least 1",
            ));
        }
        EnvFilter::try_new(&self.log_level).map_err(|e| {
            PerspectraError::configuration(format!("invalid log_level {:?}: {e}", self.log_level))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.padding_ratio, 0.05);
        assert_eq!(config.segmentation_method, SegmentationMethod::Threshold);
        assert!(config.mask_only);
        assert!(!config.debug_enabled());
    }

    #[test]
    fn test_negative_padding_rejected() {
        let config = Config::default().with_padding_ratio(-0.1);
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);

        let config = Config::default().with_padding_ratio(f64::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: Config =
            serde_json::from_str(r#"{"segmentation_method":"watershed","padding_ratio":0.1}"#)
                .unwrap();
        assert_eq!(config.segmentation_method, SegmentationMethod::Watershed);
        assert_eq!(config.padding_ratio, 0.1);
        assert_eq!(config.model_path, PathBuf::from(DEFAULT_MODEL_PATH));
    }
}
