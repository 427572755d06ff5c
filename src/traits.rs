use crate::errors::Result;
use image::DynamicImage;
use ndarray::prelude::*;

/// Foreground probability model behind the neural segmentation strategy.
///
/// Implementations receive a normalised NCHW tensor of shape `(1, 3, input_size, input_size)` and
/// return a `(1, C, input_size, input_size)` map whose first channel scores foreground.
pub trait ForegroundModel: Send + Sync {
    /// Side length of the square input the model expects.
    fn input_size(&self) -> u32;

    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>>;
}

/// Receiver for intermediate images produced while a document is processed.
pub trait DebugSink: Send + Sync {
    fn record(&self, label: &str, image: &DynamicImage) -> Result<()>;
}
