use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{imageops, imageops::FilterType, ImageBuffer, Luma, RgbImage};
use ndarray::prelude::*;
use nshare::AsNdarray3;
use tracing::debug;

use crate::config::Config;
use crate::errors::{PerspectraError, Result};
use crate::model::{self, SessionOptions};
use crate::traits::ForegroundModel;
use crate::types::Mask;

const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Normalised foreground probability above which a pixel belongs to the mask.
pub const MASK_THRESHOLD: f32 = 0.5;

/// Salient-object segmentation through a [`ForegroundModel`].
///
/// Without an injected model the process-wide ONNX handle for `model_path` is used, loaded the
/// first time a segmentation needs it.
#[derive(Clone)]
pub struct NeuralSegmenter {
    model_path: PathBuf,
    options: SessionOptions,
    model: Option<Arc<dyn ForegroundModel>>,
}

impl NeuralSegmenter {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model_path: config.model_path.clone(),
            options: SessionOptions {
                intra_threads: config.intra_threads,
                device_id: config.device_id,
            },
            model: None,
        }
    }

    pub fn with_model(model: Arc<dyn ForegroundModel>) -> Self {
        Self {
            model_path: PathBuf::new(),
            options: SessionOptions::default(),
            model: Some(model),
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    fn model(&self) -> Result<Arc<dyn ForegroundModel>> {
        match &self.model {
            Some(model) => Ok(Arc::clone(model)),
            None => {
                let model: Arc<dyn ForegroundModel> =
                    model::resident(&self.model_path, self.options)?;
                Ok(model)
            }
        }
    }

    pub fn segment(&self, image: &RgbImage) -> Result<Mask> {
        let model = self.model()?;
        let size = model.input_size();
        let tensor = preprocess(image, size);
        let prediction = model.predict(tensor.view())?;
        debug!(input_size = size, output_shape = ?prediction.shape(), "Model inference completed");
        let (width, height) = image.dimensions();
        postprocess(prediction.view(), width, height)
    }
}

/// Resize to the model's square input and normalise with ImageNet statistics into a
/// `(1, 3, size, size)` tensor.
pub fn preprocess(image: &RgbImage, size: u32) -> Array4<f32> {
    let resized = imageops::resize(image, size, size, FilterType::Lanczos3);
    let mut tensor = resized
        .as_ndarray3()
        .mapv(|v| v as f32 / 255.0)
        .insert_axis(Axis(0));
    for (channel, (mean, std)) in MEAN.iter().zip(STD.iter()).enumerate() {
        tensor
            .slice_mut(s![0, channel, .., ..])
            .mapv_inplace(|v| (v - mean) / std);
    }
    tensor
}

/// Min-max normalise the first output channel, resize it back to `width`×`height` and cut it
/// at [`MASK_THRESHOLD`].
pub fn postprocess(prediction: ArrayView4<f32>, width: u32, height: u32) -> Result<Mask> {
    let (batch, channels, rows, cols) = prediction.dim();
    if batch == 0 || channels == 0 || rows == 0 || cols == 0 {
        return Err(shape_error(prediction.shape()));
    }

    let saliency = prediction.slice(s![0, 0, .., ..]);
    let (min, max) = saliency
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if !range.is_finite() || range <= f32::EPSILON {
        return Ok(Mask::empty(width, height));
    }

    let normalised: Vec<f32> = saliency.iter().map(|&v| (v - min) / range).collect();
    let probabilities: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(cols as u32, rows as u32, normalised)
            .ok_or_else(|| shape_error(prediction.shape()))?;
    let probabilities = imageops::resize(&probabilities, width, height, FilterType::Lanczos3);

    Ok(Mask::from_fn(width, height, |x, y| {
        probabilities.get_pixel(x, y)[0] > MASK_THRESHOLD
    }))
}

fn shape_error(shape: &[usize]) -> PerspectraError {
    PerspectraError::Inference {
        operation: "saliency map extraction".to_string(),
        source: format!("unexpected model output shape {shape:?}").into(),
    }
}
