use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use ndarray::prelude::*;
use ort::execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;
use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use crate::errors::{PerspectraError, Result};
use crate::traits::ForegroundModel;

/// Input side used when the model declares a dynamic spatial shape.
pub const DEFAULT_INPUT_SIZE: u32 = 320;

/// Execution settings applied when a model is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub intra_threads: usize,
    pub device_id: i32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            intra_threads: 4,
            device_id: 0,
        }
    }
}

/// U²-Net style salient object model running on ONNX Runtime.
pub struct OnnxModel {
    path: PathBuf,
    input_size: u32,
    input_name: String,
    output_name: String,
    session: Mutex<Session>,
}

impl std::fmt::Debug for OnnxModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxModel")
            .field("path", &self.path)
            .field("input_size", &self.input_size)
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .finish_non_exhaustive()
    }
}

fn inference<E>(operation: impl Into<String>) -> impl FnOnce(E) -> PerspectraError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let operation = operation.into();
    move |e| PerspectraError::Inference {
        operation,
        source: Box::new(e),
    }
}

impl OnnxModel {
    #[instrument(skip_all, fields(path = %model_path.display()))]
    pub fn load(model_path: &Path, options: SessionOptions) -> Result<Self> {
        if !model_path.is_file() {
            return Err(PerspectraError::ResourceUnavailable {
                resource: model_path.to_path_buf(),
                reason: "model file not found".to_string(),
            });
        }

        let mut session = Session::builder()
            .map_err(inference("session builder initialisation"))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(inference("graph optimisation setup"))?
            .with_intra_threads(options.intra_threads)
            .map_err(inference("intra-op thread setup"))?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(options.device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(options.device_id)
                    .build(),
            ])
            .map_err(inference("execution provider setup"))?
            .commit_from_file(model_path)
            .map_err(|e| PerspectraError::ResourceUnavailable {
                resource: model_path.to_path_buf(),
                reason: format!("model could not be loaded: {e}"),
            })?;

        let input = session.inputs.first().ok_or_else(|| missing(model_path, "input"))?;
        let input_name = input.name.clone();
        let input_size = input
            .input_type
            .tensor_shape()
            .and_then(|shape| shape.get(2).copied())
            .filter(|&side| side > 0)
            .map_or(DEFAULT_INPUT_SIZE, |side| side as u32);
        let output_name = session
            .outputs
            .first()
            .ok_or_else(|| missing(model_path, "output"))?
            .name
            .clone();

        // warm up
        let data = Array4::<f32>::zeros((1, 3, input_size as usize, input_size as usize));
        session
            .run(ort::inputs![input_name.as_str() => TensorRef::from_array_view(&data)?])
            .map_err(inference("model warm-up"))?;

        info!(input_size, %input_name, %output_name, "Segmentation model loaded");
        Ok(Self {
            path: model_path.to_path_buf(),
            input_size,
            input_name,
            output_name,
            session: Mutex::new(session),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn missing(model_path: &Path, what: &str) -> PerspectraError {
    PerspectraError::ResourceUnavailable {
        resource: model_path.to_path_buf(),
        reason: format!("model declares no {what} tensor"),
    }
}

impl ForegroundModel for OnnxModel {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let mut binding = self.session.lock();
        let outputs = binding.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(&tensor.as_standard_layout())?
        ])?;
        Ok(outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?
            .to_owned())
    }
}

static RESIDENT: OnceLock<Arc<OnnxModel>> = OnceLock::new();
static LOADING: Mutex<()> = parking_lot::const_mutex(());

/// Process-wide model handle, loaded on first use.
///
/// Concurrent first calls are serialised so the model is loaded at most once. A failed load
/// leaves nothing cached and the next call tries again. Only one model may be resident: asking
/// for a different path afterwards is refused.
pub fn resident(model_path: &Path, options: SessionOptions) -> Result<Arc<OnnxModel>> {
    if let Some(model) = RESIDENT.get() {
        return same_model(model, model_path);
    }

    let _guard = LOADING.lock();
    if let Some(model) = RESIDENT.get() {
        return same_model(model, model_path);
    }
    debug!(path = %model_path.display(), "Loading resident segmentation model");
    let model = Arc::new(OnnxModel::load(model_path, options)?);
    Ok(Arc::clone(RESIDENT.get_or_init(|| model)))
}

fn same_model(model: &Arc<OnnxModel>, requested: &Path) -> Result<Arc<OnnxModel>> {
    if model.path() == requested {
        Ok(Arc::clone(model))
    } else {
        Err(PerspectraError::ResourceUnavailable {
            resource: requested.to_path_buf(),
            reason: format!(
                "a different segmentation model is already resident ({})",
                model.path().display()
            ),
        })
    }
}
