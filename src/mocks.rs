use crate::errors::Result;
use crate::traits::{DebugSink, ForegroundModel};
use image::DynamicImage;
use ndarray::prelude::*;
use parking_lot::Mutex;

/// Foreground model for tests: scores a pixel as foreground when its normalised intensity is
/// above the mean of the ImageNet-normalised channels, so bright regions on a dark canvas
/// come out as foreground.
#[derive(Debug, Clone)]
pub struct MockForegroundModel {
    pub input_size: u32,
}

impl MockForegroundModel {
    pub const fn new(input_size: u32) -> Self {
        Self { input_size }
    }
}

impl ForegroundModel for MockForegroundModel {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let shape = tensor.shape();
        let brightness = tensor.mean_axis(Axis(1)).ok_or_else(|| {
            crate::errors::PerspectraError::configuration("empty channel axis")
        })?;
        let mut out = Array4::<f32>::zeros((shape[0], 1, shape[2], shape[3]));
        out.index_axis_mut(Axis(1), 0)
            .zip_mut_with(&brightness, |o, &b| *o = if b > 0.0 { 1.0 } else { 0.0 });
        Ok(out)
    }
}

/// Debug sink that keeps every recorded label in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    labels: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn labels(&self) -> Vec<String> {
        self.labels.lock().clone()
    }
}

impl DebugSink for RecordingSink {
    fn record(&self, label: &str, _image: &DynamicImage) -> Result<()> {
        self.labels.lock().push(label.to_string());
        Ok(())
    }
}

/// Debug sink that sleeps on every record, for timing assertions.
#[derive(Debug)]
pub struct SlowSink(pub std::time::Duration);

impl DebugSink for SlowSink {
    fn record(&self, _label: &str, _image: &DynamicImage) -> Result<()> {
        std::thread::sleep(self.0);
        Ok(())
    }
}

/// Debug sink whose every record fails.
#[derive(Debug, Default)]
pub struct FailingSink;

impl DebugSink for FailingSink {
    fn record(&self, label: &str, _image: &DynamicImage) -> Result<()> {
        Err(crate::errors::PerspectraError::encode(
            format!("recording {label}"),
            std::io::Error::other("sink unavailable"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_model_predict_shape() -> Result<()> {
        let mock = MockForegroundModel::new(32);
        let input_tensor = Array4::<f32>::zeros((1, 3, 32, 32));

        let result = mock.predict(input_tensor.view())?;
        assert_eq!(result.shape(), &[1, 1, 32, 32]);
        Ok(())
    }

    #[test]
    fn test_mock_model_marks_bright_pixels() -> Result<()> {
        let mock = MockForegroundModel::new(4);
        let mut input = Array4::<f32>::from_elem((1, 3, 4, 4), -2.0);
        input.slice_mut(s![.., .., 1..3, 1..3]).fill(2.0);

        let result = mock.predict(input.view())?;
        assert_eq!(result[[0, 0, 1, 1]], 1.0);
        assert_eq!(result[[0, 0, 0, 0]], 0.0);
        Ok(())
    }

    #[test]
    fn test_recording_sink_keeps_order() -> Result<()> {
        let sink = RecordingSink::default();
        let image = DynamicImage::new_rgb8(1, 1);
        sink.record("mask", &image)?;
        sink.record("warped", &image)?;
        assert_eq!(sink.labels(), vec!["mask", "warped"]);
        Ok(())
    }
}
