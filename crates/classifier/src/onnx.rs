//! ONNX model backend using tract

use ndarray::Array4;
use std::path::Path;
use tract_onnx::prelude::*;
use tracing::info;

use crate::{ForwardPass, PredictError, StartupError};

/// Optimized, runnable ONNX classifier
pub struct OnnxModel {
    plan: TypedRunnableModel<TypedModel>,
    output_classes: Option<usize>,
}

impl OnnxModel {
    /// Load and optimize the model with its input pinned to `input_shape`
    pub fn load(path: &Path, input_shape: [usize; 4]) -> Result<Self, StartupError> {
        info!("Loading ONNX model from {}", path.display());

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.with_input_fact(0, f32::fact(input_shape).into()))
            .and_then(|model| model.into_optimized())
            .map_err(|e| StartupError::ModelLoad(format!("{}: {}", path.display(), e)))?;

        let output_classes = model
            .output_fact(0)
            .ok()
            .and_then(|fact| fact.shape.as_concrete().and_then(|dims| dims.last().copied()));

        let plan = model
            .into_runnable()
            .map_err(|e| StartupError::ModelLoad(format!("Model not runnable: {}", e)))?;

        info!(
            "Model loaded: input {:?}, outputs {}",
            input_shape,
            output_classes.map_or_else(|| "dynamic".to_string(), |n| n.to_string())
        );

        Ok(Self {
            plan,
            output_classes,
        })
    }
}

impl ForwardPass for OnnxModel {
    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, PredictError> {
        let data = input
            .as_slice()
            .ok_or_else(|| PredictError::inference("Input tensor is not contiguous"))?;
        let tensor = Tensor::from_shape(input.shape(), data)
            .map_err(|e| PredictError::inference(format!("Failed to create tensor: {}", e)))?;

        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| PredictError::inference(format!("Inference failed: {}", e)))?;

        let scores = outputs
            .first()
            .ok_or_else(|| PredictError::inference("Model returned no outputs"))?
            .to_array_view::<f32>()
            .map_err(|e| PredictError::inference(format!("Unexpected output type: {}", e)))?;

        Ok(scores.iter().copied().collect())
    }

    fn output_classes(&self) -> Option<usize> {
        self.output_classes
    }
}
