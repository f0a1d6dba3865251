//! Inference executor: forward pass and probability distribution

use ndarray::Array4;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::DevicePolicy;
use crate::PredictError;

/// A loaded model that can score a preprocessed tensor.
///
/// Implementations take `&self` only: the model is shared read-only by every
/// concurrent request and a failed call must leave it usable.
pub trait ForwardPass: Send + Sync {
    /// Run the model on a `[1, C, H, W]` tensor and return raw per-class scores
    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, PredictError>;

    /// Output dimensionality, when the model declares a concrete one
    fn output_classes(&self) -> Option<usize> {
        None
    }
}

/// Device the forward pass executes on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionDevice {
    Cpu,
}

impl ExecutionDevice {
    /// Resolve the configured policy against the backends compiled in.
    ///
    /// tract executes on the CPU only, so `Auto` resolves to `Cpu`.
    pub fn select(policy: DevicePolicy) -> Self {
        match policy {
            DevicePolicy::Auto => {
                info!("No accelerator backend available, using CPU");
                ExecutionDevice::Cpu
            }
            DevicePolicy::Cpu => ExecutionDevice::Cpu,
        }
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionDevice::Cpu => "cpu",
        }
    }
}

/// Normalized model output for one input
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    /// Arg-max class index
    pub index: usize,
    /// Probability of the arg-max class
    pub confidence: f32,
    /// Probabilities for each class (sum to 1)
    pub probabilities: Vec<f32>,
}

/// Runs the shared model and converts its scores into a distribution
#[derive(Clone)]
pub struct InferenceExecutor {
    model: Arc<dyn ForwardPass>,
    device: ExecutionDevice,
}

impl InferenceExecutor {
    pub fn new(model: Arc<dyn ForwardPass>, device: ExecutionDevice) -> Self {
        Self { model, device }
    }

    pub fn device(&self) -> ExecutionDevice {
        self.device
    }

    /// Output dimensionality of the underlying model, if declared
    pub fn output_classes(&self) -> Option<usize> {
        self.model.output_classes()
    }

    /// Forward pass followed by softmax and arg-max
    pub fn execute(&self, input: &Array4<f32>) -> Result<Distribution, PredictError> {
        let start = Instant::now();
        let scores = self.model.forward(input)?;

        if scores.is_empty() {
            return Err(PredictError::inference("Model produced no scores"));
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(PredictError::inference("Model produced non-finite scores"));
        }

        let probabilities = softmax(&scores);
        let (index, confidence) = argmax(&probabilities)
            .ok_or_else(|| PredictError::inference("Empty probability distribution"))?;

        debug!(
            "Forward pass on {} completed in {}us",
            self.device.as_str(),
            start.elapsed().as_micros()
        );

        Ok(Distribution {
            index,
            confidence,
            probabilities,
        })
    }
}

/// Apply softmax to convert raw scores to probabilities
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    // Subtracting the max leaves the result unchanged and avoids overflow
    let max_score = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp_values: Vec<f32> = scores.iter().map(|&s| (s - max_score).exp()).collect();
    let sum: f32 = exp_values.iter().sum();
    exp_values.iter().map(|&e| e / sum).collect()
}

/// Index and value of the largest probability; the first one wins on ties
pub fn argmax(probabilities: &[f32]) -> Option<(usize, f32)> {
    probabilities
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, p)| match best {
            Some((_, best_p)) if best_p >= p => best,
            _ => Some((i, p)),
        })
}
