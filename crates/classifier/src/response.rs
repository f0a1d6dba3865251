//! Prediction results and the response object returned to callers

use serde::{Deserialize, Serialize};

use crate::PredictError;

/// Prediction for a single image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Label drawn from the class label table
    pub predicted_class: String,
    /// Arg-max output index
    pub class_index: usize,
    /// Probability of the predicted class (0.0 to 1.0)
    pub confidence: f32,
    /// Probabilities for each class
    pub probabilities: Vec<f32>,
}

/// Result of a successful request
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResult {
    pub prediction: Prediction,
    /// End-to-end request latency in milliseconds
    pub latency_ms: u64,
}

/// Wire response: `{"predicted_class", "confidence"}` or `{"Error"}`.
///
/// Callers tell success from failure by the presence of the `Error` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionResponse {
    Success {
        predicted_class: String,
        confidence: f64,
    },
    Failure {
        #[serde(rename = "Error")]
        error: String,
    },
}

impl PredictionResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, PredictionResponse::Failure { .. })
    }

    /// Error message, if this is a failure
    pub fn error(&self) -> Option<&str> {
        match self {
            PredictionResponse::Failure { error } => Some(error),
            PredictionResponse::Success { .. } => None,
        }
    }
}

impl From<&Prediction> for PredictionResponse {
    fn from(prediction: &Prediction) -> Self {
        PredictionResponse::Success {
            predicted_class: prediction.predicted_class.clone(),
            confidence: f64::from(prediction.confidence),
        }
    }
}

impl From<&PredictError> for PredictionResponse {
    fn from(err: &PredictError) -> Self {
        PredictionResponse::Failure {
            error: err.to_string(),
        }
    }
}

impl From<&Result<InferenceResult, PredictError>> for PredictionResponse {
    fn from(result: &Result<InferenceResult, PredictError>) -> Self {
        match result {
            Ok(result) => PredictionResponse::from(&result.prediction),
            Err(err) => PredictionResponse::from(err),
        }
    }
}
