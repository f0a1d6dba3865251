//! Classifier Error Types

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Kind of request-scoped failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Payload was empty or blank
    EmptyInput,
    /// Encoded image string was missing or not valid base64
    DecodeFailure,
    /// Image bytes could not be decoded or transformed
    PreprocessFailure,
    /// Forward pass or post-processing failed
    InferenceFailure,
}

/// Pipeline stage that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Payload,
    Decode,
    Preprocess,
    Inference,
}

impl Stage {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Payload => "payload",
            Stage::Decode => "decode",
            Stage::Preprocess => "preprocess",
            Stage::Inference => "inference",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised while serving a single prediction request.
///
/// Never escapes the request boundary: [`crate::predict`] turns it into an
/// `{"Error": ...}` response.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{stage} error: {message}")]
pub struct PredictError {
    pub kind: ErrorKind,
    pub stage: Stage,
    pub message: String,
}

impl PredictError {
    pub fn new(kind: ErrorKind, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage,
            message: message.into(),
        }
    }

    /// Blank payload
    pub fn empty_input() -> Self {
        Self::new(ErrorKind::EmptyInput, Stage::Payload, "Input data is empty")
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DecodeFailure, Stage::Decode, message)
    }

    pub fn preprocess(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PreprocessFailure, Stage::Preprocess, message)
    }

    pub fn inference(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InferenceFailure, Stage::Inference, message)
    }
}

/// Errors that abort service startup
#[derive(Debug, Error)]
pub enum StartupError {
    /// Model artifact was not staged at the expected location
    #[error("Model artifact not found at {path:?} ({listing})")]
    ArtifactMissing { path: PathBuf, listing: String },

    /// Artifact exists but could not be turned into a runnable model
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    /// Label table does not match the model output dimensionality
    #[error("Label table has {labels} entries but the model produces {outputs} outputs")]
    LabelMismatch { labels: usize, outputs: usize },

    /// Invalid classifier configuration
    #[error("Configuration error: {0}")]
    Config(String),
}
