//! Food Image Classifier
//!
//! Serving core for the NutriScan dish classifier using tract-onnx:
//! - Payload normalization (bare base64, nested JSON, raw bytes)
//! - Deterministic preprocessing (resize, center crop, per-channel normalization)
//! - Forward pass and softmax confidence
//! - Per-request error isolation with structured error records

pub mod config;
mod error;
mod executor;
mod labels;
mod lifecycle;
mod onnx;
mod payload;
mod preprocess;
mod response;
mod service;

pub use config::{ClassifierConfig, DevicePolicy, InferenceConfig, ModelConfig, PreprocessConfig};
pub use error::{ErrorKind, PredictError, Stage, StartupError};
pub use executor::{argmax, softmax, Distribution, ExecutionDevice, ForwardPass, InferenceExecutor};
pub use labels::ClassLabelTable;
pub use lifecycle::{Lifecycle, ServiceContext};
pub use onnx::OnnxModel;
pub use payload::{normalize, EncodedImage, RequestPayload};
pub use preprocess::Preprocessor;
pub use response::{InferenceResult, Prediction, PredictionResponse};
pub use service::{predict, try_predict};
