//! Classifier configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::StartupError;

/// Dish categories, in model output order
pub const DEFAULT_LABELS: [&str; 6] = [
    "Biryani",
    "Milk Tea",
    "Chapati",
    "Chicken tikka",
    "Paratha",
    "Samosa",
];

/// Per-channel mean of the training set (RGB)
pub const DEFAULT_MEAN: [f32; 3] = [0.5773, 0.4623, 0.3385];

/// Per-channel standard deviation of the training set (RGB)
pub const DEFAULT_STD: [f32; 3] = [0.2559, 0.2411, 0.2455];

/// 256 x 16384: aspect ratios up to 64:1 at the default resize
pub const DEFAULT_MAX_RESIZED_PIXELS: u64 = 4_194_304;

/// Execution device preference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePolicy {
    /// Use an accelerator when one is available, otherwise the CPU
    #[default]
    Auto,
    /// Always run on the CPU
    Cpu,
}

/// Model artifact configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory the artifact is staged into
    pub model_dir: PathBuf,
    /// Artifact file name inside `model_dir`
    pub artifact_file: String,
    /// Class labels, index `i` maps to output unit `i`
    pub labels: Vec<String>,
    pub device: DevicePolicy,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            artifact_file: "model.onnx".to_string(),
            labels: DEFAULT_LABELS.iter().map(|l| l.to_string()).collect(),
            device: DevicePolicy::Auto,
        }
    }
}

impl ModelConfig {
    /// Full path of the model artifact
    pub fn artifact_path(&self) -> PathBuf {
        self.model_dir.join(&self.artifact_file)
    }
}

/// Preprocessing constants fixed at training time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Target length of the shorter image edge after resizing
    pub resize_shorter: u32,
    /// Side of the square center crop fed to the model
    pub crop_size: u32,
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
    /// Largest intermediate image (pixels) the resize step may produce
    pub max_resized_pixels: u64,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            resize_shorter: 256,
            crop_size: 224,
            mean: DEFAULT_MEAN.to_vec(),
            std: DEFAULT_STD.to_vec(),
            max_resized_pixels: DEFAULT_MAX_RESIZED_PIXELS,
        }
    }
}

impl PreprocessConfig {
    /// Check that the transform chain can always produce a full crop
    pub fn validate(&self) -> Result<(), StartupError> {
        if self.crop_size == 0 {
            return Err(StartupError::Config("crop_size must be positive".into()));
        }
        if self.crop_size > self.resize_shorter {
            return Err(StartupError::Config(format!(
                "crop_size {} exceeds resize_shorter {}",
                self.crop_size, self.resize_shorter
            )));
        }
        if self.mean.len() != 3 || self.std.len() != 3 {
            return Err(StartupError::Config(format!(
                "mean and std need 3 channels, got {} and {}",
                self.mean.len(),
                self.std.len()
            )));
        }
        if self.std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(StartupError::Config("std values must be positive".into()));
        }
        if self.max_resized_pixels < u64::from(self.resize_shorter).pow(2) {
            return Err(StartupError::Config(format!(
                "max_resized_pixels {} cannot hold a {}x{} image",
                self.max_resized_pixels, self.resize_shorter, self.resize_shorter
            )));
        }
        Ok(())
    }
}

/// Inference execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Per-request deadline (milliseconds)
    pub timeout_ms: u64,
    /// Requests allowed to preprocess or run the model at the same time
    pub max_concurrency: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

impl InferenceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), StartupError> {
        if self.max_concurrency == 0 {
            return Err(StartupError::Config("max_concurrency must be positive".into()));
        }
        Ok(())
    }
}

/// Complete classifier configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub model: ModelConfig,
    pub preprocess: PreprocessConfig,
    pub inference: InferenceConfig,
}
