//! Service configuration
//!
//! Layered: `config/default.*` (optional), then the file named by
//! `NUTRISCAN_CONFIG`, then `NUTRISCAN__SECTION__KEY` environment variables.

use classifier::{ClassifierConfig, InferenceConfig, ModelConfig, PreprocessConfig};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::rate_limit::RateLimitConfig;
use crate::ApiError;

/// Names an extra configuration file layered over the defaults
pub const CONFIG_FILE_VAR: &str = "NUTRISCAN_CONFIG";

const ENV_PREFIX: &str = "NUTRISCAN";

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub addr: String,
    /// Largest accepted request body (bytes)
    pub max_body_bytes: usize,
    pub rate_limit: RateLimitConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            max_body_bytes: 16 * 1024 * 1024,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Nutrition lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NutritionConfig {
    /// JSON array of nutrition records; empty store when unset
    pub records_path: Option<PathBuf>,
    /// Maximum records per search
    pub max_results: usize,
}

impl Default for NutritionConfig {
    fn default() -> Self {
        Self {
            records_path: None,
            max_results: nutrition_store::DEFAULT_MAX_RESULTS,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Max level: trace, debug, info, warn, error
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub preprocess: PreprocessConfig,
    pub inference: InferenceConfig,
    pub nutrition: NutritionConfig,
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Load from files and environment
    pub fn load() -> Result<Self, ApiError> {
        let file = std::env::var(CONFIG_FILE_VAR).ok();
        Self::from_sources(file.as_deref(), None)
    }

    /// Layer the optional default file, `file`, then `NUTRISCAN__*` variables.
    ///
    /// `env` replaces the process environment when given.
    fn from_sources(
        file: Option<&str>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ApiError> {
        let mut builder =
            Config::builder().add_source(File::with_name("config/default").required(false));

        if let Some(path) = file {
            builder = builder.add_source(File::with_name(path));
        }

        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .source(env),
            )
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| ApiError::Config(e.to_string()))
    }

    /// Classifier part of the configuration
    pub fn classifier(&self) -> ClassifierConfig {
        ClassifierConfig {
            model: self.model.clone(),
            preprocess: self.preprocess.clone(),
            inference: self.inference.clone(),
        }
    }
}
