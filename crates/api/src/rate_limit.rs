//! Rate Limiting Middleware using GCRA Algorithm
//!
//! Per-IP rate limiting for the scoring endpoint using tower_governor.
//! Uses the Generic Cell Rate Algorithm (GCRA) for efficient,
//! accurate rate enforcement without background processes.

use governor::middleware::StateInformationMiddleware;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::GovernorLayer;

use crate::ApiError;

/// Governor config with X-RateLimit-* headers enabled
pub type DefaultGovernorConfig =
    tower_governor::governor::GovernorConfig<PeerIpKeyExtractor, StateInformationMiddleware>;

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Apply the limiter to `/score`
    pub enabled: bool,
    /// Seconds per replenished request
    pub per_second: u64,
    /// Burst size (max requests that can be made immediately)
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_second: 1,
            burst_size: 20,
        }
    }
}

impl RateLimitConfig {
    /// Limiter switched off (tests, trusted networks)
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}

/// Create a rate limiting governor config.
///
/// Uses PeerIpKeyExtractor, so the service must be served with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_governor_config(config: &RateLimitConfig) -> Result<Arc<DefaultGovernorConfig>, ApiError> {
    GovernorConfigBuilder::default()
        .per_second(config.per_second)
        .burst_size(config.burst_size)
        .use_headers()
        .finish()
        .map(Arc::new)
        .ok_or_else(|| {
            ApiError::Config(format!(
                "invalid rate limit: per_second={} burst_size={}",
                config.per_second, config.burst_size
            ))
        })
}

/// Layer for the scoring route, if enabled
pub fn governor_layer(
    config: &RateLimitConfig,
) -> Result<Option<GovernorLayer<PeerIpKeyExtractor, StateInformationMiddleware>>, ApiError> {
    if !config.enabled {
        return Ok(None);
    }
    Ok(Some(GovernorLayer {
        config: create_governor_config(config)?,
    }))
}
