//! Configuration for the mc resilience layer
//!
//! This module contains the configuration types and loading functionality.

use serde::{Deserialize, Serialize};
use std::env;
use tracing::{info, warn};

use crate::error::ResilienceResult;
use crate::resilience::circuit_breaker::CircuitBreakerConfig;
use crate::resilience::rate_limiter::RateLimitConfig;

/// Top-level resilience configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// URL of the rate limit state store
    ///
    /// `file://` uses the default per-user state file, `file://<path>` an
    /// explicit file, `memory://` an in-process store.
    #[serde(default = "default_state_url")]
    pub state_url: String,

    /// Rate limiter configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Default circuit breaker configuration for the registry
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_state_url() -> String {
    "file://".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ResilienceConfig {
    /// Load configuration from environment variables
    pub fn load() -> ResilienceResult<Self> {
        // Start with defaults
        let mut config = Self::default();

        // Override from environment variables
        if let Ok(state_url) = env::var("MC_STATE_URL") {
            config.state_url = state_url;
        }

        if let Ok(max_calls) = env::var("MC_RATE_LIMIT_MAX_CALLS") {
            if let Ok(max_calls) = max_calls.parse::<u32>() {
                config.rate_limit.default_policy.max_calls = max_calls;
            } else {
                warn!("Invalid MC_RATE_LIMIT_MAX_CALLS value: {}", max_calls);
            }
        }

        if let Ok(window_ms) = env::var("MC_RATE_LIMIT_WINDOW_MS") {
            if let Ok(window_ms) = window_ms.parse::<u64>() {
                config.rate_limit.default_policy.window_ms = window_ms;
            } else {
                warn!("Invalid MC_RATE_LIMIT_WINDOW_MS value: {}", window_ms);
            }
        }

        if let Ok(max_entries) = env::var("MC_RATE_LIMIT_MAX_ENTRIES") {
            if let Ok(max_entries) = max_entries.parse::<usize>() {
                config.rate_limit.max_entries_per_command = max_entries;
            } else {
                warn!("Invalid MC_RATE_LIMIT_MAX_ENTRIES value: {}", max_entries);
            }
        }

        if let Ok(cleanup_age) = env::var("MC_RATE_LIMIT_CLEANUP_AGE_MS") {
            if let Ok(cleanup_age) = cleanup_age.parse::<u64>() {
                config.rate_limit.cleanup_age_ms = cleanup_age;
            } else {
                warn!("Invalid MC_RATE_LIMIT_CLEANUP_AGE_MS value: {}", cleanup_age);
            }
        }

        if let Ok(threshold) = env::var("MC_CIRCUIT_FAILURE_THRESHOLD") {
            if let Ok(threshold) = threshold.parse::<u32>() {
                config.circuit_breaker.failure_threshold = threshold;
            } else {
                warn!("Invalid MC_CIRCUIT_FAILURE_THRESHOLD value: {}", threshold);
            }
        }

        if let Ok(timeout) = env::var("MC_CIRCUIT_RESET_TIMEOUT_MS") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                config.circuit_breaker.reset_timeout_ms = timeout;
            } else {
                warn!("Invalid MC_CIRCUIT_RESET_TIMEOUT_MS value: {}", timeout);
            }
        }

        if let Ok(threshold) = env::var("MC_CIRCUIT_SUCCESS_THRESHOLD") {
            if let Ok(threshold) = threshold.parse::<u32>() {
                config.circuit_breaker.success_threshold = threshold;
            } else {
                warn!("Invalid MC_CIRCUIT_SUCCESS_THRESHOLD value: {}", threshold);
            }
        }

        if let Ok(window) = env::var("MC_CIRCUIT_MONITOR_WINDOW_MS") {
            if let Ok(window) = window.parse::<u64>() {
                config.circuit_breaker.monitor_window_ms = window;
            } else {
                warn!("Invalid MC_CIRCUIT_MONITOR_WINDOW_MS value: {}", window);
            }
        }

        if let Ok(min_calls) = env::var("MC_CIRCUIT_MIN_CALLS") {
            if let Ok(min_calls) = min_calls.parse::<u32>() {
                config.circuit_breaker.min_calls = min_calls;
            } else {
                warn!("Invalid MC_CIRCUIT_MIN_CALLS value: {}", min_calls);
            }
        }

        if let Ok(rate) = env::var("MC_CIRCUIT_ERROR_RATE_THRESHOLD") {
            if let Ok(rate) = rate.parse::<f64>() {
                config.circuit_breaker.error_rate_threshold = rate;
            } else {
                warn!("Invalid MC_CIRCUIT_ERROR_RATE_THRESHOLD value: {}", rate);
            }
        }

        if let Ok(log_level) = env::var("MC_LOG_LEVEL") {
            config.log_level = log_level;
        }

        config.validate()?;

        info!("Loaded resilience configuration");
        Ok(config)
    }

    /// Validate the composed configuration
    pub fn validate(&self) -> ResilienceResult<()> {
        self.rate_limit.validate()?;
        self.circuit_breaker.validate()?;
        Ok(())
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            state_url: default_state_url(),
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            log_level: default_log_level(),
        }
    }
}
