//! Error types for the mc resilience layer
//!
//! This module contains the error types used throughout the crate.

use thiserror::Error;

/// Resilience error types
#[derive(Error, Debug)]
pub enum ResilienceError {
    /// Rate limit exceeded
    #[error("Rate limit exceeded for {command}: {current_count}/{max_calls} calls in window. Retry after {retry_after_ms}ms")]
    RateLimitExceeded {
        /// Command being rate limited
        command: String,
        /// Calls counted inside the window at decision time
        current_count: u32,
        /// Maximum calls allowed in the time window
        max_calls: u32,
        /// Time until the oldest in-window call expires, in milliseconds
        retry_after_ms: u64,
    },

    /// Circuit breaker open
    #[error("Circuit breaker open for {circuit} after {failures} failures. Retry after {retry_after_ms}ms")]
    CircuitBreakerOpen {
        /// Circuit protecting the failing target
        circuit: String,
        /// Number of consecutive failures
        failures: u32,
        /// Time until the next recovery probe, in milliseconds
        retry_after_ms: u64,
    },

    /// State store error
    #[error("State store error: {0}")]
    StateStoreError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type for resilience operations
pub type ResilienceResult<T> = Result<T, ResilienceError>;

// Implement conversions from other error types
impl From<std::io::Error> for ResilienceError {
    fn from(err: std::io::Error) -> Self {
        ResilienceError::StateStoreError(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for ResilienceError {
    fn from(err: serde_json::Error) -> Self {
        ResilienceError::StateStoreError(format!("JSON error: {}", err))
    }
}

impl ResilienceError {
    /// Check if the error is a rate limit error
    pub fn is_rate_limit_error(&self) -> bool {
        matches!(self, ResilienceError::RateLimitExceeded { .. })
    }

    /// Check if the error is a circuit breaker error
    pub fn is_circuit_breaker_error(&self) -> bool {
        matches!(self, ResilienceError::CircuitBreakerOpen { .. })
    }

    /// Check if the error is a policy rejection (blocked call, not a real failure)
    pub fn is_policy_rejection(&self) -> bool {
        self.is_rate_limit_error() || self.is_circuit_breaker_error()
    }

    /// Stable error code for machine-readable output
    pub fn code(&self) -> &'static str {
        match self {
            ResilienceError::RateLimitExceeded { .. } => "ERR_RATE_LIMIT_EXCEEDED",
            ResilienceError::CircuitBreakerOpen { .. } => "ERR_CIRCUIT_BREAKER_OPEN",
            ResilienceError::StateStoreError(_) => "ERR_STATE_STORE",
            ResilienceError::ConfigError(_) => "ERR_CONFIG",
            ResilienceError::ValidationError(_) => "ERR_VALIDATION",
            ResilienceError::InternalError(_) => "ERR_INTERNAL",
        }
    }

    /// Process exit code category for this error, following sysexits.h
    ///
    /// Policy rejections map to EX_TEMPFAIL so wrapping scripts can tell
    /// "blocked, retry later" apart from real command failures. Configuration
    /// and validation problems map to EX_USAGE, state persistence problems
    /// to EX_IOERR, everything else to EX_SOFTWARE.
    pub fn exit_code(&self) -> i32 {
        match self {
            ResilienceError::RateLimitExceeded { .. } | ResilienceError::CircuitBreakerOpen { .. } => 75,
            ResilienceError::ConfigError(_) | ResilienceError::ValidationError(_) => 64,
            ResilienceError::StateStoreError(_) => 74,
            ResilienceError::InternalError(_) => 70,
        }
    }

    /// Retry delay in whole seconds, rounded up to at least one second
    ///
    /// Only policy rejections carry a retry delay.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ResilienceError::RateLimitExceeded { retry_after_ms, .. }
            | ResilienceError::CircuitBreakerOpen { retry_after_ms, .. } => {
                Some(((*retry_after_ms + 999) / 1000).max(1))
            }
            _ => None,
        }
    }

    /// Machine-readable JSON rendition of the error
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;

        match self {
            ResilienceError::RateLimitExceeded {
                command,
                current_count,
                max_calls,
                retry_after_ms,
            } => json!({
                "error": self.code(),
                "message": self.to_string(),
                "command": command,
                "current_count": current_count,
                "max_calls": max_calls,
                "retry_after_ms": retry_after_ms,
                "retry_after_secs": self.retry_after_secs(),
            }),
            ResilienceError::CircuitBreakerOpen {
                circuit,
                failures,
                retry_after_ms,
            } => json!({
                "error": self.code(),
                "message": self.to_string(),
                "circuit": circuit,
                "failures": failures,
                "retry_after_ms": retry_after_ms,
                "retry_after_secs": self.retry_after_secs(),
            }),
            other => json!({
                "error": other.code(),
                "message": other.to_string(),
            }),
        }
    }
}
