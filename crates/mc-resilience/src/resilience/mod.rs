//! Resilience patterns for the mc CLI
//!
//! This module contains the two protections every outbound mc command runs
//! under: a persistent sliding-window rate limiter and per-target circuit
//! breakers. [`ResilienceLayer`] bundles them behind one handle.

use std::future::Future;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Circuit breaker module
pub mod circuit_breaker;

/// Rate limiter module
pub mod rate_limiter;

// Re-export key types
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitDecision, CircuitHealth,
    CircuitState, CircuitStats, CircuitStatus, CircuitTransition,
};
pub use rate_limiter::{
    cleanup_old_entries, CommandUsage, RateLimitCheck, RateLimitConfig, RateLimitPolicy,
    RateLimiter,
};

use crate::audit::{AuditSink, TracingAuditSink};
use crate::config::ResilienceConfig;
use crate::error::{ResilienceError, ResilienceResult};
use crate::state_store::{create_state_store, RateLimitStateStore};

/// Current timestamp in milliseconds
pub(crate) fn current_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Combined resilience layer: rate limiter plus circuit breaker registry
pub struct ResilienceLayer {
    /// Sliding-window rate limiter
    rate_limiter: RateLimiter,

    /// Circuit breaker registry
    circuits: CircuitBreakerRegistry,
}

impl ResilienceLayer {
    /// Create a layer from configuration and injected collaborators
    pub fn new(
        config: ResilienceConfig,
        store: Arc<dyn RateLimitStateStore>,
        audit: Arc<dyn AuditSink>,
    ) -> ResilienceResult<Self> {
        let rate_limiter = RateLimiter::new(config.rate_limit, store, audit.clone())?;
        let circuits = CircuitBreakerRegistry::new(config.circuit_breaker, audit)?;
        Ok(Self { rate_limiter, circuits })
    }

    /// Create a layer with the configured state store and the tracing audit sink
    pub fn from_config(config: ResilienceConfig) -> ResilienceResult<Self> {
        let store = create_state_store(&config.state_url)?;
        Self::new(config, store, Arc::new(TracingAuditSink))
    }

    /// Rate limiter handle
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Circuit breaker registry handle
    pub fn circuits(&self) -> &CircuitBreakerRegistry {
        &self.circuits
    }

    /// Execute a unit of work under both protections
    ///
    /// Enforces the command's rate limit first, then runs the operation
    /// through the named circuit, so a rate-limited call never reaches the
    /// circuit at all.
    pub async fn execute<T, E, F, Fut>(
        &self,
        command: &str,
        circuit: &str,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ResilienceError>,
    {
        self.rate_limiter.enforce(command).await.map_err(E::from)?;
        self.circuits.execute(circuit, operation).await
    }
}
