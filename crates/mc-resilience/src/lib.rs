//! mc resilience layer
//!
//! Rate limiting and circuit breaking for the mc operations CLI. Command
//! handlers create a [`ResilienceLayer`] at startup and run every outbound
//! call through it: the sliding-window rate limiter caps how often each
//! command may run (persisted across process restarts), and per-target
//! circuit breakers fail fast against backends with sustained failures.
//!
//! Blocked calls fail with typed errors carrying retry information and a
//! distinct process exit code, so wrapping scripts can tell a policy
//! rejection apart from a real command failure.

/// Audit sink module
pub mod audit;

/// Configuration module
pub mod config;

/// Error module
pub mod error;

/// Client identity module
pub mod identity;

/// Resilience module
pub mod resilience;

/// State store module
pub mod state_store;

// Re-export key types
pub use audit::{AuditEvent, AuditEventKind, AuditSink, NullAuditSink, TracingAuditSink};
pub use config::ResilienceConfig;
pub use error::{ResilienceError, ResilienceResult};
pub use identity::client_identity;
pub use resilience::{
    cleanup_old_entries, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry,
    CircuitDecision, CircuitHealth, CircuitState, CircuitStats, CircuitStatus, CircuitTransition,
    CommandUsage, RateLimitCheck, RateLimitConfig, RateLimitPolicy, RateLimiter, ResilienceLayer,
};
pub use state_store::{
    create_state_store, FileStateStore, InMemoryStateStore, RateLimitState, RateLimitStateStore,
};

/// Initialize logging with the configured default level
///
/// `RUST_LOG` takes precedence over the configured level when set.
pub fn init_logging(config: &ResilienceConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
