//! Audit sink for resilience events
//!
//! The rate limiter and circuit breakers report blocked calls and state
//! transitions through an [`AuditSink`]. Delivery is strictly best effort:
//! sink methods return nothing, implementations swallow their own failures,
//! and the enforcement decision never depends on the sink.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::identity::client_identity;

/// Kinds of audit events emitted by the resilience layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventKind {
    /// A call was blocked by a rate limit
    RateLimitExceeded,
    /// Rate limit counters were cleared
    RateLimitReset,
    /// A circuit breaker opened
    CircuitOpened,
    /// A circuit breaker closed after recovery or a manual close
    CircuitClosed,
    /// A circuit breaker was reset administratively
    CircuitReset,
}

impl fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditEventKind::RateLimitExceeded => write!(f, "RATE_LIMIT_EXCEEDED"),
            AuditEventKind::RateLimitReset => write!(f, "RATE_LIMIT_RESET"),
            AuditEventKind::CircuitOpened => write!(f, "CIRCUIT_OPENED"),
            AuditEventKind::CircuitClosed => write!(f, "CIRCUIT_CLOSED"),
            AuditEventKind::CircuitReset => write!(f, "CIRCUIT_RESET"),
        }
    }
}

/// A single audit event
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Event kind tag
    pub kind: AuditEventKind,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// Identity of the local user and machine (see [`crate::identity`])
    pub client_id: String,
    /// Free-form event details
    pub details: Value,
}

impl AuditEvent {
    /// Create an event stamped with the current time and client identity
    pub fn new(kind: AuditEventKind, details: Value) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            client_id: client_identity(),
            details,
        }
    }
}

/// Best-effort sink for audit events
///
/// Both methods are fire-and-forget: they must not block the caller and must
/// not propagate failures.
pub trait AuditSink: Send + Sync {
    /// Record a security violation (a blocked call or an opened circuit)
    fn security_violation(&self, event: AuditEvent);

    /// Record a routine audit event (recovery, administrative reset)
    fn audit(&self, event: AuditEvent);
}

/// Audit sink that writes structured log lines
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn security_violation(&self, event: AuditEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => warn!("Security violation: {}", payload),
            Err(e) => warn!("Failed to serialize audit event {}: {}", event.kind, e),
        }
    }

    fn audit(&self, event: AuditEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => info!("Audit: {}", payload),
            Err(e) => warn!("Failed to serialize audit event {}: {}", event.kind, e),
        }
    }
}

/// Audit sink that discards every event
#[derive(Debug, Default, Clone)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn security_violation(&self, _event: AuditEvent) {}

    fn audit(&self, _event: AuditEvent) {}
}
