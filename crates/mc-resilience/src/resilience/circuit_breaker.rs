//! Circuit breaker pattern implementation
//!
//! Protects repeated calls against failing targets (the core API, Docker and
//! friends) by failing fast once failures accumulate, then probing for
//! recovery after a reset timeout. Breakers live in a
//! [`CircuitBreakerRegistry`] created at startup; there is no ambient global
//! state.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::current_time_ms;
use crate::audit::{AuditEvent, AuditEventKind, AuditSink};
use crate::error::{ResilienceError, ResilienceResult};

/// Number of state transitions kept per circuit
const TRANSITION_LOG_LIMIT: usize = 50;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Circuit is closed (normal operation)
    #[default]
    Closed,
    /// Circuit is open (failing fast)
    Open,
    /// Circuit is half-open (probing for recovery)
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Time to wait before probing for recovery, in milliseconds
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,

    /// Consecutive successes while half-open required to close
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Trailing window for the error rate calculation, in milliseconds
    #[serde(default = "default_monitor_window_ms")]
    pub monitor_window_ms: u64,

    /// Minimum recorded calls before the error rate trigger applies
    #[serde(default = "default_min_calls")]
    pub min_calls: u32,

    /// Error rate in percent at or above which the circuit opens
    #[serde(default = "default_error_rate_threshold")]
    pub error_rate_threshold: f64,
}

// Default values
fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout_ms() -> u64 {
    30_000 // 30 seconds
}

fn default_success_threshold() -> u32 {
    2
}

fn default_monitor_window_ms() -> u64 {
    60_000 // 1 minute
}

fn default_min_calls() -> u32 {
    10
}

fn default_error_rate_threshold() -> f64 {
    50.0
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
            success_threshold: default_success_threshold(),
            monitor_window_ms: default_monitor_window_ms(),
            min_calls: default_min_calls(),
            error_rate_threshold: default_error_rate_threshold(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Validate thresholds
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.failure_threshold == 0 {
            return Err(ResilienceError::ConfigError(
                "failure_threshold must be greater than zero".to_string(),
            ));
        }
        if self.success_threshold == 0 {
            return Err(ResilienceError::ConfigError(
                "success_threshold must be greater than zero".to_string(),
            ));
        }
        if self.reset_timeout_ms == 0 {
            return Err(ResilienceError::ConfigError(
                "reset_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.monitor_window_ms == 0 {
            return Err(ResilienceError::ConfigError(
                "monitor_window_ms must be greater than zero".to_string(),
            ));
        }
        if !(self.error_rate_threshold > 0.0 && self.error_rate_threshold <= 100.0) {
            return Err(ResilienceError::ConfigError(
                "error_rate_threshold must be within (0, 100]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Decision returned by [`CircuitBreaker::can_execute`]
#[derive(Debug, Clone, Serialize)]
pub struct CircuitDecision {
    /// Whether a call may proceed
    pub allowed: bool,

    /// State the decision was made in
    pub state: CircuitState,

    /// Why a call is blocked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Remaining time until the recovery probe, present only when blocked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,

    /// True when the circuit is half-open and the call is a recovery probe
    pub testing: bool,
}

/// Cumulative statistics for one circuit
#[derive(Debug, Clone, Default, Serialize)]
pub struct CircuitStats {
    /// Total recorded calls
    pub total_calls: u64,
    /// Total recorded successes
    pub total_successes: u64,
    /// Total recorded failures
    pub total_failures: u64,
    /// Consecutive failures since the last success
    pub consecutive_failures: u32,
    /// Consecutive successes since the last failure
    pub consecutive_successes: u32,
    /// Epoch milliseconds of the last recorded failure
    pub last_failure_at_ms: Option<u64>,
    /// Epoch milliseconds of the last recorded success
    pub last_success_at_ms: Option<u64>,
    /// Epoch milliseconds of the last transition to OPEN
    pub last_opened_at_ms: Option<u64>,
    /// Epoch milliseconds of the last transition to CLOSED
    pub last_closed_at_ms: Option<u64>,
}

/// One recorded state transition
#[derive(Debug, Clone, Serialize)]
pub struct CircuitTransition {
    /// State before the transition
    pub from: CircuitState,
    /// State after the transition
    pub to: CircuitState,
    /// Epoch milliseconds of the transition
    pub at_ms: u64,
    /// Why the transition happened
    pub reason: String,
}

/// Health indicator derived from circuit state and recent failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitHealth {
    /// Closed with no recent failures
    Healthy,
    /// Closed but failures have been recorded
    Degraded,
    /// Open, failing fast
    Unhealthy,
    /// Half-open, probing for recovery
    Recovering,
}

impl fmt::Display for CircuitHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitHealth::Healthy => write!(f, "healthy"),
            CircuitHealth::Degraded => write!(f, "degraded"),
            CircuitHealth::Unhealthy => write!(f, "unhealthy"),
            CircuitHealth::Recovering => write!(f, "recovering"),
        }
    }
}

/// Status snapshot for one circuit
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStatus {
    /// Circuit name
    pub name: String,
    /// Current state
    pub state: CircuitState,
    /// Derived health indicator
    pub health: CircuitHealth,
    /// Cumulative statistics
    pub stats: CircuitStats,
    /// Epoch milliseconds the current OPEN period started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened_at_ms: Option<u64>,
    /// Remaining time until the recovery probe, present only while open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    /// Recent state transitions, oldest first
    pub transitions: Vec<CircuitTransition>,
}

/// Mutable circuit state, guarded by the breaker mutex
struct CircuitInner {
    /// Current state of the circuit
    state: CircuitState,

    /// Failure timestamps inside the monitoring window
    failure_window: VecDeque<u64>,

    /// Cumulative statistics
    stats: CircuitStats,

    /// Epoch milliseconds the current OPEN period started; kept through
    /// HALF_OPEN so recovery can report the full downtime
    opened_at: Option<u64>,

    /// Recent transitions, oldest first
    transitions: VecDeque<CircuitTransition>,

    /// Pending reset timer, present only while OPEN
    reset_timer: Option<JoinHandle<()>>,
}

impl CircuitInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_window: VecDeque::new(),
            stats: CircuitStats::default(),
            opened_at: None,
            transitions: VecDeque::new(),
            reset_timer: None,
        }
    }

    /// Record a transition and apply the new state
    fn transition(&mut self, to: CircuitState, reason: &str, now: u64) {
        let from = self.state;
        self.state = to;
        self.transitions.push_back(CircuitTransition {
            from,
            to,
            at_ms: now,
            reason: reason.to_string(),
        });
        while self.transitions.len() > TRANSITION_LOG_LIMIT {
            self.transitions.pop_front();
        }
    }

    /// Drop failure timestamps that fell out of the monitoring window
    fn prune_failure_window(&mut self, now: u64, monitor_window_ms: u64) {
        let cutoff = now.saturating_sub(monitor_window_ms);
        while let Some(ts) = self.failure_window.front() {
            if *ts < cutoff {
                self.failure_window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Cancel the pending reset timer, if any
    fn cancel_reset_timer(&mut self) {
        if let Some(handle) = self.reset_timer.take() {
            handle.abort();
        }
    }
}

/// Circuit breaker for one named target
///
/// All counters live in memory under a single mutex. The only owned task is
/// the reset timer driving the OPEN to HALF_OPEN transition; every path that
/// closes, reopens or removes the circuit cancels it first.
pub struct CircuitBreaker {
    /// Circuit name
    name: String,

    /// Configuration for this circuit
    config: CircuitBreakerConfig,

    /// Guarded mutable state
    inner: Mutex<CircuitInner>,

    /// Weak self-handle given to the reset timer task
    me: Weak<CircuitBreaker>,

    /// Best-effort sink for open and close transitions
    audit: Arc<dyn AuditSink>,
}

impl CircuitBreaker {
    /// Create a breaker; the configuration is validated up front
    pub fn new(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        audit: Arc<dyn AuditSink>,
    ) -> ResilienceResult<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new_cyclic(|me| Self {
            name: name.into(),
            config,
            inner: Mutex::new(CircuitInner::new()),
            me: me.clone(),
            audit,
        }))
    }

    /// Circuit name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration for this circuit
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state
    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    /// Cumulative statistics snapshot
    pub async fn stats(&self) -> CircuitStats {
        self.inner.lock().await.stats.clone()
    }

    /// Whether a pending reset timer exists
    pub async fn reset_timer_active(&self) -> bool {
        self.inner.lock().await.reset_timer.is_some()
    }

    /// Whether a call may proceed right now
    ///
    /// A pure read: no counters move and no transition happens. An OPEN
    /// circuit stays blocked until the reset timer or an explicit
    /// [`half_open_circuit`](Self::half_open_circuit) moves it along, even
    /// when the reported retry delay has reached zero.
    pub async fn can_execute(&self) -> CircuitDecision {
        let inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed => CircuitDecision {
                allowed: true,
                state: CircuitState::Closed,
                reason: None,
                retry_after_ms: None,
                testing: false,
            },
            CircuitState::Open => {
                let now = current_time_ms();
                let retry_after_ms = inner
                    .opened_at
                    .map(|opened| {
                        self.config.reset_timeout_ms.saturating_sub(now.saturating_sub(opened))
                    })
                    .unwrap_or(self.config.reset_timeout_ms);
                CircuitDecision {
                    allowed: false,
                    state: CircuitState::Open,
                    reason: Some(format!("Circuit breaker {} is OPEN", self.name)),
                    retry_after_ms: Some(retry_after_ms),
                    testing: false,
                }
            }
            CircuitState::HalfOpen => CircuitDecision {
                allowed: true,
                state: CircuitState::HalfOpen,
                reason: None,
                retry_after_ms: None,
                testing: true,
            },
        }
    }

    /// Record a successful call
    ///
    /// While half-open, enough consecutive successes close the circuit.
    pub async fn record_success(&self) {
        let now = current_time_ms();
        let mut inner = self.inner.lock().await;
        inner.stats.total_calls += 1;
        inner.stats.total_successes += 1;
        inner.stats.last_success_at_ms = Some(now);
        inner.stats.consecutive_failures = 0;
        inner.stats.consecutive_successes += 1;

        if inner.state == CircuitState::HalfOpen
            && inner.stats.consecutive_successes >= self.config.success_threshold
        {
            self.close_locked(&mut inner, now, "success threshold reached while half-open");
        }
    }

    /// Record a failed call, opening the circuit when a trigger fires
    ///
    /// While closed, the circuit opens on the consecutive failure threshold
    /// or on the error rate trigger once enough calls were recorded. While
    /// half-open, a single failure reopens it immediately.
    pub async fn record_failure(&self) {
        let now = current_time_ms();
        let mut inner = self.inner.lock().await;
        inner.stats.total_calls += 1;
        inner.stats.total_failures += 1;
        inner.stats.last_failure_at_ms = Some(now);
        inner.stats.consecutive_successes = 0;
        inner.stats.consecutive_failures += 1;
        inner.failure_window.push_back(now);
        inner.prune_failure_window(now, self.config.monitor_window_ms);

        match inner.state {
            CircuitState::HalfOpen => {
                self.open_locked(&mut inner, now, "failure while half-open");
            }
            CircuitState::Closed => {
                if inner.stats.consecutive_failures >= self.config.failure_threshold {
                    let reason = format!("{} consecutive failures", inner.stats.consecutive_failures);
                    self.open_locked(&mut inner, now, &reason);
                } else if inner.stats.total_calls >= u64::from(self.config.min_calls) {
                    let error_rate =
                        inner.failure_window.len() as f64 / inner.stats.total_calls as f64 * 100.0;
                    if error_rate >= self.config.error_rate_threshold {
                        let reason = format!(
                            "error rate {:.1}% over {} calls",
                            error_rate, inner.stats.total_calls
                        );
                        self.open_locked(&mut inner, now, &reason);
                    }
                }
            }
            CircuitState::Open => {
                // Late failures from in-flight calls only count, no transition
                debug!("Circuit breaker {} recorded a failure while open", self.name);
            }
        }
    }

    /// Move an OPEN circuit to HALF_OPEN for probing
    ///
    /// Runs as the reset timer callback and as the explicit trigger; no-ops
    /// unless the circuit is currently OPEN, so a stale timer firing after a
    /// manual close is harmless.
    pub async fn half_open_circuit(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state != CircuitState::Open {
            return;
        }
        let now = current_time_ms();
        inner.cancel_reset_timer();
        inner.transition(CircuitState::HalfOpen, "reset timeout elapsed", now);
        inner.stats.consecutive_successes = 0;
        info!("Circuit breaker {} half-open, probing for recovery", self.name);
    }

    /// Force the circuit closed, keeping cumulative statistics
    pub async fn close_circuit(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == CircuitState::Closed {
            return;
        }
        self.close_locked(&mut inner, current_time_ms(), "manual close");
    }

    /// Force the circuit closed and zero all statistics
    pub async fn reset_circuit(&self) {
        let now = current_time_ms();
        let mut inner = self.inner.lock().await;
        inner.cancel_reset_timer();
        if inner.state != CircuitState::Closed {
            inner.transition(CircuitState::Closed, "manual reset", now);
        }
        inner.failure_window.clear();
        inner.opened_at = None;
        inner.stats = CircuitStats::default();
        inner.stats.last_closed_at_ms = Some(now);
        info!("Circuit breaker {} reset", self.name);
        self.audit.audit(AuditEvent::new(
            AuditEventKind::CircuitReset,
            json!({ "circuit": self.name }),
        ));
    }

    /// Status snapshot including the derived health indicator
    pub async fn status(&self) -> CircuitStatus {
        let inner = self.inner.lock().await;
        let now = current_time_ms();

        let retry_after_ms = match inner.state {
            CircuitState::Open => Some(
                inner
                    .opened_at
                    .map(|opened| {
                        self.config.reset_timeout_ms.saturating_sub(now.saturating_sub(opened))
                    })
                    .unwrap_or(self.config.reset_timeout_ms),
            ),
            _ => None,
        };
        let health = match inner.state {
            CircuitState::Open => CircuitHealth::Unhealthy,
            CircuitState::HalfOpen => CircuitHealth::Recovering,
            CircuitState::Closed
                if inner.stats.consecutive_failures > 0 || !inner.failure_window.is_empty() =>
            {
                CircuitHealth::Degraded
            }
            CircuitState::Closed => CircuitHealth::Healthy,
        };

        CircuitStatus {
            name: self.name.clone(),
            state: inner.state,
            health,
            stats: inner.stats.clone(),
            opened_at_ms: inner.opened_at,
            retry_after_ms,
            transitions: inner.transitions.iter().cloned().collect(),
        }
    }

    /// Transition to OPEN, audit the violation and schedule the reset timer
    fn open_locked(&self, inner: &mut CircuitInner, now: u64, reason: &str) {
        inner.transition(CircuitState::Open, reason, now);
        inner.opened_at = Some(now);
        inner.stats.last_opened_at_ms = Some(now);
        self.schedule_reset_locked(inner);

        warn!("Circuit breaker {} opened: {}", self.name, reason);
        self.audit.security_violation(AuditEvent::new(
            AuditEventKind::CircuitOpened,
            json!({
                "circuit": self.name,
                "reason": reason,
                "consecutive_failures": inner.stats.consecutive_failures,
                "reset_timeout_ms": self.config.reset_timeout_ms,
            }),
        ));
    }

    /// Transition to CLOSED, audit the recovery and cancel the timer
    fn close_locked(&self, inner: &mut CircuitInner, now: u64, reason: &str) {
        let downtime_ms = inner.opened_at.map(|opened| now.saturating_sub(opened));
        inner.cancel_reset_timer();
        inner.transition(CircuitState::Closed, reason, now);
        inner.stats.consecutive_failures = 0;
        inner.stats.consecutive_successes = 0;
        inner.stats.last_closed_at_ms = Some(now);
        inner.failure_window.clear();
        inner.opened_at = None;

        info!("Circuit breaker {} closed: {}", self.name, reason);
        self.audit.audit(AuditEvent::new(
            AuditEventKind::CircuitClosed,
            json!({
                "circuit": self.name,
                "reason": reason,
                "downtime_ms": downtime_ms,
            }),
        ));
    }

    /// Replace any pending reset timer with a fresh one
    ///
    /// The timer task holds only a weak handle, so a pending timer never
    /// keeps a removed breaker alive.
    fn schedule_reset_locked(&self, inner: &mut CircuitInner) {
        inner.cancel_reset_timer();
        let weak = self.me.clone();
        let timeout = Duration::from_millis(self.config.reset_timeout_ms);
        inner.reset_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(breaker) = weak.upgrade() {
                breaker.half_open_circuit().await;
            }
        }));
    }
}

/// Process-wide registry owning the circuit breaker instances
///
/// Created once at startup and handed to command handlers; breakers are
/// created lazily on first use and live for the registry's lifetime.
pub struct CircuitBreakerRegistry {
    /// Circuits by name
    circuits: DashMap<String, Arc<CircuitBreaker>>,

    /// Default configuration for lazily created circuits
    default_config: CircuitBreakerConfig,

    /// Audit sink handed to every circuit
    audit: Arc<dyn AuditSink>,
}

impl CircuitBreakerRegistry {
    /// Create a registry; the default configuration is validated up front
    pub fn new(
        default_config: CircuitBreakerConfig,
        audit: Arc<dyn AuditSink>,
    ) -> ResilienceResult<Self> {
        default_config.validate()?;
        Ok(Self {
            circuits: DashMap::new(),
            default_config,
            audit,
        })
    }

    /// Get or lazily create the named circuit with the default configuration
    pub fn circuit(&self, name: &str) -> ResilienceResult<Arc<CircuitBreaker>> {
        self.circuit_with_config(name, self.default_config.clone())
    }

    /// Get or lazily create the named circuit with a configuration override
    ///
    /// The override applies only when the circuit does not exist yet; an
    /// existing circuit keeps the configuration it was created with.
    pub fn circuit_with_config(
        &self,
        name: &str,
        config: CircuitBreakerConfig,
    ) -> ResilienceResult<Arc<CircuitBreaker>> {
        // Fast path for existing circuits
        if let Some(breaker) = self.circuits.get(name) {
            return Ok(breaker.clone());
        }

        let breaker = CircuitBreaker::new(name, config, self.audit.clone())?;
        let entry = self.circuits.entry(name.to_string());
        Ok(entry.or_insert(breaker).clone())
    }

    /// Remove a circuit, cancelling any pending reset timer
    ///
    /// Returns whether a circuit was removed.
    pub async fn remove_circuit(&self, name: &str) -> bool {
        match self.circuits.remove(name) {
            Some((_, breaker)) => {
                breaker.inner.lock().await.cancel_reset_timer();
                debug!("Circuit breaker {} removed", name);
                true
            }
            None => false,
        }
    }

    /// Names of all registered circuits, sorted
    pub fn circuit_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.circuits.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Status snapshot of every circuit, sorted by name
    pub async fn all_status(&self) -> Vec<CircuitStatus> {
        // Collect handles first; status() awaits each circuit mutex
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.circuits.iter().map(|entry| entry.value().clone()).collect();

        let mut statuses = Vec::with_capacity(breakers.len());
        for breaker in breakers {
            statuses.push(breaker.status().await);
        }
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Force-close every circuit, clearing counters and timers
    pub async fn reset_all(&self) {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.circuits.iter().map(|entry| entry.value().clone()).collect();
        for breaker in breakers {
            breaker.reset_circuit().await;
        }
        info!("All circuit breakers reset");
    }

    /// Execute a unit of work through the named circuit
    ///
    /// A blocked call fails with [`ResilienceError::CircuitBreakerOpen`]
    /// converted into the caller's error type, without invoking the
    /// operation. The operation's own error is recorded as a failure and
    /// returned unchanged.
    pub async fn execute<T, E, F, Fut>(&self, name: &str, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ResilienceError>,
    {
        let breaker = self.circuit(name).map_err(E::from)?;
        Self::execute_on(&breaker, operation).await
    }

    /// Execute with a configuration override applied on first creation only
    pub async fn execute_with_config<T, E, F, Fut>(
        &self,
        name: &str,
        config: CircuitBreakerConfig,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ResilienceError>,
    {
        let breaker = self.circuit_with_config(name, config).map_err(E::from)?;
        Self::execute_on(&breaker, operation).await
    }

    async fn execute_on<T, E, F, Fut>(breaker: &Arc<CircuitBreaker>, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ResilienceError>,
    {
        let decision = breaker.can_execute().await;
        if !decision.allowed {
            let stats = breaker.stats().await;
            return Err(E::from(ResilienceError::CircuitBreakerOpen {
                circuit: breaker.name().to_string(),
                failures: stats.consecutive_failures,
                retry_after_ms: decision.retry_after_ms.unwrap_or(0),
            }));
        }

        match operation().await {
            Ok(value) => {
                breaker.record_success().await;
                Ok(value)
            }
            Err(e) => {
                breaker.record_failure().await;
                Err(e)
            }
        }
    }
}
