//! Sliding-window rate limiter for mc commands
//!
//! Limits how often each command may run by keeping per-command invocation
//! timestamps in a persistent state store, so limits hold across process
//! restarts. Every decision re-derives the window from the stored timestamps;
//! nothing is cached in memory between checks.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::current_time_ms;
use crate::audit::{AuditEvent, AuditEventKind, AuditSink};
use crate::error::{ResilienceError, ResilienceResult};
use crate::state_store::{RateLimitState, RateLimitStateStore};

/// Rate limit policy for a single command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Maximum calls allowed inside the window
    #[serde(default = "default_max_calls")]
    pub max_calls: u32,

    /// Window duration in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl RateLimitPolicy {
    /// Create a policy allowing `max_calls` per `window_ms`
    pub fn new(max_calls: u32, window_ms: u64) -> Self {
        Self { max_calls, window_ms }
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_calls: default_max_calls(),
            window_ms: default_window_ms(),
        }
    }
}

/// Rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Per-command policies; commands without an entry use the default policy
    #[serde(default)]
    pub policies: HashMap<String, RateLimitPolicy>,

    /// Fallback policy for unconfigured commands
    #[serde(default)]
    pub default_policy: RateLimitPolicy,

    /// Maximum retained timestamps per command
    #[serde(default = "default_max_entries_per_command")]
    pub max_entries_per_command: usize,

    /// Age in milliseconds beyond which entries are purged by cleanup
    #[serde(default = "default_cleanup_age_ms")]
    pub cleanup_age_ms: u64,
}

// Default values
fn default_max_calls() -> u32 {
    100
}

fn default_window_ms() -> u64 {
    60_000 // 1 minute
}

fn default_max_entries_per_command() -> usize {
    1000
}

fn default_cleanup_age_ms() -> u64 {
    3_600_000 // 1 hour
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            policies: HashMap::new(),
            default_policy: RateLimitPolicy::default(),
            max_entries_per_command: default_max_entries_per_command(),
            cleanup_age_ms: default_cleanup_age_ms(),
        }
    }
}

impl RateLimitConfig {
    /// Longest window across the default and per-command policies
    pub fn longest_window_ms(&self) -> u64 {
        self.policies
            .values()
            .map(|p| p.window_ms)
            .fold(self.default_policy.window_ms, u64::max)
    }

    /// Validate thresholds and window relationships
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.default_policy.max_calls == 0 || self.default_policy.window_ms == 0 {
            return Err(ResilienceError::ConfigError(
                "Default rate limit policy must allow at least one call in a non-zero window"
                    .to_string(),
            ));
        }
        for (command, policy) in &self.policies {
            if policy.max_calls == 0 || policy.window_ms == 0 {
                return Err(ResilienceError::ConfigError(format!(
                    "Rate limit policy for '{}' must allow at least one call in a non-zero window",
                    command
                )));
            }
        }
        if self.max_entries_per_command == 0 {
            return Err(ResilienceError::ConfigError(
                "max_entries_per_command must be greater than zero".to_string(),
            ));
        }

        // Cleanup must never shorten an active window
        let longest = self.longest_window_ms();
        if self.cleanup_age_ms < longest {
            return Err(ResilienceError::ConfigError(format!(
                "cleanup_age_ms ({}) must be at least the longest configured window ({})",
                self.cleanup_age_ms, longest
            )));
        }
        Ok(())
    }
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitCheck {
    /// Whether the call may proceed
    pub allowed: bool,

    /// Command that was checked
    pub command: String,

    /// Maximum calls allowed in the window
    pub max_calls: u32,

    /// Calls counted inside the window when the decision was made; a call
    /// recorded by this check is not included
    pub current_count: u32,

    /// Time until the oldest in-window call expires; present only when blocked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl RateLimitCheck {
    /// Retry delay in whole seconds, rounded up to at least one second
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after_ms.map(|ms| ((ms + 999) / 1000).max(1))
    }
}

/// Usage snapshot for one command
#[derive(Debug, Clone, Serialize)]
pub struct CommandUsage {
    /// Command name
    pub command: String,

    /// Maximum calls allowed in the window
    pub max_calls: u32,

    /// Calls currently counted in the window
    pub used: u32,

    /// Calls remaining before the limit blocks
    pub remaining: u32,

    /// Window duration in milliseconds
    pub window_ms: u64,

    /// Epoch milliseconds when the oldest in-window call expires; `now` when
    /// the window is empty
    pub reset_at_ms: u64,
}

/// Drop aged entries, cap list lengths and remove emptied commands
///
/// Entries at or older than `now_ms - cleanup_age_ms` are dropped. Surviving
/// lists keep only their most recent `max_entries` timestamps, pruned from the
/// front. The input state is left untouched.
pub fn cleanup_old_entries(
    state: &RateLimitState,
    now_ms: u64,
    cleanup_age_ms: u64,
    max_entries: usize,
) -> RateLimitState {
    let cutoff = now_ms.saturating_sub(cleanup_age_ms);
    let mut cleaned = RateLimitState::new();
    for (command, timestamps) in state {
        let mut kept: Vec<u64> = timestamps.iter().copied().filter(|&ts| ts > cutoff).collect();
        if kept.len() > max_entries {
            let excess = kept.len() - max_entries;
            kept.drain(..excess);
        }
        if !kept.is_empty() {
            cleaned.insert(command.clone(), kept);
        }
    }
    cleaned
}

/// Sliding-window rate limiter keyed by command name
///
/// Recording checks run a load-decide-append-save cycle against the state
/// store. Load failures degrade to an empty state so a broken store never
/// blocks commands; save failures surface so silent undercounting is visible.
pub struct RateLimiter {
    /// Configuration for the rate limiter
    config: RateLimitConfig,

    /// Persistent state backend
    store: Arc<dyn RateLimitStateStore>,

    /// Best-effort sink for violations and resets
    audit: Arc<dyn AuditSink>,
}

impl RateLimiter {
    /// Create a rate limiter; the configuration is validated up front
    pub fn new(
        config: RateLimitConfig,
        store: Arc<dyn RateLimitStateStore>,
        audit: Arc<dyn AuditSink>,
    ) -> ResilienceResult<Self> {
        config.validate()?;
        Ok(Self { config, store, audit })
    }

    /// Configuration in effect
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Policy for a command, falling back to the default policy
    pub fn policy_for(&self, command: &str) -> &RateLimitPolicy {
        self.config
            .policies
            .get(command)
            .unwrap_or(&self.config.default_policy)
    }

    /// Check a command and record the call unless it is blocked
    pub async fn check(&self, command: &str) -> ResilienceResult<RateLimitCheck> {
        self.check_inner(command, true).await
    }

    /// Check a command without recording anything or touching the store
    pub async fn peek(&self, command: &str) -> ResilienceResult<RateLimitCheck> {
        self.check_inner(command, false).await
    }

    async fn check_inner(&self, command: &str, record: bool) -> ResilienceResult<RateLimitCheck> {
        if command.is_empty() {
            return Err(ResilienceError::ValidationError(
                "Command name must not be empty".to_string(),
            ));
        }

        let now = current_time_ms();
        let mut state = self.load_state(now).await;
        let policy = self.policy_for(command);
        let window_start = now.saturating_sub(policy.window_ms);

        let in_window: Vec<u64> = state
            .get(command)
            .map(|timestamps| {
                timestamps.iter().copied().filter(|&ts| ts >= window_start).collect()
            })
            .unwrap_or_default();
        let current_count = in_window.len() as u32;

        if current_count >= policy.max_calls {
            // Blocked calls are never recorded
            let oldest = in_window.iter().copied().min().unwrap_or(now);
            let retry_after_ms = (oldest + policy.window_ms).saturating_sub(now).max(1);
            debug!(
                "Rate limit blocked {}: {}/{} calls in window",
                command, current_count, policy.max_calls
            );
            return Ok(RateLimitCheck {
                allowed: false,
                command: command.to_string(),
                max_calls: policy.max_calls,
                current_count,
                retry_after_ms: Some(retry_after_ms),
            });
        }

        if record {
            let entries = state.entry(command.to_string()).or_default();
            entries.push(now);
            if entries.len() > self.config.max_entries_per_command {
                let excess = entries.len() - self.config.max_entries_per_command;
                entries.drain(..excess);
            }
            self.store.save(&state).await?;
        }

        debug!(
            "Rate limit allowed {}: {}/{} calls in window",
            command, current_count, policy.max_calls
        );
        Ok(RateLimitCheck {
            allowed: true,
            command: command.to_string(),
            max_calls: policy.max_calls,
            current_count,
            retry_after_ms: None,
        })
    }

    /// Enforce the rate limit for a command
    ///
    /// Runs a recording check. When blocked, emits a best-effort security
    /// violation audit event and fails with
    /// [`ResilienceError::RateLimitExceeded`]; when allowed, returns the
    /// check record.
    pub async fn enforce(&self, command: &str) -> ResilienceResult<RateLimitCheck> {
        self.enforce_with_context(command, Value::Null).await
    }

    /// Enforce with extra context merged into the audit event details
    pub async fn enforce_with_context(
        &self,
        command: &str,
        context: Value,
    ) -> ResilienceResult<RateLimitCheck> {
        let check = self.check(command).await?;
        if check.allowed {
            return Ok(check);
        }

        let mut details = json!({
            "command": check.command,
            "current_count": check.current_count,
            "max_calls": check.max_calls,
            "retry_after_ms": check.retry_after_ms,
        });
        match context {
            Value::Null => {}
            Value::Object(extra) => {
                if let Some(map) = details.as_object_mut() {
                    for (key, value) in extra {
                        map.insert(key, value);
                    }
                }
            }
            other => {
                details["context"] = other;
            }
        }
        self.audit
            .security_violation(AuditEvent::new(AuditEventKind::RateLimitExceeded, details));

        Err(ResilienceError::RateLimitExceeded {
            command: check.command,
            current_count: check.current_count,
            max_calls: check.max_calls,
            retry_after_ms: check.retry_after_ms.unwrap_or(1),
        })
    }

    /// Usage snapshot for every known command, sorted by name
    ///
    /// Covers all configured commands plus any command with recorded state;
    /// unconfigured commands report against the default policy. Never mutates
    /// state.
    pub async fn status(&self) -> ResilienceResult<Vec<CommandUsage>> {
        let now = current_time_ms();
        let state = self.load_state(now).await;

        let mut commands: Vec<String> = self.config.policies.keys().cloned().collect();
        for command in state.keys() {
            if !self.config.policies.contains_key(command) {
                commands.push(command.clone());
            }
        }
        commands.sort();

        let mut usage = Vec::with_capacity(commands.len());
        for command in commands {
            let policy = self.policy_for(&command);
            let window_start = now.saturating_sub(policy.window_ms);
            let in_window: Vec<u64> = state
                .get(&command)
                .map(|timestamps| {
                    timestamps.iter().copied().filter(|&ts| ts >= window_start).collect()
                })
                .unwrap_or_default();
            let used = in_window.len() as u32;
            let reset_at_ms = in_window
                .iter()
                .copied()
                .min()
                .map(|oldest| oldest + policy.window_ms)
                .unwrap_or(now);

            usage.push(CommandUsage {
                max_calls: policy.max_calls,
                used,
                remaining: policy.max_calls.saturating_sub(used),
                window_ms: policy.window_ms,
                reset_at_ms,
                command,
            });
        }
        Ok(usage)
    }

    /// Clear recorded calls
    ///
    /// Resetting bypasses abuse protection, so `force` must be set explicitly;
    /// without it the call fails and state is untouched. A named command
    /// clears only that entry, `None` clears everything. The cleared state is
    /// persisted immediately and the reset is audited.
    pub async fn reset(&self, command: Option<&str>, force: bool) -> ResilienceResult<()> {
        if !force {
            return Err(ResilienceError::ValidationError(
                "Rate limit reset requires the force flag; refusing to clear counters".to_string(),
            ));
        }

        let now = current_time_ms();
        let mut state = self.load_state(now).await;
        match command {
            Some(name) => {
                state.remove(name);
                info!("Rate limit state cleared for command {}", name);
            }
            None => {
                state.clear();
                info!("Rate limit state cleared for all commands");
            }
        }
        self.store.save(&state).await?;

        self.audit.audit(AuditEvent::new(
            AuditEventKind::RateLimitReset,
            json!({
                "command": command,
                "scope": if command.is_some() { "single" } else { "all" },
            }),
        ));
        Ok(())
    }

    /// Purge aged entries from the persisted state
    pub async fn cleanup(&self) -> ResilienceResult<()> {
        let state = self.load_state(current_time_ms()).await;
        self.store.save(&state).await?;
        debug!("Cleaned rate limit state, {} commands retained", state.len());
        Ok(())
    }

    /// Load state, degrading to empty on store failure, with cleanup applied
    async fn load_state(&self, now: u64) -> RateLimitState {
        let state = match self.store.load().await {
            Ok(state) => state,
            Err(e) => {
                warn!("Failed to load rate limit state, treating as empty: {}", e);
                RateLimitState::new()
            }
        };
        cleanup_old_entries(
            &state,
            now,
            self.config.cleanup_age_ms,
            self.config.max_entries_per_command,
        )
    }
}
