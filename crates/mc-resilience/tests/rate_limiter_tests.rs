use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;

use mc_resilience::audit::{AuditEvent, AuditEventKind, AuditSink, NullAuditSink};
use mc_resilience::error::ResilienceError;
use mc_resilience::resilience::rate_limiter::{
    RateLimitConfig, RateLimitPolicy, RateLimiter,
};
use mc_resilience::state_store::{
    FileStateStore, InMemoryStateStore, RateLimitState, RateLimitStateStore,
};

// Implement our own test tracing initialization
fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("mc_resilience=debug".parse().unwrap()),
        )
        .with_test_writer()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Audit sink that records events for assertions
#[derive(Default)]
struct RecordingAuditSink {
    violations: Mutex<Vec<AuditEvent>>,
    audits: Mutex<Vec<AuditEvent>>,
}

impl AuditSink for RecordingAuditSink {
    fn security_violation(&self, event: AuditEvent) {
        self.violations.lock().unwrap().push(event);
    }

    fn audit(&self, event: AuditEvent) {
        self.audits.lock().unwrap().push(event);
    }
}

/// State store whose saves always fail
struct FailingSaveStore;

#[async_trait::async_trait]
impl RateLimitStateStore for FailingSaveStore {
    async fn load(&self) -> Result<RateLimitState, ResilienceError> {
        Ok(RateLimitState::new())
    }

    async fn save(&self, _state: &RateLimitState) -> Result<(), ResilienceError> {
        Err(ResilienceError::StateStoreError("disk full".to_string()))
    }
}

/// State store whose loads always fail but records saves
#[derive(Default)]
struct FailingLoadStore {
    saved: Mutex<Option<RateLimitState>>,
}

#[async_trait::async_trait]
impl RateLimitStateStore for FailingLoadStore {
    async fn load(&self) -> Result<RateLimitState, ResilienceError> {
        Err(ResilienceError::StateStoreError("corrupted".to_string()))
    }

    async fn save(&self, state: &RateLimitState) -> Result<(), ResilienceError> {
        *self.saved.lock().unwrap() = Some(state.clone());
        Ok(())
    }
}

fn config_with_policy(command: &str, max_calls: u32, window_ms: u64) -> RateLimitConfig {
    let mut config = RateLimitConfig::default();
    config
        .policies
        .insert(command.to_string(), RateLimitPolicy::new(max_calls, window_ms));
    config
}

fn limiter_with(config: RateLimitConfig, store: Arc<InMemoryStateStore>) -> RateLimiter {
    RateLimiter::new(config, store, Arc::new(NullAuditSink)).unwrap()
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// Test the sliding window allowing up to the limit and then blocking
#[tokio::test]
async fn test_sliding_window_allows_then_blocks() {
    init_test_tracing();

    let store = Arc::new(InMemoryStateStore::new());
    let limiter = limiter_with(config_with_policy("deploy", 3, 60_000), store.clone());

    // First three calls are allowed, with counts taken before recording
    for expected in 0..3 {
        let check = limiter.check("deploy").await.unwrap();
        assert!(check.allowed);
        assert_eq!(check.current_count, expected);
        assert_eq!(check.max_calls, 3);
        assert!(check.retry_after_ms.is_none());
    }

    // The fourth call inside the window is blocked
    let check = limiter.check("deploy").await.unwrap();
    assert!(!check.allowed);
    assert_eq!(check.current_count, 3);
    let retry = check.retry_after_secs().unwrap();
    assert!(retry >= 1 && retry <= 60);

    // The blocked call was not recorded
    let state = store.load().await.unwrap();
    assert_eq!(state.get("deploy").map(|t| t.len()), Some(3));
}

/// Test that entries outside the window no longer count
#[tokio::test]
async fn test_window_expiry_restores_allowance() {
    let store = Arc::new(InMemoryStateStore::new());
    let now = now_ms();

    // Two calls long expired, one still inside the window
    let mut state = RateLimitState::new();
    state.insert(
        "deploy".to_string(),
        vec![now - 120_000, now - 90_000, now - 10_000],
    );
    store.save(&state).await.unwrap();

    let limiter = limiter_with(config_with_policy("deploy", 2, 60_000), store);

    let check = limiter.peek("deploy").await.unwrap();
    assert!(check.allowed);
    assert_eq!(check.current_count, 1);

    // A recording check still fits under the limit
    let check = limiter.check("deploy").await.unwrap();
    assert!(check.allowed);
}

/// Test that peek never records a call or touches the store
#[tokio::test]
async fn test_peek_never_mutates() {
    let store = Arc::new(InMemoryStateStore::new());
    let limiter = limiter_with(config_with_policy("status", 1, 60_000), store.clone());

    for _ in 0..5 {
        let check = limiter.peek("status").await.unwrap();
        assert!(check.allowed);
        assert_eq!(check.current_count, 0);
    }
    assert!(store.load().await.unwrap().is_empty());

    // A blocked peek must not record anything either
    limiter.check("status").await.unwrap();
    let check = limiter.peek("status").await.unwrap();
    assert!(!check.allowed);
    assert!(check.retry_after_ms.is_some());

    let state = store.load().await.unwrap();
    assert_eq!(state.get("status").map(|t| t.len()), Some(1));
}

/// Test that resets require the force flag
#[tokio::test]
async fn test_reset_requires_force() {
    let store = Arc::new(InMemoryStateStore::new());
    let limiter = limiter_with(config_with_policy("deploy", 5, 60_000), store);

    limiter.check("deploy").await.unwrap();

    let err = limiter.reset(Some("deploy"), false).await.unwrap_err();
    assert!(matches!(err, ResilienceError::ValidationError(_)));
    assert!(err.to_string().contains("force"));
    assert_eq!(err.exit_code(), 64);

    // State is untouched after the refused reset
    let check = limiter.peek("deploy").await.unwrap();
    assert_eq!(check.current_count, 1);

    // A forced reset clears the command
    limiter.reset(Some("deploy"), true).await.unwrap();
    let check = limiter.peek("deploy").await.unwrap();
    assert_eq!(check.current_count, 0);
}

/// Test clearing one command versus all commands
#[tokio::test]
async fn test_reset_scopes() {
    let audit = Arc::new(RecordingAuditSink::default());
    let store = Arc::new(InMemoryStateStore::new());
    let mut config = config_with_policy("deploy", 5, 60_000);
    config
        .policies
        .insert("backup".to_string(), RateLimitPolicy::new(5, 60_000));
    let limiter = RateLimiter::new(config, store.clone(), audit.clone()).unwrap();

    limiter.check("deploy").await.unwrap();
    limiter.check("backup").await.unwrap();

    // Clearing one command leaves the other alone
    limiter.reset(Some("deploy"), true).await.unwrap();
    assert_eq!(limiter.peek("deploy").await.unwrap().current_count, 0);
    assert_eq!(limiter.peek("backup").await.unwrap().current_count, 1);

    // Clearing everything empties the store
    limiter.reset(None, true).await.unwrap();
    assert!(store.load().await.unwrap().is_empty());

    // Both resets were audited as routine events, not violations
    assert_eq!(audit.audits.lock().unwrap().len(), 2);
    assert!(audit.violations.lock().unwrap().is_empty());
}

/// Test the usage snapshot across configured and unconfigured commands
#[tokio::test]
async fn test_status_reports_usage_without_mutating() {
    let store = Arc::new(InMemoryStateStore::new());
    let mut config = config_with_policy("deploy", 3, 60_000);
    config
        .policies
        .insert("backup".to_string(), RateLimitPolicy::new(10, 120_000));
    let limiter = limiter_with(config, store.clone());

    let before = now_ms();
    limiter.check("deploy").await.unwrap();
    limiter.check("deploy").await.unwrap();

    let usage = limiter.status().await.unwrap();
    assert_eq!(usage.len(), 2);

    // Sorted by command name
    assert_eq!(usage[0].command, "backup");
    assert_eq!(usage[0].used, 0);
    assert_eq!(usage[0].remaining, 10);
    assert_eq!(usage[0].window_ms, 120_000);

    assert_eq!(usage[1].command, "deploy");
    assert_eq!(usage[1].used, 2);
    assert_eq!(usage[1].remaining, 1);
    assert!(usage[1].reset_at_ms > before);

    // An unconfigured command with recorded calls shows under the default policy
    limiter.check("migrate").await.unwrap();
    let usage = limiter.status().await.unwrap();
    let row = usage.iter().find(|u| u.command == "migrate").unwrap();
    assert_eq!(row.max_calls, 100);
    assert_eq!(row.used, 1);

    // Status itself never records anything
    let state = store.load().await.unwrap();
    assert_eq!(state.get("deploy").map(|t| t.len()), Some(2));
}

/// Test that blocking produces a typed error and an audit event
#[tokio::test]
async fn test_enforce_blocks_with_audit_and_typed_error() {
    let audit = Arc::new(RecordingAuditSink::default());
    let store = Arc::new(InMemoryStateStore::new());
    let config = config_with_policy("ssl-renew", 1, 60_000);
    let limiter = RateLimiter::new(config, store, audit.clone()).unwrap();

    limiter.enforce("ssl-renew").await.unwrap();

    let err = limiter.enforce("ssl-renew").await.unwrap_err();
    match &err {
        ResilienceError::RateLimitExceeded {
            command,
            current_count,
            max_calls,
            retry_after_ms,
        } => {
            assert_eq!(command, "ssl-renew");
            assert_eq!(*current_count, 1);
            assert_eq!(*max_calls, 1);
            assert!(*retry_after_ms > 0);
        }
        other => panic!("Unexpected error: {:?}", other),
    }
    assert!(err.is_rate_limit_error());
    assert_eq!(err.exit_code(), 75);

    // The machine-readable payload carries the same fields
    let payload = err.to_json();
    assert_eq!(payload["error"], "ERR_RATE_LIMIT_EXCEEDED");
    assert_eq!(payload["command"], "ssl-renew");

    // Exactly one security violation was emitted
    let violations = audit.violations.lock().unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].kind, AuditEventKind::RateLimitExceeded);
    assert_eq!(violations[0].details["command"], "ssl-renew");
    assert_eq!(violations[0].details["max_calls"], 1);
}

/// Test context merging into the audit details
#[tokio::test]
async fn test_enforce_merges_context_into_audit_details() {
    let audit = Arc::new(RecordingAuditSink::default());
    let store = Arc::new(InMemoryStateStore::new());
    let limiter =
        RateLimiter::new(config_with_policy("deploy", 1, 60_000), store, audit.clone()).unwrap();

    limiter.enforce("deploy").await.unwrap();
    let err = limiter
        .enforce_with_context("deploy", serde_json::json!({ "service": "core" }))
        .await
        .unwrap_err();
    assert!(err.is_rate_limit_error());

    let violations = audit.violations.lock().unwrap();
    assert_eq!(violations[0].details["service"], "core");
    assert_eq!(violations[0].details["command"], "deploy");
}

/// Test that per-command entry lists stay capped
#[tokio::test]
async fn test_entries_per_command_stay_capped() {
    let store = Arc::new(InMemoryStateStore::new());
    let mut config = config_with_policy("logs", 100, 60_000);
    config.max_entries_per_command = 5;
    let limiter = limiter_with(config, store.clone());

    for _ in 0..8 {
        let check = limiter.check("logs").await.unwrap();
        assert!(check.allowed);
    }

    let state = store.load().await.unwrap();
    assert_eq!(state.get("logs").map(|t| t.len()), Some(5));
}

/// Test that load failures degrade to an empty state instead of blocking
#[tokio::test]
async fn test_load_failures_degrade_to_empty_state() {
    init_test_tracing();

    let store = Arc::new(FailingLoadStore::default());
    let limiter =
        RateLimiter::new(RateLimitConfig::default(), store.clone(), Arc::new(NullAuditSink))
            .unwrap();

    let check = limiter.check("deploy").await.unwrap();
    assert!(check.allowed);
    assert_eq!(check.current_count, 0);

    // The recorded call was still persisted through save
    let saved = store.saved.lock().unwrap().clone().unwrap();
    assert_eq!(saved.get("deploy").map(|t| t.len()), Some(1));
}

/// Test that save failures surface from recording checks
#[tokio::test]
async fn test_save_failures_surface_from_recording_checks() {
    let limiter = RateLimiter::new(
        RateLimitConfig::default(),
        Arc::new(FailingSaveStore),
        Arc::new(NullAuditSink),
    )
    .unwrap();

    let err = limiter.check("deploy").await.unwrap_err();
    assert!(matches!(err, ResilienceError::StateStoreError(_)));
    assert_eq!(err.exit_code(), 74);

    // Read-only checks never hit save and still succeed
    assert!(limiter.peek("deploy").await.unwrap().allowed);
}

/// Test that an empty command name is rejected
#[tokio::test]
async fn test_empty_command_name_is_rejected() {
    let limiter = limiter_with(
        RateLimitConfig::default(),
        Arc::new(InMemoryStateStore::new()),
    );

    let err = limiter.check("").await.unwrap_err();
    assert!(matches!(err, ResilienceError::ValidationError(_)));
}

/// Test missing and corrupt state files loading as empty
#[tokio::test]
async fn test_file_store_missing_and_corrupt_files_read_as_empty() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rate-limits.json");
    let store = FileStateStore::new(&path);

    // Missing file loads as empty
    assert!(store.load().await.unwrap().is_empty());

    // Corrupt file loads as empty instead of failing
    tokio::fs::write(&path, b"{ not json").await.unwrap();
    assert!(store.load().await.unwrap().is_empty());

    // A save replaces the corrupt content and round-trips
    let mut state = RateLimitState::new();
    state.insert("deploy".to_string(), vec![1, 2, 3]);
    store.save(&state).await.unwrap();
    assert_eq!(store.load().await.unwrap(), state);
}

/// Test that recorded limits survive process restarts
#[tokio::test]
async fn test_limits_survive_limiter_restarts() {
    let dir = tempfile::tempdir().unwrap();
    // Nested path exercises parent directory creation on save
    let path = dir.path().join("state").join("rate-limits.json");
    let config = config_with_policy("deploy", 2, 60_000);

    {
        let store = Arc::new(FileStateStore::new(&path));
        let limiter =
            RateLimiter::new(config.clone(), store, Arc::new(NullAuditSink)).unwrap();
        limiter.check("deploy").await.unwrap();
        limiter.check("deploy").await.unwrap();
    }

    // A fresh limiter over the same file sees the recorded calls
    let store = Arc::new(FileStateStore::new(&path));
    let limiter = RateLimiter::new(config, store, Arc::new(NullAuditSink)).unwrap();
    let check = limiter.check("deploy").await.unwrap();
    assert!(!check.allowed);
    assert_eq!(check.current_count, 2);
}
