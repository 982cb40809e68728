use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time;

use mc_resilience::audit::{AuditEvent, AuditSink, NullAuditSink};
use mc_resilience::config::ResilienceConfig;
use mc_resilience::error::ResilienceError;
use mc_resilience::resilience::circuit_breaker::{CircuitBreakerConfig, CircuitState};
use mc_resilience::resilience::rate_limiter::RateLimitPolicy;
use mc_resilience::resilience::ResilienceLayer;
use mc_resilience::state_store::{FileStateStore, InMemoryStateStore, RateLimitStateStore};

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

/// Test a command quota running out against a file-backed store
#[tokio::test]
async fn test_command_quota_runs_out_and_persists() {
    init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStateStore::new(dir.path().join("rate-limits.json")));
    let audit = Arc::new(RecordingAuditSink::default());

    let mut config = ResilienceConfig::default();
    config
        .rate_limit
        .policies
        .insert("config-audit".to_string(), RateLimitPolicy::new(10, 60_000));
    let layer = ResilienceLayer::new(config, store.clone(), audit.clone()).unwrap();

    // The full quota goes through
    for _ in 0..10 {
        layer.rate_limiter().enforce("config-audit").await.unwrap();
    }

    // The eleventh call is rejected with the usage baked into the error
    let err = layer
        .rate_limiter()
        .enforce("config-audit")
        .await
        .unwrap_err();
    match &err {
        ResilienceError::RateLimitExceeded {
            command,
            current_count,
            max_calls,
            ..
        } => {
            assert_eq!(command, "config-audit");
            assert_eq!(*current_count, 10);
            assert_eq!(*max_calls, 10);
        }
        other => panic!("Unexpected error: {:?}", other),
    }
    let secs = err.retry_after_secs().unwrap();
    assert!((1..=60).contains(&secs));

    // Only the ten allowed calls were recorded on disk
    let state = store.load().await.unwrap();
    assert_eq!(state["config-audit"].len(), 10);

    let violations = audit.violations.lock().unwrap();
    assert_eq!(violations.len(), 1);
}

/// Test a failing service opening its circuit and recovering end to end
#[tokio::test]
async fn test_failing_service_opens_and_recovers() {
    init_test_tracing();

    let layer = ResilienceLayer::new(
        ResilienceConfig::default(),
        Arc::new(InMemoryStateStore::new()),
        Arc::new(NullAuditSink),
    )
    .unwrap();

    let config = CircuitBreakerConfig {
        failure_threshold: 3,
        reset_timeout_ms: 1_000,
        success_threshold: 2,
        ..CircuitBreakerConfig::default()
    };

    // Three straight failures open the circuit
    for _ in 0..3 {
        let result: Result<&str, ResilienceError> = layer
            .circuits()
            .execute_with_config("service-core", config.clone(), || async {
                Err(ResilienceError::InternalError(
                    "connection refused".to_string(),
                ))
            })
            .await;
        assert!(result.is_err());
    }
    let breaker = layer.circuits().circuit("service-core").unwrap();
    assert_eq!(breaker.state().await, CircuitState::Open);

    // While open, calls fail fast without reaching the service
    let result: Result<&str, ResilienceError> = layer
        .circuits()
        .execute("service-core", || async {
            panic!("This should not be called if the circuit is open");
            #[allow(unreachable_code)]
            Ok("pong")
        })
        .await;
    assert!(matches!(
        result.unwrap_err(),
        ResilienceError::CircuitBreakerOpen { .. }
    ));

    // After the reset timeout the circuit probes for recovery
    time::sleep(Duration::from_millis(1_200)).await;
    assert_eq!(breaker.state().await, CircuitState::HalfOpen);

    let probed = Arc::new(AtomicBool::new(false));
    let flag = probed.clone();
    let result: Result<&str, anyhow::Error> = layer
        .circuits()
        .execute("service-core", || async move {
            flag.store(true, Ordering::SeqCst);
            Ok("pong")
        })
        .await;
    assert_eq!(result.unwrap(), "pong");
    assert!(probed.load(Ordering::SeqCst));
    assert_eq!(breaker.state().await, CircuitState::HalfOpen);

    // The second probe success closes the circuit again
    let result: Result<&str, ResilienceError> = layer
        .circuits()
        .execute("service-core", || async { Ok("pong") })
        .await;
    assert!(result.is_ok());
    assert_eq!(breaker.state().await, CircuitState::Closed);
}

/// Test the layer enforcing the rate limit before the circuit sees the call
#[tokio::test]
async fn test_layer_guards_command_and_circuit_together() {
    init_test_tracing();

    let audit = Arc::new(RecordingAuditSink::default());
    let mut config = ResilienceConfig::default();
    config
        .rate_limit
        .policies
        .insert("deploy".to_string(), RateLimitPolicy::new(2, 60_000));
    let layer =
        ResilienceLayer::new(config, Arc::new(InMemoryStateStore::new()), audit.clone()).unwrap();

    for _ in 0..2 {
        let result: Result<&str, ResilienceError> = layer
            .execute("deploy", "core-api", || async { Ok("deployed") })
            .await;
        assert_eq!(result.unwrap(), "deployed");
    }

    // The third call trips the rate limit; the operation must not run
    let result: Result<&str, ResilienceError> = layer
        .execute("deploy", "core-api", || async {
            panic!("This should not be called when the command is rate limited");
            #[allow(unreachable_code)]
            Ok("deployed")
        })
        .await;
    let err = result.unwrap_err();
    assert!(err.is_rate_limit_error());
    assert!(err.is_policy_rejection());
    assert_eq!(err.exit_code(), 75);

    // The circuit only ever saw the two allowed calls
    let breaker = layer.circuits().circuit("core-api").unwrap();
    assert_eq!(breaker.stats().await.total_calls, 2);

    // The violation carries the hashed client identity
    let violations = audit.violations.lock().unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].client_id.len(), 16);
    assert!(violations[0]
        .client_id
        .chars()
        .all(|c| c.is_ascii_hexdigit()));
}
