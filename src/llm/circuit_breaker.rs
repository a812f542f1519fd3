//! Circuit Breaker for Provider Resilience
//!
//! Prevents cascading failures when a completion provider is degraded.
//! Failures are timestamped into a rolling log; only failures inside the
//! monitor window count toward the threshold.
//!
//! ## States
//!
//! - **Closed**: normal operation, requests flow through
//! - **Open**: provider is failing, requests rejected without a network call
//! - **HalfOpen**: reset timeout elapsed, exactly one trial call permitted
//!
//! ## Transitions
//!
//! ```text
//! Closed --[failure_threshold within monitor_window]--> Open
//! Open --[reset_timeout elapsed]--> HalfOpen (one trial granted)
//! HalfOpen --[success]--> Closed (failure log cleared)
//! HalfOpen --[failure]--> Open (fresh opened_at)
//! ```
//!
//! The breaker knows nothing about retries or which provider it guards; it
//! exposes only `allow_request`, `record_success`, and `record_failure`.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::constants::circuit_breaker as cb_constants;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - requests flow through
    Closed,
    /// Provider is failing - requests rejected immediately
    Open,
    /// Testing recovery - one trial request allowed
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Failures within the monitor window before the circuit opens
    pub failure_threshold: usize,
    /// Duration to wait in open state before permitting a trial call
    pub reset_timeout: Duration,
    /// Rolling window over which failures are counted
    pub monitor_window: Duration,
}

impl BreakerConfig {
    /// Policy for the primary provider: 5 failures / 60 s window, open 30 s.
    pub fn primary() -> Self {
        Self {
            failure_threshold: cb_constants::PRIMARY_FAILURE_THRESHOLD,
            reset_timeout: Duration::from_secs(cb_constants::PRIMARY_RESET_TIMEOUT_SECS),
            monitor_window: Duration::from_secs(cb_constants::MONITOR_WINDOW_SECS),
        }
    }

    /// Policy for the fallback provider: 3 failures / 60 s window, open 45 s.
    /// Stricter and slower to retry, reflecting lower trust in a last resort.
    pub fn fallback() -> Self {
        Self {
            failure_threshold: cb_constants::FALLBACK_FAILURE_THRESHOLD,
            reset_timeout: Duration::from_secs(cb_constants::FALLBACK_RESET_TIMEOUT_SECS),
            monitor_window: Duration::from_secs(cb_constants::MONITOR_WINDOW_SECS),
        }
    }
}

/// Unified internal state - all mutable state in a single struct
/// to ensure atomicity of state transitions
#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    /// Timestamps of recent failures, pruned to the monitor window
    failures: Vec<Instant>,
    opened_at: Option<Instant>,
    /// Whether the single half-open trial slot has been handed out
    trial_in_flight: bool,
    blocked_count: u64,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: Vec::new(),
            opened_at: None,
            trial_in_flight: false,
            blocked_count: 0,
        }
    }

    fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.failures.clear();
        self.opened_at = None;
        self.trial_in_flight = false;
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        self.failures
            .retain(|failed_at| now.duration_since(*failed_at) < window);
    }
}

/// Thread-safe circuit breaker shared by every request routed to one
/// provider within this process.
///
/// All state lives behind a single RwLock so failure counts and state
/// transitions stay consistent. Breaker state is intentionally per-process:
/// horizontally scaled instances each isolate faults independently.
pub struct CircuitBreaker {
    config: BreakerConfig,
    provider_name: String,
    inner: RwLock<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker guarding one provider
    pub fn new(provider_name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            config,
            provider_name: provider_name.into(),
            inner: RwLock::new(BreakerInner::new()),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .state
    }

    /// Check if a request may proceed right now.
    ///
    /// Returns `true` if the call can go out. An open circuit whose reset
    /// timeout has elapsed transitions to half-open and grants exactly one
    /// trial; concurrent callers racing that slot are denied.
    pub fn allow_request(&self) -> bool {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|opened| opened.elapsed())
                    .unwrap_or(Duration::ZERO);

                if elapsed > self.config.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    tracing::info!(
                        provider = %self.provider_name,
                        "Circuit entering HALF_OPEN state, permitting trial call"
                    );
                    true
                } else {
                    inner.blocked_count += 1;
                    tracing::debug!(
                        provider = %self.provider_name,
                        "Request blocked (circuit OPEN)"
                    );
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    inner.blocked_count += 1;
                    tracing::debug!(
                        provider = %self.provider_name,
                        "Request blocked (trial already in flight)"
                    );
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record a successful request.
    ///
    /// A success while half-open means the provider recovered: the failure
    /// log is cleared and the circuit closes.
    pub fn record_success(&self) {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if inner.state == CircuitState::HalfOpen {
            tracing::info!(provider = %self.provider_name, "Circuit recovered, closing");
            inner.reset();
        }
    }

    /// Record a failed request.
    pub fn record_failure(&self) {
        let now = Instant::now();
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match inner.state {
            CircuitState::HalfOpen => {
                // Trial call failed; back to open with a fresh timer
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                inner.trial_in_flight = false;
                inner.failures.clear();
                tracing::warn!(
                    provider = %self.provider_name,
                    "Circuit re-OPENED after failed trial call"
                );
            }
            CircuitState::Closed => {
                inner.failures.push(now);
                inner.prune(now, self.config.monitor_window);

                if inner.failures.len() >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                    tracing::warn!(
                        provider = %self.provider_name,
                        failures = inner.failures.len(),
                        reset_timeout = ?self.config.reset_timeout,
                        "Circuit OPENED"
                    );
                }
            }
            CircuitState::Open => {
                // Already open; nothing to record
            }
        }
    }

    /// Snapshot for monitoring
    pub fn stats(&self) -> BreakerStats {
        let inner = self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        BreakerStats {
            provider_name: self.provider_name.clone(),
            state: inner.state,
            recent_failures: inner.failures.len(),
            blocked_count: inner.blocked_count,
            open_for: inner.opened_at.map(|t| t.elapsed()),
        }
    }
}

/// Monitoring snapshot of one breaker
#[derive(Debug, Clone)]
pub struct BreakerStats {
    pub provider_name: String,
    pub state: CircuitState,
    pub recent_failures: usize,
    pub blocked_count: u64,
    pub open_for: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(threshold: usize, reset_ms: u64) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: threshold,
            reset_timeout: Duration::from_millis(reset_ms),
            monitor_window: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_initial_state_is_closed() {
        let cb = CircuitBreaker::new("test", BreakerConfig::primary());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());
    }

    #[test]
    fn test_stays_closed_below_threshold() {
        let cb = CircuitBreaker::new("test", test_config(3, 1000));

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());
    }

    #[test]
    fn test_opens_at_exact_threshold() {
        let cb = CircuitBreaker::new("test", test_config(3, 1000));

        cb.record_failure();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_failures_outside_window_are_pruned() {
        let config = BreakerConfig {
            failure_threshold: 2,
            reset_timeout: Duration::from_secs(1),
            monitor_window: Duration::from_millis(20),
        };
        let cb = CircuitBreaker::new("test", config);

        cb.record_failure();
        std::thread::sleep(Duration::from_millis(30));
        // First failure aged out; this one counts alone
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_permits_exactly_one_trial() {
        let cb = CircuitBreaker::new("test", test_config(1, 5));

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(15));

        assert!(cb.allow_request());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        // Trial slot is taken; further callers are denied
        assert!(!cb.allow_request());
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_trial_success_resets_failure_log() {
        let cb = CircuitBreaker::new("test", test_config(2, 5));

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(15));
        assert!(cb.allow_request());
        cb.record_success();

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().recent_failures, 0);
        assert!(cb.allow_request());
    }

    #[test]
    fn test_trial_failure_reopens() {
        let cb = CircuitBreaker::new("test", test_config(1, 5));

        cb.record_failure();
        std::thread::sleep(Duration::from_millis(15));
        assert!(cb.allow_request());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_success_while_closed_keeps_state() {
        let cb = CircuitBreaker::new("test", test_config(3, 1000));

        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_blocked_count() {
        let cb = CircuitBreaker::new("test", test_config(1, 10_000));

        cb.record_failure();
        assert!(!cb.allow_request());
        assert!(!cb.allow_request());
        assert!(!cb.allow_request());

        assert_eq!(cb.stats().blocked_count, 3);
    }
}
