//! Circuit Breaker for Provider Resilience
//!
//! Stops traffic to a provider after sustained failures and lets a single
//! probe through once the recovery timeout has elapsed.
//!
//! ```text
//! Closed   --[failure_threshold consecutive failures]--> Open
//! Open     --[recovery_timeout elapsed]--------------> HalfOpen
//! HalfOpen --[probe success]-------------------------> Closed
//! HalfOpen --[probe failure]-------------------------> Open (timer restarts)
//! ```

use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::constants::circuit_breaker as cb_constants;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Rejecting immediately
    Open,
    /// Probing for recovery
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
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// Time spent open before a probe is allowed
    #[serde(with = "duration_secs", rename = "recovery_timeout_secs")]
    pub recovery_timeout: Duration,
    /// Concurrent probes allowed while half-open
    pub half_open_max_requests: u32,
    /// Probe successes needed to close
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: cb_constants::FAILURE_THRESHOLD,
            recovery_timeout: Duration::from_secs(cb_constants::RECOVERY_TIMEOUT_SECS),
            half_open_max_requests: cb_constants::HALF_OPEN_MAX_REQUESTS,
            success_threshold: cb_constants::SUCCESS_THRESHOLD,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            ..Default::default()
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// All mutable state behind one lock so counts and state move together
#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    probe_successes: u32,
    probes_in_flight: u32,
    opened_at: Option<Instant>,
    times_opened: u64,
    rejected: u64,
}

impl BreakerInner {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            probe_successes: 0,
            probes_in_flight: 0,
            opened_at: None,
            times_opened: 0,
            rejected: 0,
        }
    }

    fn trip(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.probes_in_flight = 0;
        self.probe_successes = 0;
        self.times_opened += 1;
    }

    /// Open -> HalfOpen once the cooldown has elapsed
    fn advance(&mut self, recovery_timeout: Duration) -> bool {
        let cooled_down = self.state == CircuitState::Open
            && self
                .opened_at
                .is_some_and(|opened| opened.elapsed() >= recovery_timeout);

        if cooled_down {
            self.state = CircuitState::HalfOpen;
            self.probes_in_flight = 0;
            self.probe_successes = 0;
        }
        cooled_down
    }
}

/// Thread-safe per-provider circuit breaker
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    provider: String,
    inner: RwLock<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(provider: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            provider: provider.into(),
            inner: RwLock::new(BreakerInner::closed()),
        }
    }

    pub fn with_defaults(provider: impl Into<String>) -> Self {
        Self::new(provider, CircuitBreakerConfig::default())
    }

    /// Current state, applying any pending cooldown transition
    pub fn state(&self) -> CircuitState {
        let mut inner = self.write();
        if inner.advance(self.config.recovery_timeout) {
            tracing::info!(provider = %self.provider, "Circuit breaker HALF_OPEN (testing recovery)");
        }
        inner.state
    }

    /// Gate one request. Half-open admits only the configured probe count.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.write();
        if inner.advance(self.config.recovery_timeout) {
            tracing::info!(provider = %self.provider, "Circuit breaker HALF_OPEN (testing recovery)");
        }

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                inner.rejected += 1;
                tracing::debug!(provider = %self.provider, "Request blocked (circuit OPEN)");
                false
            }
            CircuitState::HalfOpen => {
                if inner.probes_in_flight < self.config.half_open_max_requests {
                    inner.probes_in_flight += 1;
                    tracing::debug!(provider = %self.provider, "Allowing probe request");
                    true
                } else {
                    inner.rejected += 1;
                    tracing::debug!(provider = %self.provider, "Probe already in flight");
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.write();
        inner.consecutive_failures = 0;

        if inner.state == CircuitState::HalfOpen {
            inner.probe_successes += 1;
            inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);

            if inner.probe_successes >= self.config.success_threshold {
                inner.state = CircuitState::Closed;
                inner.probe_successes = 0;
                inner.probes_in_flight = 0;
                inner.opened_at = None;
                tracing::info!(provider = %self.provider, "Circuit breaker CLOSED (provider recovered)");
            }
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.write();

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.trip();
                    tracing::warn!(
                        provider = %self.provider,
                        failures = inner.consecutive_failures,
                        recovery_timeout = ?self.config.recovery_timeout,
                        "Circuit breaker OPEN"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.trip();
                tracing::warn!(provider = %self.provider, "Circuit breaker re-OPENED after failed probe");
            }
            // Late failures from requests admitted before the trip
            CircuitState::Open => {}
        }
    }

    /// Release a half-open probe slot without recording an outcome
    pub fn release_probe(&self) {
        let mut inner = self.write();
        if inner.state == CircuitState::HalfOpen {
            inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
        }
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        CircuitBreakerStats {
            provider: self.provider.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            times_opened: inner.times_opened,
            rejected: inner.rejected,
            open_for: inner.opened_at.map(|t| t.elapsed()),
        }
    }

    /// Force back to closed (manual intervention)
    pub fn reset(&self) {
        let mut inner = self.write();
        let times_opened = inner.times_opened;
        let rejected = inner.rejected;
        *inner = BreakerInner::closed();
        inner.times_opened = times_opened;
        inner.rejected = rejected;
        tracing::info!(provider = %self.provider, "Circuit breaker manually reset to CLOSED");
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BreakerInner> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Snapshot for monitoring
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub provider: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Closed/HalfOpen -> Open transitions so far
    pub times_opened: u64,
    pub rejected: u64,
    pub open_for: Option<Duration>,
}

impl CircuitBreakerStats {
    pub fn summary(&self) -> String {
        let open_for = self
            .open_for
            .map(|d| format!(" for {:.1}s", d.as_secs_f64()))
            .unwrap_or_default();

        format!(
            "[{}] {}{} | failures={} opened={} rejected={}",
            self.provider,
            self.state,
            open_for,
            self.consecutive_failures,
            self.times_opened,
            self.rejected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig::new(threshold, Duration::from_millis(5)),
        )
    }

    #[test]
    fn test_initial_state_is_closed() {
        let cb = CircuitBreaker::with_defaults("test");
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());
    }

    #[test]
    fn test_opens_exactly_once_after_threshold() {
        let cb = CircuitBreaker::new(
            "test",
            CircuitBreakerConfig::new(3, Duration::from_secs(60)),
        );

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        for _ in 0..5 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.stats().times_opened, 1);
        assert!(!cb.allow_request());
        assert!(!cb.allow_request());
        assert_eq!(cb.stats().rejected, 2);
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let cb = CircuitBreaker::new(
            "test",
            CircuitBreakerConfig::new(3, Duration::from_secs(60)),
        );

        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_allows_single_probe() {
        let cb = quick(1);
        cb.record_failure();
        assert!(!cb.allow_request());

        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.allow_request());
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_probe_success_closes() {
        let cb = quick(1);
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));

        assert!(cb.allow_request());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().consecutive_failures, 0);
        assert!(cb.allow_request());
    }

    #[test]
    fn test_probe_failure_reopens_and_restarts_timer() {
        let cb = CircuitBreaker::new(
            "test",
            CircuitBreakerConfig::new(1, Duration::from_millis(30)),
        );
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(40));

        assert!(cb.allow_request());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.stats().times_opened, 2);

        // Cooldown restarted at the probe failure
        assert!(!cb.allow_request());
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_release_probe_frees_slot() {
        let cb = quick(1);
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));

        assert!(cb.allow_request());
        cb.release_probe();
        assert!(cb.allow_request());
    }

    #[test]
    fn test_manual_reset() {
        let cb = quick(1);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());
        assert!(cb.stats().summary().contains("CLOSED"));
    }

    #[test]
    fn test_config_serde_uses_seconds() {
        let config: CircuitBreakerConfig =
            serde_json::from_str(r#"{"failure_threshold": 2, "recovery_timeout_secs": 15}"#)
                .unwrap();
        assert_eq!(config.failure_threshold, 2);
        assert_eq!(config.recovery_timeout, Duration::from_secs(15));
        assert_eq!(config.half_open_max_requests, 1);
    }
}
