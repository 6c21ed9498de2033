//! Usage Accounting
//!
//! Per-provider usage, cost and latency counters with alert thresholds.
//! Thread-safe for concurrent generations.
//!
//! ## Usage
//!
//! ```ignore
//! let usage = UsageTracker::new(AlertThresholds::default());
//! usage.record_success("openai", &tokens, 840);
//! let summary = usage.totals();
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::ai::provider::TokenUsage;
use crate::constants::alerts as alert_constants;

// =============================================================================
// Alert Thresholds
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    pub max_avg_latency_ms: u64,
    /// Failures / requests, 0.0 - 1.0
    pub max_error_rate: f64,
    pub max_total_cost_usd: f64,
    /// Requests before the error rate is evaluated
    pub min_samples: u64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_avg_latency_ms: alert_constants::MAX_AVG_LATENCY_MS,
            max_error_rate: alert_constants::MAX_ERROR_RATE,
            max_total_cost_usd: alert_constants::MAX_TOTAL_COST_USD,
            min_samples: alert_constants::MIN_SAMPLES_FOR_ERROR_RATE,
        }
    }
}

/// An active threshold breach
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    HighLatency { provider: String, avg_latency_ms: f64 },
    HighErrorRate { provider: String, error_rate: f64 },
    CostExceeded { total_cost_usd: f64 },
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HighLatency {
                provider,
                avg_latency_ms,
            } => write!(f, "{}: average latency {:.0}ms", provider, avg_latency_ms),
            Self::HighErrorRate {
                provider,
                error_rate,
            } => write!(f, "{}: error rate {:.1}%", provider, error_rate * 100.0),
            Self::CostExceeded { total_cost_usd } => {
                write!(f, "total spend ${:.4}", total_cost_usd)
            }
        }
    }
}

// =============================================================================
// Counters
// =============================================================================

#[derive(Default)]
struct ProviderCounters {
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    cache_hits: AtomicU64,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    /// Microdollars for atomic ops
    cost_micros: AtomicU64,
    /// Latency summed over provider calls (cache hits excluded)
    latency_ms: AtomicU64,
    latency_alerted: AtomicBool,
    error_rate_alerted: AtomicBool,
}

/// Usage summary for one provider or for all combined
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageSummary {
    pub provider: String,
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub cache_hits: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_cost_usd: f64,
    pub avg_latency_ms: f64,
    pub error_rate: f64,
}

impl UsageSummary {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Format summary for display
    pub fn display(&self) -> String {
        format!(
            "{}: {} requests ({} ok, {} failed, {} cached) | {} tokens | avg {:.0}ms | ${:.4}",
            self.provider,
            self.requests,
            self.successes,
            self.failures,
            self.cache_hits,
            self.total_tokens(),
            self.avg_latency_ms,
            self.total_cost_usd
        )
    }
}

fn to_micros(cost_usd: f64) -> u64 {
    if cost_usd.is_finite() && cost_usd > 0.0 {
        (cost_usd * 1_000_000.0).round() as u64
    } else {
        0
    }
}

// =============================================================================
// Usage Tracker
// =============================================================================

pub struct UsageTracker {
    thresholds: AlertThresholds,
    providers: DashMap<String, Arc<ProviderCounters>>,
    cost_alerted: AtomicBool,
}

pub type SharedUsage = Arc<UsageTracker>;

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new(AlertThresholds::default())
    }
}

impl UsageTracker {
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self {
            thresholds,
            providers: DashMap::new(),
            cost_alerted: AtomicBool::new(false),
        }
    }

    fn counters(&self, provider: &str) -> Arc<ProviderCounters> {
        if let Some(existing) = self.providers.get(provider) {
            return Arc::clone(existing.value());
        }
        Arc::clone(
            self.providers
                .entry(provider.to_string())
                .or_default()
                .value(),
        )
    }

    /// Record a successful provider call; `usage.cost_usd` must already be priced
    pub fn record_success(&self, provider: &str, usage: &TokenUsage, latency_ms: u64) {
        let c = self.counters(provider);
        c.requests.fetch_add(1, Ordering::Relaxed);
        c.successes.fetch_add(1, Ordering::Relaxed);
        c.prompt_tokens
            .fetch_add(u64::from(usage.prompt_tokens), Ordering::Relaxed);
        c.completion_tokens
            .fetch_add(u64::from(usage.completion_tokens), Ordering::Relaxed);
        c.cost_micros
            .fetch_add(to_micros(usage.cost_usd), Ordering::Relaxed);
        c.latency_ms.fetch_add(latency_ms, Ordering::Relaxed);

        self.check_thresholds(provider, &c);
    }

    pub fn record_failure(&self, provider: &str, latency_ms: u64) {
        let c = self.counters(provider);
        c.requests.fetch_add(1, Ordering::Relaxed);
        c.failures.fetch_add(1, Ordering::Relaxed);
        c.latency_ms.fetch_add(latency_ms, Ordering::Relaxed);

        self.check_thresholds(provider, &c);
    }

    /// A cache hit counts as a request with zero marginal cost
    pub fn record_cache_hit(&self, provider: &str) {
        let c = self.counters(provider);
        c.requests.fetch_add(1, Ordering::Relaxed);
        c.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    fn summarize(provider: &str, c: &ProviderCounters) -> UsageSummary {
        let requests = c.requests.load(Ordering::Relaxed);
        let successes = c.successes.load(Ordering::Relaxed);
        let failures = c.failures.load(Ordering::Relaxed);
        let cache_hits = c.cache_hits.load(Ordering::Relaxed);
        let calls = successes + failures;

        UsageSummary {
            provider: provider.to_string(),
            requests,
            successes,
            failures,
            cache_hits,
            prompt_tokens: c.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: c.completion_tokens.load(Ordering::Relaxed),
            total_cost_usd: c.cost_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            avg_latency_ms: if calls > 0 {
                c.latency_ms.load(Ordering::Relaxed) as f64 / calls as f64
            } else {
                0.0
            },
            error_rate: if calls > 0 {
                failures as f64 / calls as f64
            } else {
                0.0
            },
        }
    }

    pub fn provider_summary(&self, provider: &str) -> Option<UsageSummary> {
        self.providers
            .get(provider)
            .map(|c| Self::summarize(provider, c.value()))
    }

    /// Per-provider summaries sorted by name
    pub fn summaries(&self) -> Vec<UsageSummary> {
        let mut all: Vec<_> = self
            .providers
            .iter()
            .map(|entry| Self::summarize(entry.key(), entry.value()))
            .collect();
        all.sort_by(|a, b| a.provider.cmp(&b.provider));
        all
    }

    pub fn totals(&self) -> UsageSummary {
        let all = self.summaries();
        let mut total = UsageSummary {
            provider: "total".to_string(),
            ..Default::default()
        };
        let mut latency_sum = 0.0;

        for s in &all {
            total.requests += s.requests;
            total.successes += s.successes;
            total.failures += s.failures;
            total.cache_hits += s.cache_hits;
            total.prompt_tokens += s.prompt_tokens;
            total.completion_tokens += s.completion_tokens;
            total.total_cost_usd += s.total_cost_usd;
            latency_sum += s.avg_latency_ms * (s.successes + s.failures) as f64;
        }

        let calls = total.successes + total.failures;
        if calls > 0 {
            total.avg_latency_ms = latency_sum / calls as f64;
            total.error_rate = total.failures as f64 / calls as f64;
        }
        total
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.providers
            .iter()
            .map(|entry| entry.value().cost_micros.load(Ordering::Relaxed))
            .sum::<u64>() as f64
            / 1_000_000.0
    }

    /// Currently breached thresholds
    pub fn alerts(&self) -> Vec<Alert> {
        let mut alerts = Vec::new();
        for summary in self.summaries() {
            if self.latency_breached(&summary) {
                alerts.push(Alert::HighLatency {
                    provider: summary.provider.clone(),
                    avg_latency_ms: summary.avg_latency_ms,
                });
            }
            if self.error_rate_breached(&summary) {
                alerts.push(Alert::HighErrorRate {
                    provider: summary.provider.clone(),
                    error_rate: summary.error_rate,
                });
            }
        }

        let total_cost_usd = self.total_cost_usd();
        if total_cost_usd > self.thresholds.max_total_cost_usd {
            alerts.push(Alert::CostExceeded { total_cost_usd });
        }
        alerts
    }

    fn latency_breached(&self, s: &UsageSummary) -> bool {
        s.successes + s.failures > 0 && s.avg_latency_ms > self.thresholds.max_avg_latency_ms as f64
    }

    fn error_rate_breached(&self, s: &UsageSummary) -> bool {
        s.successes + s.failures >= self.thresholds.min_samples
            && s.error_rate > self.thresholds.max_error_rate
    }

    /// Warn once per crossing; the flag re-arms when the value drops back
    fn check_thresholds(&self, provider: &str, c: &ProviderCounters) {
        let summary = Self::summarize(provider, c);

        let slow = self.latency_breached(&summary);
        if slow != c.latency_alerted.swap(slow, Ordering::Relaxed) && slow {
            tracing::warn!(
                provider,
                avg_latency_ms = summary.avg_latency_ms,
                threshold_ms = self.thresholds.max_avg_latency_ms,
                "Provider latency above alert threshold"
            );
        }

        let failing = self.error_rate_breached(&summary);
        if failing != c.error_rate_alerted.swap(failing, Ordering::Relaxed) && failing {
            tracing::warn!(
                provider,
                error_rate = summary.error_rate,
                threshold = self.thresholds.max_error_rate,
                "Provider error rate above alert threshold"
            );
        }

        let total_cost_usd = self.total_cost_usd();
        let over_budget = total_cost_usd > self.thresholds.max_total_cost_usd;
        if over_budget != self.cost_alerted.swap(over_budget, Ordering::Relaxed) && over_budget {
            tracing::warn!(
                total_cost_usd,
                threshold_usd = self.thresholds.max_total_cost_usd,
                "Total AI spend above alert threshold"
            );
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_success_and_cache_hit() {
        let usage = UsageTracker::default();
        usage.record_success("a", &TokenUsage::new(100, 50).with_cost(0.0125), 500);
        usage.record_cache_hit("a");

        let summary = usage.provider_summary("a").unwrap();
        assert_eq!(summary.requests, 2);
        assert_eq!(summary.cache_hits, 1);
        assert_eq!(summary.total_tokens(), 150);
        assert!((summary.total_cost_usd - 0.0125).abs() < 1e-9);
        assert!((summary.avg_latency_ms - 500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_concurrent_recording() {
        use std::thread;

        let usage = Arc::new(UsageTracker::default());
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let u = Arc::clone(&usage);
                thread::spawn(move || {
                    for _ in 0..100 {
                        u.record_success("a", &TokenUsage::new(10, 5).with_cost(0.001), 50);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let totals = usage.totals();
        assert_eq!(totals.requests, 1000);
        assert_eq!(totals.prompt_tokens, 10_000);
        assert!((totals.total_cost_usd - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_error_rate_alert_requires_min_samples() {
        let usage = UsageTracker::new(AlertThresholds {
            max_error_rate: 0.5,
            min_samples: 4,
            ..Default::default()
        });

        usage.record_failure("a", 10);
        usage.record_failure("a", 10);
        assert!(usage.alerts().is_empty());

        usage.record_failure("a", 10);
        usage.record_success("a", &TokenUsage::new(1, 1), 10);
        assert!(matches!(
            usage.alerts().as_slice(),
            [Alert::HighErrorRate { provider, .. }] if provider == "a"
        ));
    }

    #[test]
    fn test_cost_and_latency_alerts() {
        let usage = UsageTracker::new(AlertThresholds {
            max_avg_latency_ms: 100,
            max_total_cost_usd: 1.0,
            ..Default::default()
        });

        usage.record_success("a", &TokenUsage::new(1, 1).with_cost(0.6), 50);
        assert!(usage.alerts().is_empty());

        usage.record_success("b", &TokenUsage::new(1, 1).with_cost(0.6), 400);
        let alerts = usage.alerts();
        assert!(alerts.iter().any(|a| matches!(a, Alert::CostExceeded { .. })));
        assert!(
            alerts
                .iter()
                .any(|a| matches!(a, Alert::HighLatency { provider, .. } if provider == "b"))
        );
        assert!(alerts.iter().all(|a| !a.to_string().is_empty()));
    }

    #[test]
    fn test_summary_display() {
        let usage = UsageTracker::default();
        usage.record_success("display", &TokenUsage::new(1000, 500).with_cost(0.05), 1000);
        let display = usage.provider_summary("display").unwrap().display();
        assert!(display.contains("display"));
        assert!(display.contains("1500"));
        assert!(display.contains('$'));
    }
}
