//! Per-Provider Rate Limiter
//!
//! Fixed-window request and token budgets. Gating reserves the pre-flight
//! estimate so concurrent dispatches cannot overshoot the budget; actual
//! usage is recorded separately for accounting.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::ai::provider::{ProviderId, RateBudget};
use crate::constants::rate_limit as rl_constants;

/// Counters for one provider's current window
#[derive(Debug, Clone)]
pub struct RateWindow {
    pub budget: RateBudget,
    pub window_start: Instant,
    pub requests: u32,
    /// Tokens reserved by admitted requests
    pub reserved_tokens: u64,
    /// Tokens reported by providers (accounting only)
    pub actual_tokens: u64,
}

impl RateWindow {
    fn new(budget: RateBudget) -> Self {
        Self {
            budget,
            window_start: Instant::now(),
            requests: 0,
            reserved_tokens: 0,
            actual_tokens: 0,
        }
    }

    /// Reset counters if one or more whole windows have passed
    fn roll(&mut self, window: Duration) {
        let elapsed = self.window_start.elapsed();
        if elapsed < window || window.is_zero() {
            return;
        }
        let windows_passed = (elapsed.as_nanos() / window.as_nanos()) as u32;
        self.window_start += window * windows_passed;
        self.requests = 0;
        self.reserved_tokens = 0;
        self.actual_tokens = 0;
    }

    /// A request this large is denied in every window
    fn oversized(&self, estimated_tokens: u64) -> bool {
        estimated_tokens > self.budget.tokens_per_minute
    }

    fn fits(&self, estimated_tokens: u64) -> bool {
        self.requests < self.budget.requests_per_minute
            && self.reserved_tokens.saturating_add(estimated_tokens)
                <= self.budget.tokens_per_minute
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Current window is spent; a later window may admit the request
    Exhausted,
    /// Estimate exceeds a whole window's token budget
    Oversized,
    /// No budget registered for the provider
    Unregistered,
}

/// Snapshot of a provider's window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateUsage {
    pub requests: u32,
    pub reserved_tokens: u64,
    pub actual_tokens: u64,
    pub budget: RateBudget,
}

pub struct RateLimiter {
    window: Duration,
    windows: DashMap<ProviderId, RateWindow>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(rl_constants::WINDOW_SECS))
    }
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            windows: DashMap::new(),
        }
    }

    /// Install or replace a provider's budget
    pub fn register(&self, id: ProviderId, budget: RateBudget) {
        self.windows.insert(id, RateWindow::new(budget));
    }

    /// Admit one request, reserving its estimated tokens.
    ///
    /// Denial leaves the window untouched. Unregistered providers are denied.
    pub fn allow(&self, id: &ProviderId, estimated_tokens: u64) -> bool {
        self.admit(id, estimated_tokens) == Admission::Admitted
    }

    /// [`RateLimiter::allow`] with the reason for a denial
    pub fn admit(&self, id: &ProviderId, estimated_tokens: u64) -> Admission {
        let Some(mut window) = self.windows.get_mut(id) else {
            tracing::warn!(provider = %id, "Rate limiter has no budget for provider");
            return Admission::Unregistered;
        };

        if window.oversized(estimated_tokens) {
            tracing::warn!(
                provider = %id,
                estimated_tokens,
                tokens_per_minute = window.budget.tokens_per_minute,
                "Request exceeds the provider's whole token window"
            );
            return Admission::Oversized;
        }

        window.roll(self.window);
        if !window.fits(estimated_tokens) {
            tracing::debug!(
                provider = %id,
                requests = window.requests,
                reserved_tokens = window.reserved_tokens,
                estimated_tokens,
                "Rate limit budget exhausted"
            );
            return Admission::Exhausted;
        }

        window.requests += 1;
        window.reserved_tokens += estimated_tokens;
        Admission::Admitted
    }

    /// Return a reservation for a request that never reached the provider
    pub fn refund(&self, id: &ProviderId, estimated_tokens: u64) {
        if let Some(mut window) = self.windows.get_mut(id) {
            window.roll(self.window);
            window.requests = window.requests.saturating_sub(1);
            window.reserved_tokens = window.reserved_tokens.saturating_sub(estimated_tokens);
        }
    }

    /// Record provider-reported tokens for a dispatched request
    pub fn record_usage(&self, id: &ProviderId, actual_tokens: u64) {
        if let Some(mut window) = self.windows.get_mut(id) {
            window.roll(self.window);
            window.actual_tokens = window.actual_tokens.saturating_add(actual_tokens);
        }
    }

    /// True when no further request fits in the current window
    pub fn is_exhausted(&self, id: &ProviderId) -> bool {
        match self.windows.get_mut(id) {
            Some(mut window) => {
                window.roll(self.window);
                !window.fits(0)
            }
            None => true,
        }
    }

    pub fn usage(&self, id: &ProviderId) -> Option<RateUsage> {
        self.windows.get_mut(id).map(|mut window| {
            window.roll(self.window);
            RateUsage {
                requests: window.requests,
                reserved_tokens: window.reserved_tokens,
                actual_tokens: window.actual_tokens,
                budget: window.budget,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::{OfflineProvider, ProviderConfig, ProviderKind, ProviderRegistry};
    use std::sync::Arc;

    fn provider_id(name: &str) -> ProviderId {
        ProviderRegistry::builder()
            .register(
                ProviderConfig::new(name, ProviderKind::Offline),
                Arc::new(OfflineProvider::new()),
            )
            .build()
            .unwrap()
            .resolve(name)
            .unwrap()
    }

    fn budget(requests_per_minute: u32, tokens_per_minute: u64) -> RateBudget {
        RateBudget {
            requests_per_minute,
            tokens_per_minute,
        }
    }

    #[test]
    fn test_request_budget_exhausts_then_rolls_over() {
        let limiter = RateLimiter::new(Duration::from_millis(50));
        let id = provider_id("a");
        limiter.register(id.clone(), budget(3, 10_000));

        assert!(limiter.allow(&id, 10));
        assert!(limiter.allow(&id, 10));
        assert!(limiter.allow(&id, 10));
        assert!(!limiter.allow(&id, 10));
        assert!(limiter.is_exhausted(&id));

        std::thread::sleep(Duration::from_millis(70));
        assert!(!limiter.is_exhausted(&id));
        assert!(limiter.allow(&id, 10));
    }

    #[test]
    fn test_token_budget_denies_without_consuming() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        let id = provider_id("a");
        limiter.register(id.clone(), budget(100, 100));

        assert!(limiter.allow(&id, 80));
        assert!(!limiter.allow(&id, 30));

        let usage = limiter.usage(&id).unwrap();
        assert_eq!(usage.requests, 1);
        assert_eq!(usage.reserved_tokens, 80);

        assert!(limiter.allow(&id, 20));
    }

    #[test]
    fn test_refund_never_goes_negative() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        let id = provider_id("a");
        limiter.register(id.clone(), budget(5, 100));

        assert!(limiter.allow(&id, 40));
        limiter.refund(&id, 40);
        limiter.refund(&id, 40);

        let usage = limiter.usage(&id).unwrap();
        assert_eq!(usage.requests, 0);
        assert_eq!(usage.reserved_tokens, 0);
    }

    #[test]
    fn test_actual_usage_is_accounting_only() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        let id = provider_id("a");
        limiter.register(id.clone(), budget(5, 100));

        assert!(limiter.allow(&id, 10));
        limiter.record_usage(&id, 500);

        let usage = limiter.usage(&id).unwrap();
        assert_eq!(usage.actual_tokens, 500);
        assert!(limiter.allow(&id, 10));
    }

    #[test]
    fn test_unregistered_provider_denied() {
        let limiter = RateLimiter::default();
        let id = provider_id("ghost");
        assert_eq!(limiter.admit(&id, 1), Admission::Unregistered);
        assert!(!limiter.allow(&id, 1));
        assert!(limiter.is_exhausted(&id));
    }

    #[test]
    fn test_estimate_above_window_budget_is_oversized() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        let id = provider_id("a");
        limiter.register(id.clone(), budget(10, 2_000));

        assert_eq!(limiter.admit(&id, 2_001), Admission::Oversized);
        assert_eq!(limiter.admit(&id, 1_500), Admission::Admitted);
        // Spent window is transient, not oversized
        assert_eq!(limiter.admit(&id, 1_000), Admission::Exhausted);

        let usage = limiter.usage(&id).unwrap();
        assert_eq!(usage.requests, 1);
        assert_eq!(usage.reserved_tokens, 1_500);
    }

    #[test]
    fn test_concurrent_admission_never_overshoots() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(60)));
        let id = provider_id("shared");
        limiter.register(id.clone(), budget(50, 10_000));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let id = id.clone();
                std::thread::spawn(move || (0..25).filter(|_| limiter.allow(&id, 150)).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        // 10_000 / 150 allows 66 by tokens, so the request budget binds
        assert_eq!(admitted, 50);
        let usage = limiter.usage(&id).unwrap();
        assert_eq!(usage.requests, 50);
        assert!(usage.reserved_tokens <= 10_000);
        assert_eq!(usage.reserved_tokens, 50 * 150);
    }

    #[test]
    fn test_concurrent_admission_bounded_by_tokens() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(60)));
        let id = provider_id("shared");
        limiter.register(id.clone(), budget(1_000, 1_000));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let id = id.clone();
                std::thread::spawn(move || (0..20).filter(|_| limiter.allow(&id, 30)).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(admitted, 1_000 / 30);
        assert!(limiter.usage(&id).unwrap().reserved_tokens <= 1_000);
    }
}
