//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Dispatch and routing constants
pub mod routing {
    /// Completion token cap when neither request nor provider sets one
    pub const DEFAULT_MAX_TOKENS: u32 = 4096;

    /// Default sampling temperature
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;
}

/// Retry engine constants
pub mod retry {
    /// Default number of retries after the first attempt
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 1000;

    /// Hard cap on any single backoff delay (milliseconds)
    pub const MAX_DELAY_MS: u64 = 30_000;

    /// Upper bound of the random jitter added to each delay (milliseconds)
    pub const MAX_JITTER_MS: u64 = 1000;
}

/// Circuit breaker constants
pub mod circuit_breaker {
    /// Number of consecutive failures before opening circuit
    pub const FAILURE_THRESHOLD: u32 = 5;

    /// Duration to wait before attempting recovery (seconds)
    pub const RECOVERY_TIMEOUT_SECS: u64 = 60;

    /// Probe requests allowed in half-open state
    pub const HALF_OPEN_MAX_REQUESTS: u32 = 1;

    /// Probe successes needed to close circuit from half-open
    pub const SUCCESS_THRESHOLD: u32 = 1;
}

/// Rate limiter constants
pub mod rate_limit {
    /// Length of one accounting window (seconds)
    pub const WINDOW_SECS: u64 = 60;

    /// Default request budget per window
    pub const REQUESTS_PER_MINUTE: u32 = 60;

    /// Default token budget per window
    pub const TOKENS_PER_MINUTE: u64 = 90_000;

    /// Rough characters-per-token ratio for pre-flight estimates
    pub const CHARS_PER_TOKEN: usize = 4;
}

/// Response cache constants
pub mod cache {
    /// Maximum entries before LRU eviction
    pub const MAX_ENTRIES: usize = 1000;

    /// Entry time-to-live (seconds)
    pub const TTL_SECS: u64 = 3600;

    /// Background purge interval for expired entries (seconds)
    pub const PURGE_INTERVAL_SECS: u64 = 300;
}

/// Usage alert thresholds
pub mod alerts {
    /// Average latency above which an alert fires (milliseconds)
    pub const MAX_AVG_LATENCY_MS: u64 = 30_000;

    /// Error rate above which an alert fires (0.0 - 1.0)
    pub const MAX_ERROR_RATE: f64 = 0.25;

    /// Cumulative spend above which an alert fires (USD)
    pub const MAX_TOTAL_COST_USD: f64 = 50.0;

    /// Minimum requests before the error rate is considered meaningful
    pub const MIN_SAMPLES_FOR_ERROR_RATE: u64 = 10;
}

/// Progress tracker constants
pub mod progress {
    /// Entries idle for longer than this are swept (seconds)
    pub const MAX_AGE_SECS: u64 = 3600;

    /// Interval between background sweeps (seconds)
    pub const SWEEP_INTERVAL_SECS: u64 = 300;

    /// Capacity of the progress event broadcast channel
    pub const EVENT_CHANNEL_CAPACITY: usize = 256;
}

/// Blueprint pipeline constants
pub mod blueprint {
    /// Minimum characters of combined title + description
    pub const MIN_CONTEXT_CHARS: usize = 40;

    /// Sections shorter than this are flagged by validation
    pub const MIN_SECTION_CHARS: usize = 200;

    /// Sections longer than this are flagged by validation
    pub const MAX_SECTION_CHARS: usize = 20_000;

    /// Progress milestones (percent)
    pub mod milestone {
        pub const VALIDATING_INPUT: u8 = 5;
        pub const PLAN: u8 = 15;
        pub const TECH_STACK: u8 = 30;
        pub const WORKFLOW: u8 = 50;
        pub const ROADMAP: u8 = 70;
        pub const FINANCIALS: u8 = 85;
        pub const VALIDATING_OUTPUT: u8 = 90;
        pub const COMPLETE: u8 = 100;
    }
}

/// HTTP/Network constants
pub mod network {
    /// Default request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

    /// Timeout for connection probes (seconds)
    pub const PROBE_TIMEOUT_SECS: u64 = 10;
}
