//! Unified Error Type System
//!
//! Centralized error types for the entire application.
//!
//! ## Layers
//!
//! - [`ProviderError`]: raw transport/provider failure from a client
//! - [`BlueprintError`]: classified, user-presentable error value
//! - [`ForgeError`]: crate-wide application error (config, IO, pass-through)
//!
//! [`ErrorClassifier`] maps the first and third onto the second using
//! type information first and ordered message patterns second.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Codes
// =============================================================================

/// Closed error taxonomy shared by retry, dispatch and the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Provider call exceeded its deadline
    AiServiceTimeout,
    /// Provider or local limiter rejected the request
    AiServiceRateLimit,
    /// Provider reachable but erroring or down
    AiServiceUnavailable,
    /// Response failed to parse or validate
    InvalidResponse,
    /// Breaker is rejecting this provider
    CircuitOpen,
    /// Input too sparse to generate meaningfully
    InsufficientContext,
    /// Unclassified failure
    GenerationFailed,
    /// Caller abandoned the operation
    Cancelled,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AiServiceTimeout => write!(f, "AI_SERVICE_TIMEOUT"),
            Self::AiServiceRateLimit => write!(f, "AI_SERVICE_RATE_LIMIT"),
            Self::AiServiceUnavailable => write!(f, "AI_SERVICE_UNAVAILABLE"),
            Self::InvalidResponse => write!(f, "INVALID_RESPONSE"),
            Self::CircuitOpen => write!(f, "CIRCUIT_OPEN"),
            Self::InsufficientContext => write!(f, "INSUFFICIENT_CONTEXT"),
            Self::GenerationFailed => write!(f, "GENERATION_FAILED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl ErrorCode {
    /// Fixed retryability per code
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InsufficientContext | Self::Cancelled)
    }

    /// Message safe to show end users
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::AiServiceTimeout => "The AI service took too long to respond.",
            Self::AiServiceRateLimit => "The AI service is receiving too many requests right now.",
            Self::AiServiceUnavailable => "The AI service is temporarily unavailable.",
            Self::InvalidResponse => "The AI service returned a response we could not use.",
            Self::CircuitOpen => "The AI service is recovering from repeated failures.",
            Self::InsufficientContext => "There is not enough detail to generate a blueprint.",
            Self::GenerationFailed => "Blueprint generation failed unexpectedly.",
            Self::Cancelled => "The generation was cancelled.",
        }
    }

    /// Suggestions shown alongside the user message
    pub fn suggestions(&self) -> &'static [&'static str] {
        match self {
            Self::AiServiceTimeout => &[
                "Try again in a few moments",
                "Shorten the project description",
            ],
            Self::AiServiceRateLimit => &[
                "Wait a minute before retrying",
                "Reduce the number of simultaneous generations",
            ],
            Self::AiServiceUnavailable => &[
                "Try again shortly",
                "Check the provider status page",
            ],
            Self::InvalidResponse => &[
                "Retry the generation",
                "Rephrase the project description",
            ],
            Self::CircuitOpen => &[
                "Retry later or select a different provider",
            ],
            Self::InsufficientContext => &[
                "Add a longer project description",
                "Describe the target users and the core problem",
                "Mention any known constraints such as budget or timeline",
            ],
            Self::GenerationFailed => &[
                "Retry the generation",
                "Contact support if the problem persists",
            ],
            Self::Cancelled => &[],
        }
    }
}

// =============================================================================
// Blueprint Error
// =============================================================================

/// Classified error value propagated unchanged to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlueprintError {
    pub code: ErrorCode,
    /// Full diagnostic message for logs
    pub message: String,
    /// Message for end users
    pub user_message: String,
    pub retryable: bool,
    pub suggestions: Vec<String>,
    /// Provider that produced the error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl std::fmt::Display for BlueprintError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.code, self.message)
        } else {
            write!(f, "[{}] {}", self.code, self.message)
        }
    }
}

impl std::error::Error for BlueprintError {}

impl BlueprintError {
    /// Create an error with the code's fixed retryability and suggestions
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            user_message: code.user_message().to_string(),
            retryable: code.is_retryable(),
            suggestions: code.suggestions().iter().map(|s| s.to_string()).collect(),
            provider: None,
        }
    }

    /// Attach provider context
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn circuit_open(provider: &str) -> Self {
        Self::new(
            ErrorCode::CircuitOpen,
            format!("circuit breaker open for provider '{}'", provider),
        )
        .with_provider(provider)
    }

    pub fn rate_limited(provider: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AiServiceRateLimit, message).with_provider(provider)
    }

    /// Rate-limit denial that no later window can lift for this provider
    pub fn exceeds_rate_window(
        provider: &str,
        estimated_tokens: u64,
        tokens_per_minute: u64,
    ) -> Self {
        let mut err = Self::rate_limited(
            provider,
            format!(
                "request needs ~{} tokens but provider '{}' allows {} per window",
                estimated_tokens, provider, tokens_per_minute
            ),
        );
        err.retryable = false;
        err
    }

    pub fn insufficient_context(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InsufficientContext, message)
    }

    pub fn cancelled(operation: &str) -> Self {
        Self::new(ErrorCode::Cancelled, format!("{} cancelled by caller", operation))
    }
}

// =============================================================================
// Provider Error
// =============================================================================

/// Raw failure reported by a provider client
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Other(String),
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// Provider name not present in the registry
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Already-classified error, passed through untouched
    #[error("{0}")]
    Blueprint(#[from] BlueprintError),
}

pub type Result<T> = std::result::Result<T, ForgeError>;

impl ForgeError {
    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Maps raw failures onto the closed [`ErrorCode`] taxonomy
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a free-form error message.
    ///
    /// Patterns are checked in order; the first match wins.
    pub fn classify(message: &str) -> BlueprintError {
        let lower = message.to_lowercase();

        if lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("deadline exceeded")
        {
            return BlueprintError::new(ErrorCode::AiServiceTimeout, message);
        }

        if lower.contains("rate limit")
            || lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("quota exceeded")
        {
            return BlueprintError::new(ErrorCode::AiServiceRateLimit, message);
        }

        if lower.contains("unavailable")
            || lower.contains("503")
            || lower.contains("502")
            || lower.contains("overloaded")
            || lower.contains("connection refused")
            || lower.contains("server error")
        {
            return BlueprintError::new(ErrorCode::AiServiceUnavailable, message);
        }

        if lower.contains("parse")
            || lower.contains("invalid")
            || lower.contains("malformed")
            || lower.contains("unexpected token")
            || lower.contains("json")
        {
            return BlueprintError::new(ErrorCode::InvalidResponse, message);
        }

        BlueprintError::new(ErrorCode::GenerationFailed, message)
    }

    /// Classify a provider failure using its structure before its message
    pub fn classify_provider_error(err: &ProviderError, provider: &str) -> BlueprintError {
        let classified = match err {
            ProviderError::Timeout(_) => {
                BlueprintError::new(ErrorCode::AiServiceTimeout, err.to_string())
            }
            ProviderError::Http { status, .. } => match status {
                408 | 504 => BlueprintError::new(ErrorCode::AiServiceTimeout, err.to_string()),
                429 => BlueprintError::new(ErrorCode::AiServiceRateLimit, err.to_string()),
                500..=599 => {
                    BlueprintError::new(ErrorCode::AiServiceUnavailable, err.to_string())
                }
                _ => Self::classify(&err.to_string()),
            },
            ProviderError::InvalidResponse(_) => {
                BlueprintError::new(ErrorCode::InvalidResponse, err.to_string())
            }
            ProviderError::Transport(msg) => {
                let by_message = Self::classify(msg);
                if by_message.code == ErrorCode::GenerationFailed {
                    BlueprintError::new(ErrorCode::AiServiceUnavailable, err.to_string())
                } else {
                    by_message
                }
            }
            ProviderError::Other(msg) => Self::classify(msg),
        };

        classified.with_provider(provider)
    }

    /// Classify an application error with type-based routing
    pub fn classify_error(err: &ForgeError) -> BlueprintError {
        match err {
            ForgeError::Blueprint(inner) => inner.clone(),
            ForgeError::Provider(inner) => match inner {
                ProviderError::Timeout(_) => {
                    BlueprintError::new(ErrorCode::AiServiceTimeout, inner.to_string())
                }
                _ => Self::classify(&inner.to_string()),
            },
            ForgeError::Timeout { .. } => {
                BlueprintError::new(ErrorCode::AiServiceTimeout, err.to_string())
            }
            ForgeError::Cancelled(operation) => BlueprintError::cancelled(operation),
            ForgeError::Json(_) => BlueprintError::new(ErrorCode::InvalidResponse, err.to_string()),
            _ => Self::classify(&err.to_string()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
