//! Blueprint Forge - Resilient Multi-Provider AI Orchestration
//!
//! Turns a short product description into a multi-section project blueprint
//! (plan, tech stack, workflow, roadmap, financials) by sequencing AI calls
//! through a fault-tolerant dispatch layer.
//!
//! ## Core Features
//!
//! - **Single dispatch entry point**: cache, rate limiter and circuit breaker
//!   in front of every provider, with load balancing and a fallback chain
//! - **Classified errors**: stable error codes with user-facing messages and
//!   suggestions, retried with exponential backoff and jitter
//! - **Orchestration**: dependency-ordered sections, per-section retry,
//!   graceful degradation of optional sections, single-section regeneration
//! - **Progress tracking**: pollable and broadcast per-generation progress
//!
//! ## Quick Start
//!
//! ```ignore
//! use blueprint_forge::{BlueprintRequest, Config, ForgeRuntime, GenerationId};
//! use tokio_util::sync::CancellationToken;
//!
//! let runtime = ForgeRuntime::from_config(Config::default().into_offline())?;
//! let blueprint = runtime
//!     .orchestrator
//!     .generate_blueprint(GenerationId::generate(), request, &CancellationToken::new())
//!     .await?;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: provider clients, dispatch, resilience primitives
//! - [`blueprint`]: section pipeline, prompts, validation
//! - [`progress`]: per-generation progress tracking
//! - [`config`]: layered configuration and runtime wiring

pub mod ai;
pub mod blueprint;
pub mod cli;
pub mod config;
pub mod constants;
pub mod progress;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

pub use config::{Config, ConfigLoader, ForgeRuntime};

pub use types::{BlueprintError, ErrorClassifier, ErrorCode, ForgeError, GenerationId, Result};

pub use ai::{
    AiServiceManager, LoadBalancing, ProviderStatus, RequestSpec, ResponseEnvelope, RetryPolicy,
    with_retry,
};

pub use blueprint::{
    Blueprint, BlueprintRequest, GenerationOrchestrator, SectionKind, ValidationReport,
};

pub use progress::{GenerationProgress, GenerationStatus, ProgressTracker, ProgressUpdate};
