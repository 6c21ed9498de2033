//! Generation Orchestrator
//!
//! Runs the section pipeline in dependency order. Each section is one
//! retried dispatch; required sections abort the run on final failure,
//! optional ones degrade to a placeholder.
//!
//! ```text
//! validate input (5) -> plan (15) -> tech_stack (30) -> workflow (50)
//!   -> roadmap (70) -> financials (85) -> validate output (90) -> complete (100)
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::ai::envelope::{Generated, RequestSpec, ResponseEnvelope};
use crate::ai::manager::AiServiceManager;
use crate::ai::retry::{RetryPolicy, with_retry_fallback};
use crate::constants::blueprint::{MIN_CONTEXT_CHARS, milestone};
use crate::constants::routing;
use crate::progress::{ProgressTracker, ProgressUpdate};
use crate::types::{BlueprintError, ErrorCode, ForgeError, GenerationId, Result};

use super::prompts::{SYSTEM_PROMPT, regeneration_prompt, section_prompt};
use super::types::{
    Blueprint, BlueprintRequest, GenerationMetadata, Section, SectionKind, ValidationReport,
};
use super::validation::{BlueprintValidator, ValidationConfig};

const STEP_QUEUED: &str = "queued";
const STEP_VALIDATING_INPUT: &str = "validating_input";
const STEP_VALIDATING_OUTPUT: &str = "validating_output";
const DEGRADED_PROVIDER: &str = "none";

/// Result of one section step before it becomes a [`Section`]
enum SectionOutcome {
    Generated(Generated),
    Placeholder(ErrorCode),
}

#[derive(Default)]
struct RunTotals {
    ai_calls: u32,
    cost_usd: f64,
    tokens: u64,
}

pub struct GenerationOrchestrator {
    manager: Arc<AiServiceManager>,
    progress: Arc<ProgressTracker>,
    retry: RetryPolicy,
    validator: BlueprintValidator,
    temperature: f32,
    cache_sections: bool,
}

impl GenerationOrchestrator {
    pub fn new(manager: Arc<AiServiceManager>, progress: Arc<ProgressTracker>) -> Self {
        Self {
            manager,
            progress,
            retry: RetryPolicy::default(),
            validator: BlueprintValidator::new(),
            temperature: routing::DEFAULT_TEMPERATURE,
            cache_sections: false,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_validation(mut self, config: ValidationConfig) -> Self {
        self.validator = BlueprintValidator::with_config(config);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Mark first-generation section requests cacheable
    pub fn with_section_caching(mut self, enabled: bool) -> Self {
        self.cache_sections = enabled;
        self
    }

    pub fn manager(&self) -> &Arc<AiServiceManager> {
        &self.manager
    }

    pub fn progress(&self) -> &Arc<ProgressTracker> {
        &self.progress
    }

    /// Generate every section and validate the result.
    ///
    /// Progress for `id` is updated before and after each step. On failure the
    /// classified error is recorded in progress and returned unchanged.
    #[instrument(skip_all, fields(generation_id = %id))]
    pub async fn generate_blueprint(
        &self,
        id: GenerationId,
        request: BlueprintRequest,
        cancel: &CancellationToken,
    ) -> std::result::Result<Blueprint, BlueprintError> {
        let started = Instant::now();
        let mut completed_steps = Vec::new();
        self.progress
            .update_progress(&id, ProgressUpdate::pending(STEP_QUEUED));
        self.progress.update_progress(
            &id,
            ProgressUpdate::running(STEP_VALIDATING_INPUT, milestone::VALIDATING_INPUT),
        );

        let context_chars = request.context_chars();
        if context_chars < MIN_CONTEXT_CHARS {
            let err = BlueprintError::insufficient_context(format!(
                "title and description total {} characters, at least {} required",
                context_chars, MIN_CONTEXT_CHARS
            ));
            return Err(self.fail(&id, err));
        }
        completed_steps.push(STEP_VALIDATING_INPUT.to_string());

        let mut sections: BTreeMap<SectionKind, Section> = BTreeMap::new();
        let mut totals = RunTotals::default();
        let mut percentage = milestone::VALIDATING_INPUT;

        for kind in SectionKind::ALL {
            self.progress
                .update_progress(&id, ProgressUpdate::running(kind.step_label(), percentage));

            let section = match self
                .generate_section(&request, kind, &sections, &mut totals, cancel)
                .await
            {
                Ok(section) => section,
                Err(err) => {
                    warn!(
                        generation_id = %id,
                        section = %kind,
                        ai_calls = totals.ai_calls,
                        code = %err.code,
                        error = %err.message,
                        "Required section failed, aborting generation"
                    );
                    return Err(self.fail(&id, err));
                }
            };

            sections.insert(kind, section);
            completed_steps.push(kind.as_str().to_string());
            percentage = kind.milestone();
            self.progress
                .update_progress(&id, ProgressUpdate::running(kind.step_label(), percentage));
        }

        self.progress.update_progress(
            &id,
            ProgressUpdate::running(STEP_VALIDATING_OUTPUT, milestone::VALIDATING_OUTPUT),
        );

        let mut blueprint = Blueprint {
            id: id.clone(),
            request,
            sections,
            metadata: GenerationMetadata {
                ai_calls_used: totals.ai_calls,
                total_cost_usd: totals.cost_usd,
                total_tokens: totals.tokens,
                duration_ms: 0,
                completed_steps,
                generated_at: Utc::now(),
            },
            validation: ValidationReport::default(),
        };
        blueprint.validation = self.validator.validate(&blueprint);
        blueprint
            .metadata
            .completed_steps
            .push(STEP_VALIDATING_OUTPUT.to_string());
        blueprint.metadata.duration_ms = started.elapsed().as_millis() as u64;

        self.progress.update_progress(&id, ProgressUpdate::completed());
        info!(
            generation_id = %id,
            ai_calls = blueprint.metadata.ai_calls_used,
            tokens = blueprint.metadata.total_tokens,
            cost_usd = blueprint.metadata.total_cost_usd,
            duration_ms = blueprint.metadata.duration_ms,
            score = blueprint.validation.score,
            "Blueprint generated"
        );

        Ok(blueprint)
    }

    fn fail(&self, id: &GenerationId, err: BlueprintError) -> BlueprintError {
        self.progress
            .update_progress(id, ProgressUpdate::failed(err.clone()));
        err
    }

    async fn generate_section(
        &self,
        request: &BlueprintRequest,
        kind: SectionKind,
        completed: &BTreeMap<SectionKind, Section>,
        totals: &mut RunTotals,
        cancel: &CancellationToken,
    ) -> std::result::Result<Section, BlueprintError> {
        let mut spec = RequestSpec::new(section_prompt(request, kind, completed))
            .with_system_prompt(SYSTEM_PROMPT)
            .with_temperature(self.temperature);
        if self.cache_sections {
            spec = spec.cacheable();
        }

        let manager = &self.manager;
        let operation_name = format!("section {}", kind);
        let mut dispatches: u32 = 0;

        let outcome = with_retry_fallback(
            &operation_name,
            &self.retry,
            cancel,
            || {
                dispatches += 1;
                let spec = spec.clone();
                async move {
                    manager
                        .dispatch_with_cancel(spec, cancel)
                        .await?
                        .into_result()
                        .map(SectionOutcome::Generated)
                        .map_err(ForgeError::Blueprint)
                }
            },
            |err| (!kind.is_required()).then_some(SectionOutcome::Placeholder(err.code)),
        )
        .await;
        totals.ai_calls += dispatches;

        Ok(match outcome? {
            SectionOutcome::Generated(generated) => {
                totals.cost_usd += generated.usage.cost_usd;
                totals.tokens += u64::from(generated.usage.total_tokens);
                Section {
                    kind,
                    content: generated.text.trim().to_string(),
                    provider: generated.metadata.provider,
                    model: generated.metadata.model,
                    generated_at: generated.metadata.timestamp,
                    degraded: false,
                }
            }
            SectionOutcome::Placeholder(code) => {
                warn!(section = %kind, code = %code, "Optional section degraded to placeholder");
                placeholder(kind, code)
            }
        })
    }

    /// Regenerate one section with optional feedback.
    ///
    /// A single dispatch. On success only `kind` is replaced and the
    /// generation time re-stamped; other sections and the stored validation
    /// are left as they were.
    #[instrument(skip_all, fields(generation_id = %blueprint.id, section = %kind))]
    pub async fn regenerate_section(
        &self,
        blueprint: &mut Blueprint,
        kind: SectionKind,
        feedback: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ResponseEnvelope> {
        let prompt = regeneration_prompt(&blueprint.request, kind, &blueprint.sections, feedback);
        let spec = RequestSpec::new(prompt)
            .with_system_prompt(SYSTEM_PROMPT)
            .with_temperature(self.temperature);

        let envelope = self.manager.dispatch_with_cancel(spec, cancel).await?;
        match &envelope {
            ResponseEnvelope::Success(generated) => {
                blueprint.sections.insert(
                    kind,
                    Section {
                        kind,
                        content: generated.text.trim().to_string(),
                        provider: generated.metadata.provider.clone(),
                        model: generated.metadata.model.clone(),
                        generated_at: generated.metadata.timestamp,
                        degraded: false,
                    },
                );
                blueprint.metadata.generated_at = Utc::now();
                info!(provider = %generated.metadata.provider, "Section regenerated");
            }
            ResponseEnvelope::Failure(err) => {
                warn!(code = %err.code, error = %err.message, "Section regeneration failed");
            }
        }
        Ok(envelope)
    }

    pub fn validate_blueprint(&self, blueprint: &Blueprint) -> ValidationReport {
        self.validator.validate(blueprint)
    }
}

fn placeholder(kind: SectionKind, code: ErrorCode) -> Section {
    Section {
        kind,
        content: format!(
            "## {}\n\n_This section could not be generated ({}). {}_\n",
            kind.title(),
            code,
            "Regenerate it once an AI provider is available."
        ),
        provider: DEGRADED_PROVIDER.to_string(),
        model: DEGRADED_PROVIDER.to_string(),
        generated_at: Utc::now(),
        degraded: true,
    }
}
