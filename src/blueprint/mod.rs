//! Blueprint generation: data model, section prompts, orchestration and
//! deterministic validation.

mod orchestrator;
pub mod prompts;
mod types;
mod validation;

pub use orchestrator::GenerationOrchestrator;
pub use types::{
    Blueprint, BlueprintRequest, GenerationMetadata, IssueSeverity, Section, SectionKind,
    ValidationIssue, ValidationReport,
};
pub use validation::{BlueprintValidator, ValidationConfig, validate_blueprint};
