//! Regenerate Command
//!
//! Rewrites one section of a saved blueprint, optionally steered by feedback.
//!
//! Usage:
//!   blueprint-forge regenerate FILE --section S [--feedback TEXT] [--offline]

use std::path::PathBuf;

use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use crate::ai::ResponseEnvelope;
use crate::blueprint::SectionKind;
use crate::cli::ui::Output;
use crate::cli::util::{load_blueprint, load_runtime, save_blueprint};
use crate::types::{ForgeError, Result};

#[derive(Debug, Clone)]
pub struct RegenerateOptions {
    pub file: PathBuf,
    pub section: SectionKind,
    pub feedback: Option<String>,
    pub offline: bool,
    /// Write here instead of overwriting `file`
    pub output: Option<PathBuf>,
}

pub fn run(options: RegenerateOptions) -> Result<()> {
    let output = Output::new();
    let mut blueprint = load_blueprint(&options.file)?;
    let runtime = load_runtime(options.offline)?;

    output.info(&format!(
        "Regenerating {} of '{}'",
        options.section.title(),
        blueprint.request.title
    ));

    let rt = Runtime::new()?;
    let envelope = rt.block_on(runtime.orchestrator.regenerate_section(
        &mut blueprint,
        options.section,
        options.feedback.as_deref(),
        &CancellationToken::new(),
    ))?;

    match envelope {
        ResponseEnvelope::Success(generated) => {
            let target = options.output.unwrap_or(options.file);
            save_blueprint(&target, &blueprint)?;
            output.success(&format!(
                "{} regenerated via {} in {}ms",
                options.section.title(),
                generated.metadata.provider,
                generated.metadata.latency_ms
            ));

            output.section("Current validation");
            output.validation(&runtime.orchestrator.validate_blueprint(&blueprint));
            output.success(&format!("Saved {}", target.display()));
            Ok(())
        }
        ResponseEnvelope::Failure(err) => Err(ForgeError::Blueprint(err)),
    }
}
