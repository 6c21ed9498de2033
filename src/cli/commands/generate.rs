//! Generate Command
//!
//! Runs the full section pipeline and writes the blueprint to disk.
//!
//! Usage:
//!   blueprint-forge generate --title T --description D [--offline] [--output FILE]

use std::path::PathBuf;

use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::blueprint::BlueprintRequest;
use crate::cli::progress::{ConsoleRenderer, format_duration};
use crate::cli::ui::Output;
use crate::cli::util::{load_runtime, save_blueprint};
use crate::config::ForgeRuntime;
use crate::types::{ForgeError, GenerationId, Result};

/// Default blueprint file when `--output` is not given
pub const DEFAULT_OUTPUT: &str = "blueprint.json";

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub request: BlueprintRequest,
    pub offline: bool,
    pub output: Option<PathBuf>,
    /// Suppress the live progress line
    pub quiet: bool,
}

pub fn run(options: GenerateOptions) -> Result<()> {
    let runtime = load_runtime(options.offline)?;
    let rt = Runtime::new()?;
    rt.block_on(generate(runtime, options))
}

async fn generate(runtime: ForgeRuntime, options: GenerateOptions) -> Result<()> {
    let output = Output::new();
    let id = GenerationId::generate();
    let output_path = options
        .output
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

    output.header(&format!("Generating blueprint: {}", options.request.title));
    output.field("Generation", &id);
    output.field(
        "Providers",
        runtime
            .manager
            .registry()
            .iter()
            .map(|p| p.id.name().to_string())
            .collect::<Vec<_>>()
            .join(", "),
    );
    println!();

    let shutdown = CancellationToken::new();
    let maintenance = runtime.spawn_maintenance(shutdown.clone());

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling generation");
            interrupt.cancel();
        }
    });

    let renderer = (!options.quiet).then(|| {
        ConsoleRenderer::new(runtime.progress.clone(), id.clone()).start_render_loop()
    });

    let result = runtime
        .orchestrator
        .generate_blueprint(id, options.request, &cancel)
        .await;

    if let Some(renderer) = renderer {
        let _ = renderer.await;
    }
    shutdown.cancel();
    for task in maintenance {
        let _ = task.await;
    }

    let blueprint = result.map_err(ForgeError::Blueprint)?;
    save_blueprint(&output_path, &blueprint)?;

    output.section("Sections");
    for section in blueprint.ordered_sections() {
        if section.degraded {
            output.warning(&format!("{} (placeholder)", section.kind.title()));
        } else {
            output.success(&format!(
                "{} via {} ({})",
                section.kind.title(),
                section.provider,
                section.model
            ));
        }
    }

    output.section("Summary");
    output.field("AI calls", blueprint.metadata.ai_calls_used);
    output.field("Tokens", blueprint.metadata.total_tokens);
    output.field("Cost", format!("${:.4}", blueprint.metadata.total_cost_usd));
    output.field(
        "Duration",
        format_duration(blueprint.metadata.duration_ms / 1000),
    );
    output.validation(&blueprint.validation);

    for alert in runtime.manager.usage().alerts() {
        output.warning(&alert.to_string());
    }

    println!();
    output.success(&format!(
        "Saved {} and {}",
        output_path.display(),
        output_path.with_extension("md").display()
    ));
    Ok(())
}
