use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blueprint_forge::blueprint::{BlueprintRequest, SectionKind};
use blueprint_forge::cli::Output;
use blueprint_forge::cli::commands::{self, generate::GenerateOptions, regenerate::RegenerateOptions};
use blueprint_forge::types::ForgeError;

#[derive(Parser)]
#[command(name = "blueprint-forge")]
#[command(
    version,
    about = "Generate project blueprints through resilient multi-provider AI orchestration"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a full blueprint from a short description
    Generate {
        #[arg(long, short, help = "Project title")]
        title: String,
        #[arg(long, short, help = "What the project does and for whom")]
        description: String,
        #[arg(long, help = "Primary users")]
        target_users: Option<String>,
        #[arg(long, help = "Budget, free text (e.g. \"$20k\")")]
        budget: Option<String>,
        #[arg(long, help = "Timeline, free text (e.g. \"3 months\")")]
        timeline: Option<String>,
        #[arg(long = "constraint", help = "Constraint to respect (repeatable)")]
        constraints: Vec<String>,
        #[arg(long, help = "Use the network-free offline provider")]
        offline: bool,
        #[arg(long, short, help = "Blueprint JSON output path (default: blueprint.json)")]
        output: Option<PathBuf>,
    },

    /// Regenerate one section of a saved blueprint
    Regenerate {
        #[arg(help = "Blueprint JSON file")]
        file: PathBuf,
        #[arg(long, short, help = "Section: plan, tech_stack, workflow, roadmap, financials")]
        section: SectionKind,
        #[arg(long, short, help = "What to change")]
        feedback: Option<String>,
        #[arg(long, help = "Use the network-free offline provider")]
        offline: bool,
        #[arg(long, short, help = "Write to this file instead of overwriting")]
        output: Option<PathBuf>,
    },

    /// Score a saved blueprint without calling any provider
    Validate {
        #[arg(help = "Blueprint JSON file")]
        file: PathBuf,
        #[arg(short = 'f', long, default_value = "text", help = "Output format: text, json")]
        format: String,
    },

    /// Probe providers and show circuit and rate-limit status
    Providers {
        #[arg(long, help = "Use the network-free offline provider")]
        offline: bool,
        #[arg(short = 'f', long, default_value = "text", help = "Output format: text, json")]
        format: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(short = 'f', long, default_value = "toml", help = "Output format: toml, json")]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Initialize configuration
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n{}", console::style("━━━ PANIC ━━━").red().bold());
        eprintln!(
            "{}",
            console::style("blueprint-forge encountered an unexpected error:").red()
        );
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "{}",
                console::style(format!(
                    "Location: {}:{}:{}",
                    location.file(),
                    location.line(),
                    location.column()
                ))
                .dim()
            );
        }
        eprintln!();

        // Call default hook for backtrace (if RUST_BACKTRACE=1)
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<ForgeError>() {
                Some(ForgeError::Blueprint(err)) => Output::new().blueprint_error(err),
                _ => Output::new().error(&format!("Error: {}", e)),
            }
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Generate {
            title,
            description,
            target_users,
            budget,
            timeline,
            constraints,
            offline,
            output,
        } => {
            let request = BlueprintRequest {
                title,
                description,
                target_users,
                budget,
                timeline,
                constraints,
            };
            commands::generate::run(GenerateOptions {
                request,
                offline,
                output,
                quiet: cli.quiet,
            })?;
        }
        Commands::Regenerate {
            file,
            section,
            feedback,
            offline,
            output,
        } => {
            commands::regenerate::run(RegenerateOptions {
                file,
                section,
                feedback,
                offline,
                output,
            })?;
        }
        Commands::Validate { file, format } => {
            commands::validate::run(&file, &format)?;
        }
        Commands::Providers { offline, format } => {
            commands::providers::run(offline, &format)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { format } => commands::config::show(&format)?,
            ConfigAction::Path => commands::config::path()?,
            ConfigAction::Init { global, force } => commands::config::init(global, force)?,
        },
    }

    Ok(())
}
