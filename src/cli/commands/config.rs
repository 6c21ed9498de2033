//! Config Command
//!
//! Manage Blueprint Forge configuration.
//!
//! Usage:
//!   blueprint-forge config show [-f json]
//!   blueprint-forge config path
//!   blueprint-forge config init [-g] [--force]

use console::style;

use crate::cli::ui::Output;
use crate::config::ConfigLoader;
use crate::types::Result;

/// Show current effective configuration
pub fn show(format: &str) -> Result<()> {
    let config = ConfigLoader::load()?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}

/// Show configuration paths
pub fn path() -> Result<()> {
    let mark = |exists: bool| {
        if exists {
            style("✓").green()
        } else {
            style("✗").red()
        }
    };

    println!("Configuration paths:");
    println!();
    match ConfigLoader::global_config_path() {
        Some(global) => println!("  Global:  {} {}", mark(global.exists()), global.display()),
        None => println!("  Global:  (not available)"),
    }
    let project = ConfigLoader::project_config_path();
    println!("  Project: {} {}", mark(project.exists()), project.display());
    println!("  Env:     FORGE_* (e.g. FORGE_RETRY__MAX_RETRIES=5)");
    Ok(())
}

/// Initialize global or project configuration
pub fn init(global: bool, force: bool) -> Result<()> {
    let path = if global {
        ConfigLoader::init_global(force)?
    } else {
        ConfigLoader::init_project(force)?
    };

    let output = Output::new();
    output.success(if global {
        "Initialized global configuration"
    } else {
        "Initialized project configuration"
    });
    output.field("Config", path.display());
    Ok(())
}
