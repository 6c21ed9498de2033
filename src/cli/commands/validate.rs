//! Validate Command
//!
//! Scores a saved blueprint without calling any provider.

use std::path::Path;

use crate::blueprint::BlueprintValidator;
use crate::cli::ui::Output;
use crate::cli::util::load_blueprint;
use crate::config::ConfigLoader;
use crate::types::Result;

pub fn run(file: &Path, format: &str) -> Result<()> {
    let blueprint = load_blueprint(file)?;
    let config = ConfigLoader::load()?;
    let report = BlueprintValidator::with_config(config.validation).validate(&blueprint);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let output = Output::new();
    output.header(&format!("Validation: {}", blueprint.request.title));
    output.field("Sections", blueprint.sections.len());
    output.validation(&report);

    if report.has_errors() {
        output.warning("Blueprint has errors; regenerate the flagged sections");
    } else {
        output.success("Blueprint is structurally complete");
    }
    Ok(())
}
