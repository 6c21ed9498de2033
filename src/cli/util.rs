//! CLI Common Utilities
//!
//! Shared initialization and blueprint file handling for CLI commands.

use std::fs;
use std::path::Path;

use crate::blueprint::Blueprint;
use crate::config::{ConfigLoader, ForgeRuntime};
use crate::types::{ForgeError, Result};

/// Load layered config and build the runtime.
///
/// `offline` swaps every configured provider for the offline generator.
pub fn load_runtime(offline: bool) -> Result<ForgeRuntime> {
    let config = ConfigLoader::load()?;
    let config = if offline { config.into_offline() } else { config };
    ForgeRuntime::from_config(config)
}

/// Read a blueprint saved by `generate`
pub fn load_blueprint(path: &Path) -> Result<Blueprint> {
    if !path.exists() {
        return Err(ForgeError::Config(format!(
            "Blueprint file not found: {}",
            path.display()
        )));
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write a blueprint as pretty JSON, plus a Markdown rendering next to it
pub fn save_blueprint(path: &Path, blueprint: &Blueprint) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(blueprint)?)?;
    fs::write(path.with_extension("md"), blueprint.to_markdown())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::SectionKind;
    use crate::config::Config;
    use crate::types::GenerationId;
    use crate::BlueprintRequest;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_blueprint_file_roundtrip() {
        let runtime = ForgeRuntime::from_config(Config::default().into_offline()).unwrap();
        let blueprint = runtime
            .orchestrator
            .generate_blueprint(
                GenerationId::new("file"),
                BlueprintRequest::new("Field Notes", "Offline-first note taking for researchers"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out/blueprint.json");
        save_blueprint(&path, &blueprint).unwrap();

        assert!(path.with_extension("md").exists());
        let loaded = load_blueprint(&path).unwrap();
        assert_eq!(loaded.id, blueprint.id);
        assert_eq!(loaded.sections, blueprint.sections);
        assert_eq!(loaded.metadata.ai_calls_used, blueprint.metadata.ai_calls_used);
        assert_eq!(loaded.validation.score, blueprint.validation.score);
        assert!(loaded.section(SectionKind::Roadmap).is_some());
    }

    #[test]
    fn test_missing_blueprint_file() {
        let temp = TempDir::new().unwrap();
        assert!(load_blueprint(&temp.path().join("nope.json")).is_err());
    }
}
