//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (~/.config/blueprint-forge/config.toml)
//! 3. Project config (.blueprint-forge/config.toml)
//! 4. Environment variables (FORGE_* prefix, `__` between nested keys)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::types::{ForgeError, Result};

const APP_DIR: &str = "blueprint-forge";
const PROJECT_DIR: &str = ".blueprint-forge";
const CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "FORGE_";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        Self::load_layered(
            Self::global_config_path().as_deref(),
            &Self::project_config_path(),
        )
    }

    /// Resolution chain with explicit file locations
    pub fn load_layered(global: Option<&Path>, project: &Path) -> Result<Config> {
        Self::extract(Self::figment(global, project, ENV_PREFIX))
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        Self::extract(
            Figment::new()
                .merge(Serialized::defaults(Config::default()))
                .merge(Toml::file(path)),
        )
    }

    fn figment(global: Option<&Path>, project: &Path, env_prefix: &str) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = global
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(global_path));
        }

        if project.exists() {
            debug!("Loading project config from: {}", project.display());
            figment = figment.merge(Toml::file(project));
        }

        // e.g. FORGE_RETRY__MAX_RETRIES -> retry.max_retries
        figment.merge(Env::prefixed(env_prefix).split("__").lowercase(true))
    }

    fn extract(figment: Figment) -> Result<Config> {
        let config: Config = figment
            .extract()
            .map_err(|e| ForgeError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Get path to global config directory (~/.config/blueprint-forge/)
    pub fn global_dir() -> Option<PathBuf> {
        env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                env::var("HOME")
                    .ok()
                    .map(|home| PathBuf::from(home).join(".config"))
            })
            .map(|p| p.join(APP_DIR))
    }

    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join(CONFIG_FILE))
    }

    pub fn project_dir() -> PathBuf {
        PathBuf::from(PROJECT_DIR)
    }

    pub fn project_config_path() -> PathBuf {
        Self::project_dir().join(CONFIG_FILE)
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Write a default config file into `dir`, keeping an existing one unless `force`
    pub fn init_in(dir: &Path, force: bool) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;

        let config_path = dir.join(CONFIG_FILE);
        if !config_path.exists() || force {
            fs::write(&config_path, Self::default_config_toml()?)?;
            info!("Created config: {}", config_path.display());
        } else {
            info!("Config exists: {}", config_path.display());
        }

        Ok(config_path)
    }

    pub fn init_global(force: bool) -> Result<PathBuf> {
        let global_dir = Self::global_dir().ok_or_else(|| {
            ForgeError::Config("Cannot determine global config directory".to_string())
        })?;
        Self::init_in(&global_dir, force)
    }

    pub fn init_project(force: bool) -> Result<PathBuf> {
        Self::init_in(&Self::project_dir(), force)
    }

    /// Default configuration rendered as commented TOML
    pub fn default_config_toml() -> Result<String> {
        let body = toml::to_string_pretty(&Config::default())?;
        Ok(format!(
            "# Blueprint Forge Configuration\n\
             # Project settings in {}/{} override the global file.\n\
             # Provider API keys are read from OPENAI_API_KEY when not set here.\n\n{}",
            PROJECT_DIR, CONFIG_FILE, body
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::manager::LoadBalancing;
    use crate::ai::provider::ProviderKind;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_files() {
        let temp = TempDir::new().unwrap();
        let config = ConfigLoader::extract(ConfigLoader::figment(
            None,
            &temp.path().join("missing.toml"),
            "FORGE_TEST_NONE_",
        ))
        .unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.providers[0].kind, ProviderKind::Openai);
    }

    #[test]
    fn test_project_overrides_global() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("global.toml");
        let project = temp.path().join("project.toml");
        fs::write(
            &global,
            "[retry]\nmax_retries = 1\nbase_delay_ms = 10\n\n[routing]\nstrategy = \"priority\"\n",
        )
        .unwrap();
        fs::write(&project, "[retry]\nmax_retries = 5\n").unwrap();

        let config = ConfigLoader::extract(ConfigLoader::figment(
            Some(&global),
            &project,
            "FORGE_TEST_LAYER_",
        ))
        .unwrap();

        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 10);
        assert_eq!(config.routing.strategy, LoadBalancing::Priority);
    }

    #[test]
    fn test_env_override_nested_key() {
        let temp = TempDir::new().unwrap();
        // SAFETY: the prefix is unique to this test
        unsafe {
            env::set_var("FORGE_TEST_ENV_CACHE__ENABLED", "true");
            env::set_var("FORGE_TEST_ENV_CACHE__TTL_SECS", "42");
        }
        let config = ConfigLoader::extract(ConfigLoader::figment(
            None,
            &temp.path().join("none.toml"),
            "FORGE_TEST_ENV_",
        ))
        .unwrap();
        unsafe {
            env::remove_var("FORGE_TEST_ENV_CACHE__ENABLED");
            env::remove_var("FORGE_TEST_ENV_CACHE__TTL_SECS");
        }

        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl_secs, 42);
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.toml");
        fs::write(&path, "[generation]\ntemperature = 9.0\n").unwrap();

        assert!(matches!(
            ConfigLoader::load_from_file(&path),
            Err(ForgeError::Config(_))
        ));
    }

    #[test]
    fn test_init_writes_loadable_config() {
        let temp = TempDir::new().unwrap();
        let path = ConfigLoader::init_in(temp.path(), false).unwrap();
        assert!(path.exists());

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.providers.len(), 1);

        fs::write(&path, "version = \"custom\"\n").unwrap();
        ConfigLoader::init_in(temp.path(), false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "version = \"custom\"\n");

        ConfigLoader::init_in(temp.path(), true).unwrap();
        assert!(fs::read_to_string(&path).unwrap().starts_with("# Blueprint Forge"));
    }

    #[test]
    fn test_provider_list_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("providers.toml");
        fs::write(
            &path,
            r#"
[[providers]]
name = "primary"
kind = "openai"
models = ["gpt-4o"]
api_base = "https://llm.internal.example/v1"

[[providers]]
name = "local"
kind = "offline"

[routing]
strategy = "least_cost"
fallback_chain = ["primary", "local"]
"#,
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[1].kind, ProviderKind::Offline);
        assert_eq!(config.routing.fallback_chain, vec!["primary", "local"]);
    }
}
