//! Configuration Management
//!
//! Hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/blueprint-forge/config.toml)
//! 3. Project config (.blueprint-forge/config.toml)
//! 4. Environment variables (FORGE_*)
//! 5. CLI arguments (highest priority)

mod loader;
mod runtime;
mod types;

pub use loader::ConfigLoader;
pub use runtime::ForgeRuntime;
pub use types::*;
