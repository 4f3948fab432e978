//! Configuration module for db-backup-manager
//!
//! This module handles loading and validating configuration from JSON or TOML
//! files and resolving credential references.
//!
//! ## Example Usage
//!
//! ```no_run
//! use db_backup_manager::config;
//!
//! let config = config::load_config("config.json")?;
//!
//! for db in &config.databases {
//!     println!("Database: {} ({})", db.name, db.engine);
//! }
//! # Ok::<(), config::ConfigError>(())
//! ```

mod loader;
mod secrets;
mod types;

pub use loader::{
    example_config, load_config, validate_config, validate_databases, ConfigError, Result,
};
pub use secrets::{Credentials, EnvSecretsProvider, SecretsProvider, StaticSecretsProvider};
pub use types::*;

/// Expand tilde (~) in path
pub fn expand_tilde(path: &std::path::Path) -> std::path::PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}
