//! Fluent API for building test configurations
//!
//! Provides a builder pattern for creating test configurations with sensible defaults.

use db_backup_manager::config::{
    BackupSettings, Config, DatabaseConfig, Engine, LoggingSettings, ManualTriggerPolicy,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Builder for creating test configurations
pub struct ConfigBuilder {
    temp_dir: TempDir,
    settings: BackupSettings,
    databases: Vec<DatabaseConfig>,
    logging: LoggingSettings,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder with backup and log directories inside a temp dir
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let backup_dir = temp_dir.path().join("backups");
        fs::create_dir_all(&backup_dir).expect("Failed to create backup dir");

        let log_directory = temp_dir.path().join("logs");
        fs::create_dir_all(&log_directory).expect("Failed to create log directory");

        let settings = BackupSettings {
            backup_dir,
            compress: false,
            per_database_timeout_seconds: 60,
            ..BackupSettings::default()
        };

        let logging = LoggingSettings {
            directory: log_directory,
            ..LoggingSettings::default()
        };

        Self {
            temp_dir,
            settings,
            databases: Vec::new(),
            logging,
        }
    }

    /// Config with one enabled MySQL database named `shop`
    pub fn minimal() -> Self {
        Self::new().add_database("shop", "mysql")
    }

    /// Add an enabled database; the credentials reference is the upper-cased name
    pub fn add_database(mut self, name: &str, engine: &str) -> Self {
        let port = match Engine::from(engine) {
            Engine::Mysql => 3306,
            Engine::Postgresql => 5432,
            Engine::Sqlserver => 1433,
            Engine::Other(_) => 1,
        };

        self.databases.push(DatabaseConfig {
            name: name.to_string(),
            engine: Engine::from(engine),
            host: "localhost".to_string(),
            port,
            credentials_ref: name.to_uppercase(),
            enabled: true,
            database: None,
        });
        self
    }

    /// Add a database with `enabled = false`
    pub fn add_disabled_database(mut self, name: &str, engine: &str) -> Self {
        self = self.add_database(name, engine);
        if let Some(db) = self.databases.last_mut() {
            db.enabled = false;
        }
        self
    }

    pub fn with_retention(mut self, days: u32) -> Self {
        self.settings.daily_retention_days = days;
        self
    }

    pub fn with_compress(mut self, compress: bool) -> Self {
        self.settings.compress = compress;
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.settings.max_parallel = max_parallel;
        self
    }

    pub fn with_manual_trigger(mut self, policy: ManualTriggerPolicy) -> Self {
        self.settings.manual_trigger = policy;
        self
    }

    /// Backup directory the built config points at
    pub fn backup_dir(&self) -> &Path {
        &self.settings.backup_dir
    }

    /// Build the configuration (temp dir is dropped)
    pub fn build(self) -> Config {
        self.build_inner().0
    }

    /// Build and write `config.json` into the temp dir, keeping the dir alive
    pub fn persist(self) -> (Config, TempDir) {
        let (config, temp_dir) = self.build_inner();
        let json = serde_json::to_string_pretty(&config).expect("Failed to serialize config");
        fs::write(temp_dir.path().join("config.json"), json).expect("Failed to write config");
        (config, temp_dir)
    }

    /// Path of the file written by `persist`
    pub fn config_path(temp_dir: &TempDir) -> PathBuf {
        temp_dir.path().join("config.json")
    }

    fn build_inner(self) -> (Config, TempDir) {
        let config = Config {
            backup_settings: self.settings,
            databases: self.databases,
            logging: self.logging,
        };
        (config, self.temp_dir)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
