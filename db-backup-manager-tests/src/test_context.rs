//! Test context and harness for component testing
//!
//! Provides a unified context for setting up and tearing down test environments.

use crate::config_builder::ConfigBuilder;
use anyhow::Result;
use db_backup_manager::config::Config;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test context that manages test resources and provides common utilities
pub struct TestContext {
    /// Temporary directory for test files
    temp_dir: TempDir,
    /// The test configuration
    config: Option<Config>,
}

impl TestContext {
    /// Create a new test context with a temporary directory
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
            config: None,
        }
    }

    /// Create a test context with a minimal configuration
    pub fn with_minimal_config() -> Self {
        Self::from_builder(ConfigBuilder::minimal())
    }

    /// Create a test context from a ConfigBuilder
    pub fn from_builder(builder: ConfigBuilder) -> Self {
        let (config, temp_dir) = builder.persist();

        Self {
            temp_dir,
            config: Some(config),
        }
    }

    /// Get the temporary directory path
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Get the configuration
    pub fn config(&self) -> Option<&Config> {
        self.config.as_ref()
    }

    /// Path of the persisted `config.json`
    pub fn config_path(&self) -> PathBuf {
        self.temp_dir.path().join("config.json")
    }

    /// Backup directory of the configuration (or `backups/` in the temp dir)
    pub fn backup_dir(&self) -> PathBuf {
        self.config
            .as_ref()
            .map(|c| c.backup_settings.backup_dir.clone())
            .unwrap_or_else(|| self.temp_dir.path().join("backups"))
    }

    /// Create a file in the temp dir
    pub fn create_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Check if a file exists in the backup directory
    pub fn artifact_exists(&self, name: &str) -> bool {
        self.backup_dir().join(name).exists()
    }

    /// File names in the backup directory, sorted, dotfiles excluded
    pub fn artifacts(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.backup_dir())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .filter(|n| !n.starts_with('.'))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Read a file from the backup directory
    pub fn read_artifact(&self, name: &str) -> Result<String> {
        Ok(std::fs::read_to_string(self.backup_dir().join(name))?)
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Extension trait for assertion helpers
pub trait ResultAssertions<T> {
    /// Assert that the result is Ok and return the value
    fn assert_ok(self) -> T;

    /// Assert that the result is Err and the error message contains the given string
    fn assert_err_contains(self, needle: &str);
}

impl<T: std::fmt::Debug, E: std::fmt::Debug + std::fmt::Display> ResultAssertions<T> for Result<T, E> {
    fn assert_ok(self) -> T {
        match self {
            Ok(v) => v,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    }

    fn assert_err_contains(self, needle: &str) {
        match self {
            Ok(v) => panic!("Expected Err containing '{}', got Ok: {:?}", needle, v),
            Err(e) => {
                let err_msg = e.to_string();
                assert!(
                    err_msg.contains(needle),
                    "Error '{}' does not contain '{}'",
                    err_msg,
                    needle
                );
            }
        }
    }
}

/// Extension trait for Option assertions
pub trait OptionAssertions<T> {
    /// Assert that the option is Some and return the value
    fn assert_some(self) -> T;
}

impl<T: std::fmt::Debug> OptionAssertions<T> for Option<T> {
    fn assert_some(self) -> T {
        match self {
            Some(v) => v,
            None => panic!("Expected Some, got None"),
        }
    }
}
