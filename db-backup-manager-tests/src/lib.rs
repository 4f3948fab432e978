//! Test utilities for db-backup-manager
//!
//! This crate provides shared test utilities, fixtures and helper functions
//! for testing the backup orchestrator, generators and retention sweep.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_utils::{ConfigBuilder, TestContext};
//!
//! #[test]
//! fn my_test() {
//!     let ctx = TestContext::from_builder(ConfigBuilder::new().add_database("shop", "mysql"));
//!     let config = ctx.config().unwrap();
//!     // ... test code
//! }
//! ```

pub mod config_builder;
pub mod fixtures;
pub mod test_context;

// Re-export commonly used items
pub use config_builder::ConfigBuilder;
pub use fixtures::*;
pub use test_context::{OptionAssertions, ResultAssertions, TestContext};

// Re-export types from the main crate for convenience
pub use db_backup_manager::config::{
    BackupSettings, Config, Credentials, DatabaseConfig, Engine, LoggingSettings,
    ManualTriggerPolicy, StaticSecretsProvider,
};
pub use db_backup_manager::models::{Artifact, ArtifactName, BackupResult, BackupStatus, SkipReason};

// Re-export mock implementations from the main crate
pub use db_backup_manager::strategies::sqlserver::catalog::InMemoryCatalog;
pub use db_backup_manager::utils::executor::mock::{MockExecutor, MockResponse};
pub use db_backup_manager::utils::executor::CommandExecutor;

/// Common test result type
pub type TestResult<T = ()> = anyhow::Result<T>;
