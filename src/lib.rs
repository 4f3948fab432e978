//! Database Backup Manager Library
//!
//! Scheduled backups of MySQL/MariaDB, PostgreSQL and SQL Server databases
//! with engine-specific generators and a retention policy over the artifacts.

pub mod config;
pub mod error;
pub mod managers;
pub mod models;
pub mod strategies;
pub mod utils;

// Re-export commonly used types
pub use config::{load_config, Config, DatabaseConfig, Engine};
pub use error::{BackupError, ErrorKind, RunError};
pub use managers::backup::{BackupOrchestrator, CycleReport, RunTrigger};
pub use managers::cleanup::{CleanupService, StorageStats, SweepReport};
pub use managers::logging::{init_console_logging, init_logging, LogGuard, LoggingConfig};
pub use managers::scheduler::{next_fire_time, Scheduler, SchedulerHandle, SchedulerState};
pub use managers::stats::{RunSummary, Stats, StatsStore};
pub use models::{Artifact, ArtifactName, BackupResult, BackupStatus, SkipReason};
pub use strategies::{EngineGenerator, StrategyFactory};
