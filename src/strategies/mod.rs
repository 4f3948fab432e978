//! Engine-specific backup generators and the registry that selects them

pub mod dump;
pub mod mysql;
pub mod postgres;
pub mod sqlserver;

use crate::config::{Credentials, DatabaseConfig, Engine, SqlServerOptions};
use crate::error::{BackupError, ErrorKind};
use crate::models::{ArtifactName, BackupResult};
use crate::utils::executor::CommandExecutor;
use chrono::Local;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

pub use mysql::MySqlGenerator;
pub use postgres::PostgresGenerator;
pub use sqlserver::SqlServerGenerator;

/// Everything a generator needs besides the database config
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub destination_dir: PathBuf,
    /// Uncompressed artifact name; compression happens after generation
    pub artifact: ArtifactName,
    pub credentials: Credentials,
    pub timeout: Duration,
    pub sqlserver: SqlServerOptions,
}

impl GenerateRequest {
    pub fn output_path(&self) -> PathBuf {
        self.artifact.path_in(&self.destination_dir)
    }

    /// Point in time after which the generator must give up
    pub fn deadline(&self, started: Instant) -> Instant {
        started + self.timeout
    }
}

/// Trait for backup generators
///
/// Implementors write the artifact; `generate` wraps that with timing,
/// logging and the conversion of every failure into a `failed` result.
pub trait EngineGenerator: Send + Sync {
    /// Get generator name (for logging)
    fn name(&self) -> &'static str;

    /// Produce the artifact at `request.output_path()`
    fn write_artifact(
        &self,
        config: &DatabaseConfig,
        request: &GenerateRequest,
    ) -> Result<PathBuf, BackupError>;

    /// Run the generator; expected failures never escape as errors
    fn generate(&self, config: &DatabaseConfig, request: &GenerateRequest) -> BackupResult {
        let started_at = Local::now();
        let timer = Instant::now();

        info!(
            component = "generator",
            database = %config.name,
            "Starting {} backup of '{}'",
            self.name(),
            config.name
        );

        if !request.destination_dir.is_dir() {
            let err = BackupError::new(
                ErrorKind::Io,
                format!(
                    "destination {:?} is not a directory",
                    request.destination_dir
                ),
            );
            error!(component = "generator", database = %config.name, "{}", err);
            return BackupResult::failed(&config.name, config.engine.clone(), started_at, err);
        }

        let outcome = self.write_artifact(config, request).and_then(|path| {
            let size = std::fs::metadata(&path)
                .map_err(|e| BackupError::io("failed to stat artifact", e))?
                .len();
            Ok((path, size))
        });

        match outcome {
            Ok((path, size)) => {
                info!(
                    component = "generator",
                    database = %config.name,
                    "Backup written: {} ({:.2} MB, {:.2}s)",
                    path.display(),
                    size as f64 / (1024.0 * 1024.0),
                    timer.elapsed().as_secs_f64()
                );
                BackupResult::success(&config.name, config.engine.clone(), started_at, path, size)
            }
            Err(err) => {
                error!(
                    component = "generator",
                    database = %config.name,
                    "Backup failed after {:.2}s: {}",
                    timer.elapsed().as_secs_f64(),
                    err
                );
                BackupResult::failed(&config.name, config.engine.clone(), started_at, err)
            }
        }
    }
}

/// Registry mapping engine identifiers to generators
///
/// New engines are added with `register`; lookup never mutates.
#[derive(Clone, Default)]
pub struct StrategyFactory {
    generators: HashMap<String, Arc<dyn EngineGenerator>>,
}

impl StrategyFactory {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in MySQL, PostgreSQL and SQL Server generators
    pub fn with_defaults(executor: Arc<dyn CommandExecutor>) -> Self {
        let mut factory = Self::new();
        factory.register(
            "mysql",
            Arc::new(MySqlGenerator::new(Arc::clone(&executor))),
        );
        factory.register(
            "postgresql",
            Arc::new(PostgresGenerator::new(Arc::clone(&executor))),
        );
        factory.register(
            "sqlserver",
            Arc::new(SqlServerGenerator::with_sqlcmd(executor)),
        );
        factory
    }

    /// Register (or replace) the generator for an engine identifier
    pub fn register(&mut self, engine: &str, generator: Arc<dyn EngineGenerator>) {
        let key = Engine::from(engine).as_str().to_string();
        self.generators.insert(key, generator);
    }

    /// Look up the generator for an engine
    pub fn resolve(&self, engine: &Engine) -> Result<Arc<dyn EngineGenerator>, BackupError> {
        self.generators
            .get(engine.as_str())
            .cloned()
            .ok_or_else(|| {
                BackupError::new(
                    ErrorKind::UnsupportedEngine,
                    format!("no generator registered for engine '{}'", engine),
                )
            })
    }

    /// Registered engine identifiers, sorted
    pub fn supported_engines(&self) -> Vec<String> {
        let mut engines: Vec<String> = self.generators.keys().cloned().collect();
        engines.sort();
        engines
    }
}
