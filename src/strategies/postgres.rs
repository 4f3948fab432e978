//! PostgreSQL backups via `pg_dump`

use super::dump::run_dump;
use super::{EngineGenerator, GenerateRequest};
use crate::config::{Credentials, DatabaseConfig};
use crate::error::BackupError;
use crate::utils::command::CommandSpec;
use crate::utils::executor::CommandExecutor;
use std::path::PathBuf;
use std::sync::Arc;

pub struct PostgresGenerator {
    executor: Arc<dyn CommandExecutor>,
}

impl PostgresGenerator {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Build the `pg_dump` invocation; credentials travel in `PGUSER`/`PGPASSWORD`
    pub fn command(
        config: &DatabaseConfig,
        credentials: &Credentials,
        request: &GenerateRequest,
    ) -> CommandSpec {
        CommandSpec::new("pg_dump")
            .arg(format!("--host={}", config.host))
            .arg(format!("--port={}", config.port))
            .args([
                "--format=plain",
                "--clean",
                "--if-exists",
                "--create",
                "--encoding=UTF8",
                "--no-owner",
                "--no-privileges",
                "--no-password",
            ])
            .arg(config.database_name())
            .env("PGUSER", credentials.user.clone())
            .env("PGPASSWORD", credentials.password.clone())
            .timeout(request.timeout)
    }
}

impl EngineGenerator for PostgresGenerator {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn write_artifact(
        &self,
        config: &DatabaseConfig,
        request: &GenerateRequest,
    ) -> Result<PathBuf, BackupError> {
        let output = request.output_path();
        let spec = Self::command(config, &request.credentials, request);
        run_dump(self.executor.as_ref(), spec, &output)?;
        Ok(output)
    }
}
