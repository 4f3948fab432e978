//! MySQL / MariaDB backups via `mysqldump`

use super::dump::run_dump;
use super::{EngineGenerator, GenerateRequest};
use crate::config::{Credentials, DatabaseConfig};
use crate::error::BackupError;
use crate::utils::command::CommandSpec;
use crate::utils::executor::CommandExecutor;
use std::path::PathBuf;
use std::sync::Arc;

pub struct MySqlGenerator {
    executor: Arc<dyn CommandExecutor>,
}

impl MySqlGenerator {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Build the `mysqldump` invocation; the password travels in `MYSQL_PWD`
    pub fn command(
        config: &DatabaseConfig,
        credentials: &Credentials,
        request: &GenerateRequest,
    ) -> CommandSpec {
        CommandSpec::new("mysqldump")
            .arg(format!("--host={}", config.host))
            .arg(format!("--port={}", config.port))
            .arg(format!("--user={}", credentials.user))
            .args([
                "--single-transaction",
                "--routines",
                "--triggers",
                "--events",
                "--quick",
                "--lock-tables=false",
                "--add-drop-database",
                "--default-character-set=utf8mb4",
                "--databases",
            ])
            .arg(config.database_name())
            .env("MYSQL_PWD", credentials.password.clone())
            .timeout(request.timeout)
    }
}

impl EngineGenerator for MySqlGenerator {
    fn name(&self) -> &'static str {
        "mysql"
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
