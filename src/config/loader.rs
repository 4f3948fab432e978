use super::types::*;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse JSON config: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to parse TOML config: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database '{0}' is configured more than once")]
    DuplicateDatabase(String),

    #[error("Database '{name}': unsupported engine '{engine}'")]
    UnknownEngine { name: String, engine: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Load and validate configuration from a JSON or TOML file
///
/// The format is picked from the extension: `.toml` is TOML, anything else is JSON.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);

    let config: Config = if is_toml {
        toml::from_str(&contents)?
    } else {
        serde_json::from_str(&contents)?
    };

    validate_config(&config)?;

    info!(
        component = "config",
        "Configuration loaded from {:?} ({} database(s))",
        path,
        config.databases.len()
    );

    Ok(config)
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_settings(&config.backup_settings)?;
    validate_databases(&config.databases)?;

    if config.databases.is_empty() {
        warn!(component = "config", "No databases configured");
    }

    Ok(())
}

fn validate_settings(settings: &BackupSettings) -> Result<()> {
    if settings.daily_retention_days < 1 {
        return Err(ConfigError::ValidationError(
            "daily_retention_days must be at least 1".to_string(),
        ));
    }

    if settings.per_database_timeout_seconds == 0 {
        return Err(ConfigError::ValidationError(
            "per_database_timeout_seconds must be at least 1".to_string(),
        ));
    }

    if settings.max_parallel == 0 {
        return Err(ConfigError::ValidationError(
            "max_parallel must be at least 1".to_string(),
        ));
    }

    if settings.sqlserver.batch_rows == 0 || settings.sqlserver.batch_rows > 1000 {
        return Err(ConfigError::ValidationError(format!(
            "sqlserver.batch_rows must be between 1 and 1000, got {}",
            settings.sqlserver.batch_rows
        )));
    }

    Ok(())
}

/// Shape checks over the database list
///
/// Duplicate names are also re-checked by the orchestrator before a run starts,
/// since configs may reach it without going through this loader.
pub fn validate_databases(databases: &[DatabaseConfig]) -> Result<()> {
    let mut seen = HashSet::new();

    for db in databases {
        if db.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database name must not be empty".to_string(),
            ));
        }

        if !seen.insert(db.name.as_str()) {
            return Err(ConfigError::DuplicateDatabase(db.name.clone()));
        }

        if !db.engine.is_known() {
            return Err(ConfigError::UnknownEngine {
                name: db.name.clone(),
                engine: db.engine.to_string(),
            });
        }

        if db.port == 0 {
            return Err(ConfigError::ValidationError(format!(
                "Database '{}': port must be between 1 and 65535",
                db.name
            )));
        }

        if db.credentials_ref.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "Database '{}': credentials_ref must not be empty",
                db.name
            )));
        }
    }

    Ok(())
}

/// Example configuration written by `--init`
pub fn example_config() -> Config {
    Config {
        backup_settings: BackupSettings::default(),
        databases: vec![
            DatabaseConfig {
                name: "erp".to_string(),
                engine: Engine::Sqlserver,
                host: "sql01\\PROD".to_string(),
                port: 1433,
                credentials_ref: "MSSQL".to_string(),
                enabled: true,
                database: Some("ErpAppDb".to_string()),
            },
            DatabaseConfig {
                name: "shop".to_string(),
                engine: Engine::Mysql,
                host: "localhost".to_string(),
                port: 3306,
                credentials_ref: "DB".to_string(),
                enabled: false,
                database: None,
            },
            DatabaseConfig {
                name: "analytics".to_string(),
                engine: Engine::Postgresql,
                host: "localhost".to_string(),
                port: 5432,
                credentials_ref: "PG".to_string(),
                enabled: false,
                database: None,
            },
        ],
        logging: LoggingSettings::default(),
    }
}
