use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default, alias = "backup-settings")]
    pub backup_settings: BackupSettings,

    #[serde(default)]
    pub databases: Vec<DatabaseConfig>,

    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Database engine identifier
///
/// Known engines have their own variant; anything else is carried verbatim so
/// the orchestrator can report it as unsupported instead of dropping it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum Engine {
    Mysql,
    Postgresql,
    Sqlserver,
    Other(String),
}

impl Engine {
    /// Registry key for this engine
    pub fn as_str(&self) -> &str {
        match self {
            Engine::Mysql => "mysql",
            Engine::Postgresql => "postgresql",
            Engine::Sqlserver => "sqlserver",
            Engine::Other(name) => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Engine::Other(_))
    }
}

impl From<&str> for Engine {
    fn from(value: &str) -> Self {
        let normalized = value.trim().to_lowercase();
        match normalized.as_str() {
            "mysql" | "mariadb" => Engine::Mysql,
            "postgresql" | "postgres" => Engine::Postgresql,
            "sqlserver" | "mssql" => Engine::Sqlserver,
            _ => Engine::Other(normalized),
        }
    }
}

impl From<String> for Engine {
    fn from(value: String) -> Self {
        Engine::from(value.as_str())
    }
}

impl From<Engine> for String {
    fn from(engine: Engine) -> Self {
        engine.as_str().to_string()
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured backup target
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Unique identifier, also the artifact file prefix
    pub name: String,

    #[serde(alias = "type")]
    pub engine: Engine,

    #[serde(default = "default_host")]
    pub host: String,

    pub port: u16,

    /// Reference resolved by the secrets provider at invocation time
    #[serde(alias = "credentials")]
    pub credentials_ref: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Catalog name on the server when it differs from `name`
    #[serde(default)]
    pub database: Option<String>,
}

impl DatabaseConfig {
    /// Name of the database on the server
    pub fn database_name(&self) -> &str {
        self.database.as_deref().unwrap_or(&self.name)
    }
}

/// Wall-clock time of day (`HH:MM`, 24h) at which the daily run fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScheduleTime(NaiveTime);

impl ScheduleTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }
}

impl FromStr for ScheduleTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("schedule time must be HH:MM (24h), got '{}'", s);

        let (hours, minutes) = s.trim().split_once(':').ok_or_else(invalid)?;
        if hours.len() != 2 || minutes.len() != 2 {
            return Err(invalid());
        }

        let hour: u32 = hours.parse().map_err(|_| invalid())?;
        let minute: u32 = minutes.parse().map_err(|_| invalid())?;

        if hour > 23 || minute > 59 {
            return Err(invalid());
        }

        Self::new(hour, minute).ok_or_else(invalid)
    }
}

impl TryFrom<String> for ScheduleTime {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScheduleTime> for String {
    fn from(time: ScheduleTime) -> Self {
        time.to_string()
    }
}

impl fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0.hour(), self.0.minute())
    }
}

/// What happens to a manual trigger that arrives while a run is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ManualTriggerPolicy {
    /// Drop it; the in-flight run already covers the request
    #[default]
    Coalesce,
    /// Keep one pending trigger and run again right after
    Queue,
}

/// SQL Server script generator tunables
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SqlServerOptions {
    /// Rows per INSERT statement (SQL Server caps a VALUES list at 1000)
    #[serde(default = "default_batch_rows")]
    pub batch_rows: usize,

    /// Approximate byte size at which an INSERT batch is closed early
    #[serde(default = "default_batch_bytes")]
    pub batch_bytes: usize,
}

impl Default for SqlServerOptions {
    fn default() -> Self {
        Self {
            batch_rows: default_batch_rows(),
            batch_bytes: default_batch_bytes(),
        }
    }
}

/// Process-wide backup policy, immutable for the duration of a run
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackupSettings {
    #[serde(default = "default_retention_days", alias = "retention_days")]
    pub daily_retention_days: u32,

    #[serde(default = "default_schedule_time", alias = "schedule")]
    pub schedule_time: ScheduleTime,

    #[serde(default = "default_compress")]
    pub compress: bool,

    /// Directory holding the artifacts
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    #[serde(default = "default_timeout")]
    pub per_database_timeout_seconds: u64,

    /// Databases backed up concurrently within one run
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    #[serde(default)]
    pub manual_trigger: ManualTriggerPolicy,

    #[serde(default)]
    pub sqlserver: SqlServerOptions,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            daily_retention_days: default_retention_days(),
            schedule_time: default_schedule_time(),
            compress: default_compress(),
            backup_dir: default_backup_dir(),
            per_database_timeout_seconds: default_timeout(),
            max_parallel: default_max_parallel(),
            manual_trigger: ManualTriggerPolicy::default(),
            sqlserver: SqlServerOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_log_max_files")]
    pub max_files: u32,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            level: default_log_level(),
            format: LogFormat::default(),
            max_files: default_log_max_files(),
        }
    }
}

// Default value functions

fn default_host() -> String { "localhost".to_string() }
fn default_enabled() -> bool { true }
fn default_retention_days() -> u32 { 7 }
fn default_schedule_time() -> ScheduleTime {
    ScheduleTime(NaiveTime::from_hms_opt(2, 0, 0).unwrap_or(NaiveTime::MIN))
}
fn default_compress() -> bool { true }
fn default_backup_dir() -> PathBuf { PathBuf::from("Backups") }
fn default_timeout() -> u64 { 3600 }
fn default_max_parallel() -> usize { 1 }
fn default_batch_rows() -> usize { 500 }
fn default_batch_bytes() -> usize { 256 * 1024 }
fn default_log_directory() -> PathBuf { PathBuf::from("Logs") }
fn default_log_level() -> String { "info".to_string() }
fn default_log_max_files() -> u32 { 10 }
