use crate::config::Engine;
use crate::error::{BackupError, ErrorKind};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    Success,
    Failed,
    Skipped,
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackupStatus::Success => "success",
            BackupStatus::Failed => "failed",
            BackupStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipReason {
    Disabled,
    Cancelled,
}

/// Outcome of one generator invocation
///
/// Fields are private so the status invariants hold: `output_path` is set iff
/// `Success`, the error iff `Failed`, the skip reason iff `Skipped`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupResult {
    database_name: String,
    engine: Engine,
    started_at: DateTime<Local>,
    finished_at: DateTime<Local>,
    status: BackupStatus,
    output_path: Option<PathBuf>,
    size_bytes: u64,
    error_kind: Option<ErrorKind>,
    error_message: Option<String>,
    skip_reason: Option<SkipReason>,
}

impl BackupResult {
    pub fn success(
        database_name: &str,
        engine: Engine,
        started_at: DateTime<Local>,
        output_path: PathBuf,
        size_bytes: u64,
    ) -> Self {
        Self {
            database_name: database_name.to_string(),
            engine,
            started_at,
            finished_at: Local::now().max(started_at),
            status: BackupStatus::Success,
            output_path: Some(output_path),
            size_bytes,
            error_kind: None,
            error_message: None,
            skip_reason: None,
        }
    }

    pub fn failed(
        database_name: &str,
        engine: Engine,
        started_at: DateTime<Local>,
        error: BackupError,
    ) -> Self {
        Self {
            database_name: database_name.to_string(),
            engine,
            started_at,
            finished_at: Local::now().max(started_at),
            status: BackupStatus::Failed,
            output_path: None,
            size_bytes: 0,
            error_kind: Some(error.kind),
            error_message: Some(error.message),
            skip_reason: None,
        }
    }

    pub fn skipped(database_name: &str, engine: Engine, reason: SkipReason) -> Self {
        let now = Local::now();
        Self {
            database_name: database_name.to_string(),
            engine,
            started_at: now,
            finished_at: now,
            status: BackupStatus::Skipped,
            output_path: None,
            size_bytes: 0,
            error_kind: None,
            error_message: None,
            skip_reason: Some(reason),
        }
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Local> {
        self.finished_at
    }

    pub fn status(&self) -> BackupStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == BackupStatus::Success
    }

    pub fn is_failed(&self) -> bool {
        self.status == BackupStatus::Failed
    }

    pub fn output_path(&self) -> Option<&PathBuf> {
        self.output_path.as_ref()
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        self.skip_reason
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

impl fmt::Display for BackupResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            BackupStatus::Success => write!(
                f,
                "✓ {}: {} ({:.2}s)",
                self.database_name,
                self.output_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                self.duration_secs()
            ),
            BackupStatus::Failed => write!(
                f,
                "✗ {}: {}",
                self.database_name,
                self.error_message.as_deref().unwrap_or("unknown error")
            ),
            BackupStatus::Skipped => write!(f, "- {}: skipped", self.database_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_invariants() {
        let result = BackupResult::success(
            "erp",
            Engine::Sqlserver,
            Local::now(),
            PathBuf::from("/b/erp_20250101.sql"),
            42,
        );
        assert!(result.is_success());
        assert!(result.output_path().is_some());
        assert!(result.error_message().is_none());
        assert!(result.finished_at() >= result.started_at());
    }

    #[test]
    fn test_failed_invariants() {
        let result = BackupResult::failed(
            "erp",
            Engine::Mysql,
            Local::now(),
            BackupError::new(ErrorKind::Auth, "Access denied"),
        );
        assert!(result.is_failed());
        assert!(result.output_path().is_none());
        assert_eq!(result.error_kind(), Some(ErrorKind::Auth));
        assert_eq!(result.error_message(), Some("Access denied"));
        assert!(result.to_string().contains("Access denied"));
    }

    #[test]
    fn test_skipped_invariants() {
        let result = BackupResult::skipped("erp", Engine::Mysql, SkipReason::Disabled);
        assert_eq!(result.status(), BackupStatus::Skipped);
        assert_eq!(result.skip_reason(), Some(SkipReason::Disabled));
        assert!(result.error_message().is_none());
        assert!(result.output_path().is_none());
    }
}
