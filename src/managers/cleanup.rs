//! Retention sweep over the artifact directory
//!
//! January 1 artifacts are kept forever. Every other artifact is deleted once
//! its age in days exceeds `daily_retention_days`. Files that follow the
//! naming contract are dated by their name; legacy backup files by mtime.

use crate::config::BackupSettings;
use crate::error::{BackupError, ErrorKind};
use crate::models::{Artifact, ArtifactName};
use crate::utils::clock::{Clock, SystemClock};
use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Extensions of files produced by older versions of the tool
const LEGACY_EXTENSIONS: &[&str] = &[".sql", ".sql.gz", ".bak", ".bak.gz", ".dump"];

/// Artifact that could not be deleted
#[derive(Debug, Clone)]
pub struct CleanupFailure {
    pub artifact: Artifact,
    pub error: BackupError,
}

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub deleted: Vec<Artifact>,
    /// Annual artifacts seen during the sweep
    pub kept_annual: Vec<Artifact>,
    pub errors: Vec<CleanupFailure>,
}

impl SweepReport {
    pub fn freed_bytes(&self) -> u64 {
        self.deleted.iter().map(|a| a.size_bytes).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub total_files: usize,
    pub total_bytes: u64,
    pub oldest: Option<Artifact>,
    pub newest: Option<Artifact>,
}

pub struct CleanupService {
    clock: Arc<dyn Clock>,
}

impl Default for CleanupService {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl CleanupService {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Sweep `dir` as of now
    pub fn sweep(&self, dir: &Path, settings: &BackupSettings) -> Result<SweepReport, BackupError> {
        sweep_at(dir, settings, self.clock.now(), None)
    }

    /// Sweep after a run; files modified after `run_started` are left alone
    pub fn sweep_after_run(
        &self,
        dir: &Path,
        settings: &BackupSettings,
        run_started: SystemTime,
    ) -> Result<SweepReport, BackupError> {
        sweep_at(dir, settings, self.clock.now(), Some(run_started))
    }

    pub fn storage_stats(&self, dir: &Path) -> io::Result<StorageStats> {
        storage_stats(dir)
    }
}

/// Whole days between `date` and `today`
pub fn age_in_days(date: NaiveDate, today: NaiveDate) -> i64 {
    (today - date).num_days()
}

/// True when the artifact is past retention and not annual
pub fn is_expired(artifact: &Artifact, today: NaiveDate, retention_days: u32) -> bool {
    !artifact.is_annual() && age_in_days(artifact.date, today) > i64::from(retention_days)
}

fn is_legacy_backup(file_name: &str) -> bool {
    LEGACY_EXTENSIONS.iter().any(|ext| file_name.ends_with(ext))
}

/// Backup artifacts in `dir`; a missing directory has none
pub fn scan_artifacts(dir: &Path) -> io::Result<Vec<(Artifact, Option<SystemTime>)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut artifacts = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let metadata = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        let file_name = entry.file_name().to_string_lossy().to_string();
        let modified = metadata.modified().ok();

        let name = ArtifactName::parse(&file_name);
        let date = match (&name, modified) {
            (Some(name), _) => name.date,
            (None, Some(mtime)) if is_legacy_backup(&file_name) => {
                DateTime::<Local>::from(mtime).date_naive()
            }
            _ => continue,
        };

        artifacts.push((
            Artifact {
                path: entry.path(),
                date,
                name,
                size_bytes: metadata.len(),
            },
            modified,
        ));
    }

    artifacts.sort_by(|(a, _), (b, _)| a.date.cmp(&b.date).then_with(|| a.path.cmp(&b.path)));
    Ok(artifacts)
}

/// Apply the retention rule to `dir` as of `now`
///
/// Deletion failures are collected per artifact; only an unreadable
/// directory fails the sweep as a whole.
pub fn sweep_at(
    dir: &Path,
    settings: &BackupSettings,
    now: DateTime<Local>,
    run_started: Option<SystemTime>,
) -> Result<SweepReport, BackupError> {
    let today = now.date_naive();
    let retention = settings.daily_retention_days;
    let mut report = SweepReport::default();

    let artifacts = scan_artifacts(dir).map_err(|e| {
        BackupError::new(
            ErrorKind::CleanupIo,
            format!("cannot read backup directory {}: {}", dir.display(), e),
        )
    })?;

    for (artifact, modified) in artifacts {
        if artifact.is_annual() {
            debug!(component = "cleanup", "Keeping annual artifact {}", artifact.file_name());
            report.kept_annual.push(artifact);
            continue;
        }

        if let (Some(started), Some(modified)) = (run_started, modified) {
            if modified > started {
                continue;
            }
        }

        if !is_expired(&artifact, today, retention) {
            continue;
        }

        match fs::remove_file(&artifact.path) {
            Ok(()) => {
                info!(
                    component = "cleanup",
                    "Deleted {} ({} days old)",
                    artifact.file_name(),
                    age_in_days(artifact.date, today)
                );
                report.deleted.push(artifact);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(component = "cleanup", "{} already gone", artifact.file_name());
            }
            Err(e) => {
                warn!(
                    component = "cleanup",
                    "Failed to delete {}: {}",
                    artifact.file_name(),
                    e
                );
                let error = BackupError::new(
                    ErrorKind::CleanupIo,
                    format!("failed to delete {}: {}", artifact.path.display(), e),
                );
                report.errors.push(CleanupFailure { artifact, error });
            }
        }
    }

    info!(
        component = "cleanup",
        "Retention sweep: {} deleted ({:.2} MB), {} annual kept, {} errors",
        report.deleted.len(),
        report.freed_bytes() as f64 / (1024.0 * 1024.0),
        report.kept_annual.len(),
        report.errors.len()
    );

    Ok(report)
}

/// File count, total size and date range of the artifacts in `dir`
pub fn storage_stats(dir: &Path) -> io::Result<StorageStats> {
    let artifacts: Vec<Artifact> = scan_artifacts(dir)?.into_iter().map(|(a, _)| a).collect();

    Ok(StorageStats {
        total_files: artifacts.len(),
        total_bytes: artifacts.iter().map(|a| a.size_bytes).sum(),
        oldest: artifacts.first().cloned(),
        newest: artifacts.last().cloned(),
    })
}
