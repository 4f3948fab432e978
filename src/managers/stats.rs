//! Run statistics persisted next to the artifacts as `.backup-stats.json`

use crate::error::ErrorKind;
use crate::models::{BackupResult, BackupStatus};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const STATS_FILE: &str = ".backup-stats.json";

/// History entries kept per database
pub const HISTORY_PER_DATABASE: usize = 30;

/// Totals for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub bytes_written: u64,
    #[serde(default)]
    pub deleted_artifacts: usize,
    #[serde(default)]
    pub cleanup_errors: usize,
}

impl RunSummary {
    pub fn from_results(
        started_at: DateTime<Local>,
        finished_at: DateTime<Local>,
        results: &[BackupResult],
    ) -> Self {
        let count = |status: BackupStatus| results.iter().filter(|r| r.status() == status).count();

        Self {
            started_at,
            finished_at,
            total: results.len(),
            succeeded: count(BackupStatus::Success),
            failed: count(BackupStatus::Failed),
            skipped: count(BackupStatus::Skipped),
            bytes_written: results.iter().map(|r| r.size_bytes()).sum(),
            deleted_artifacts: 0,
            cleanup_errors: 0,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// One database's outcome in a past run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub started_at: DateTime<Local>,
    pub status: BackupStatus,
    pub duration_secs: f64,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&BackupResult> for HistoryEntry {
    fn from(result: &BackupResult) -> Self {
        Self {
            started_at: result.started_at(),
            status: result.status(),
            duration_secs: result.duration_secs(),
            size_bytes: result.size_bytes(),
            output_file: result
                .output_path()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().to_string()),
            error_kind: result.error_kind(),
            error_message: result.error_message().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    #[serde(default)]
    pub last_run: Option<RunSummary>,
    /// Newest entry last
    #[serde(default)]
    pub per_database_history: BTreeMap<String, Vec<HistoryEntry>>,
    #[serde(default)]
    pub next_scheduled_run: Option<DateTime<Local>>,
}

impl Stats {
    /// Fold a finished run into the statistics
    pub fn record_run(&mut self, summary: RunSummary, results: &[BackupResult]) {
        for result in results {
            let history = self
                .per_database_history
                .entry(result.database_name().to_string())
                .or_default();
            history.push(HistoryEntry::from(result));
            if history.len() > HISTORY_PER_DATABASE {
                let excess = history.len() - HISTORY_PER_DATABASE;
                history.drain(..excess);
            }
        }
        self.last_run = Some(summary);
    }

    pub fn history(&self, database: &str) -> &[HistoryEntry] {
        self.per_database_history
            .get(database)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Most recent successful backup of a database
    pub fn last_success(&self, database: &str) -> Option<&HistoryEntry> {
        self.history(database)
            .iter()
            .rev()
            .find(|e| e.status == BackupStatus::Success)
    }
}

/// Reads and writes the stats file of a backup directory
#[derive(Debug, Clone)]
pub struct StatsStore {
    path: PathBuf,
}

impl StatsStore {
    pub fn new(backup_dir: &Path) -> Self {
        Self {
            path: backup_dir.join(STATS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored stats; a missing or unreadable file yields empty stats
    pub fn load(&self) -> Stats {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Stats::default(),
            Err(e) => {
                warn!(component = "stats", "Cannot read {:?}: {}", self.path, e);
                return Stats::default();
            }
        };

        serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!(component = "stats", "Ignoring corrupt stats file {:?}: {}", self.path, e);
            Stats::default()
        })
    }

    /// Write through a temp file so readers never see a torn file
    pub fn save(&self, stats: &Stats) -> io::Result<()> {
        let json = serde_json::to_string_pretty(stats).map_err(io::Error::other)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        debug!(component = "stats", "Stats written to {:?}", self.path);
        Ok(())
    }
}
