//! Backup orchestrator - runs every configured database through its generator

use crate::config::{expand_tilde, BackupSettings, DatabaseConfig, SecretsProvider};
use crate::error::{BackupError, ErrorKind, RunError};
use crate::managers::cleanup::{CleanupService, SweepReport};
use crate::managers::stats::{RunSummary, Stats, StatsStore};
use crate::models::{ArtifactName, BackupResult, SkipReason};
use crate::strategies::{GenerateRequest, StrategyFactory};
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::compress::gzip_file;
use crate::utils::locker::RunLock;
use chrono::{Local, NaiveDate};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Semaphore;
use tracing::{error, info, info_span, warn, Instrument};

/// Extra time granted past the per-database timeout before the worker is abandoned
const TIMEOUT_GRACE: Duration = Duration::from_secs(30);

/// What started a run; recorded on the `run` span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunTrigger {
    Scheduled,
    Manual,
    OneShot,
}

impl std::fmt::Display for RunTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RunTrigger::Scheduled => "scheduled",
            RunTrigger::Manual => "manual",
            RunTrigger::OneShot => "once",
        })
    }
}

/// Outcome of a scheduled cycle: the run plus the retention sweep after it
#[derive(Debug)]
pub struct CycleReport {
    pub results: Vec<BackupResult>,
    pub summary: RunSummary,
    pub sweep: Option<SweepReport>,
}

/// Shared state handed to each per-database task
struct RunContext {
    factory: Arc<StrategyFactory>,
    secrets: Arc<dyn SecretsProvider>,
    cancelled: Arc<AtomicBool>,
    semaphore: Arc<Semaphore>,
    settings: BackupSettings,
    backup_dir: PathBuf,
    today: NaiveDate,
}

pub struct BackupOrchestrator {
    factory: Arc<StrategyFactory>,
    secrets: Arc<dyn SecretsProvider>,
    clock: Arc<dyn Clock>,
    cancelled: Arc<AtomicBool>,
    stats: Mutex<Stats>,
    store: Option<StatsStore>,
}

impl BackupOrchestrator {
    pub fn new(factory: StrategyFactory, secrets: Arc<dyn SecretsProvider>) -> Self {
        Self {
            factory: Arc::new(factory),
            secrets,
            clock: Arc::new(SystemClock),
            cancelled: Arc::new(AtomicBool::new(false)),
            stats: Mutex::new(Stats::default()),
            store: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Persist stats through `store`, starting from what it already holds
    pub fn with_stats_store(mut self, store: StatsStore) -> Self {
        *self.stats.get_mut() = store.load();
        self.store = Some(store);
        self
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Databases not yet started in the current (or next) run are skipped
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn get_stats(&self) -> Stats {
        self.stats.lock().clone()
    }

    pub fn set_next_scheduled_run(&self, at: Option<chrono::DateTime<Local>>) {
        let mut stats = self.stats.lock();
        stats.next_scheduled_run = at;
        self.persist(&stats);
    }

    /// Back up every configured database once
    ///
    /// Results come back in configuration order. A failing database never
    /// stops the others; only run-level problems are returned as errors.
    pub async fn run_once(
        &self,
        databases: &[DatabaseConfig],
        settings: &BackupSettings,
    ) -> Result<Vec<BackupResult>, RunError> {
        let backup_dir = self.prepare(databases, settings)?;
        let _lock = acquire_lock(&backup_dir)?;

        let (results, summary) = self
            .run_locked(databases, settings, &backup_dir, RunTrigger::OneShot)
            .await;
        self.record(summary, &results);
        Ok(results)
    }

    /// Back up a single database by name
    pub async fn run_for(
        &self,
        name: &str,
        databases: &[DatabaseConfig],
        settings: &BackupSettings,
    ) -> Result<BackupResult, RunError> {
        let config = databases
            .iter()
            .find(|db| db.name == name)
            .ok_or_else(|| RunError::UnknownDatabase(name.to_string()))?;

        let mut results = self.run_once(std::slice::from_ref(config), settings).await?;
        results
            .pop()
            .ok_or_else(|| RunError::UnknownDatabase(name.to_string()))
    }

    /// Full cycle: back up everything, then sweep old artifacts
    pub async fn run_cycle(
        &self,
        databases: &[DatabaseConfig],
        settings: &BackupSettings,
        trigger: RunTrigger,
    ) -> Result<CycleReport, RunError> {
        let backup_dir = self.prepare(databases, settings)?;
        let _lock = acquire_lock(&backup_dir)?;

        let run_started = SystemTime::now();
        let (results, mut summary) = self
            .run_locked(databases, settings, &backup_dir, trigger)
            .await;

        let cleanup = CleanupService::new(Arc::clone(&self.clock));
        let sweep = match cleanup.sweep_after_run(&backup_dir, settings, run_started) {
            Ok(report) => {
                summary.deleted_artifacts = report.deleted.len();
                summary.cleanup_errors = report.errors.len();
                for failure in &report.errors {
                    error!(component = "cleanup", "{}", failure.error);
                }
                Some(report)
            }
            Err(e) => {
                error!(component = "cleanup", "Retention sweep failed: {}", e);
                summary.cleanup_errors = 1;
                None
            }
        };

        match cleanup.storage_stats(&backup_dir) {
            Ok(storage) => info!(
                component = "orchestrator",
                "Storage: {} artifact(s), {:.2} MB, {} deleted this run",
                storage.total_files,
                storage.total_bytes as f64 / (1024.0 * 1024.0),
                summary.deleted_artifacts
            ),
            Err(e) => warn!(component = "orchestrator", "Cannot compute storage statistics: {}", e),
        }

        self.record(summary.clone(), &results);
        Ok(CycleReport {
            results,
            summary,
            sweep,
        })
    }

    /// Run-level checks; nothing has been generated when these fail
    fn prepare(
        &self,
        databases: &[DatabaseConfig],
        settings: &BackupSettings,
    ) -> Result<PathBuf, RunError> {
        let mut seen = HashSet::new();
        for db in databases {
            if !seen.insert(db.name.as_str()) {
                return Err(RunError::DuplicateDatabase(db.name.clone()));
            }
        }

        let backup_dir = expand_tilde(&settings.backup_dir);
        fs::create_dir_all(&backup_dir).map_err(|source| RunError::BackupDir {
            path: backup_dir.display().to_string(),
            source,
        })?;
        Ok(backup_dir)
    }

    async fn run_locked(
        &self,
        databases: &[DatabaseConfig],
        settings: &BackupSettings,
        backup_dir: &std::path::Path,
        trigger: RunTrigger,
    ) -> (Vec<BackupResult>, RunSummary) {
        let started_at = Local::now();
        let context = Arc::new(RunContext {
            factory: Arc::clone(&self.factory),
            secrets: Arc::clone(&self.secrets),
            cancelled: Arc::clone(&self.cancelled),
            semaphore: Arc::new(Semaphore::new(settings.max_parallel.max(1))),
            settings: settings.clone(),
            backup_dir: backup_dir.to_path_buf(),
            today: self.clock.now().date_naive(),
        });

        let span = info_span!("run", %trigger, databases = databases.len());
        let results = async {
            info!(
                component = "orchestrator",
                "Starting backup run for {} database(s) into {:?}",
                databases.len(),
                backup_dir
            );

            let handles: Vec<_> = databases
                .iter()
                .map(|db| {
                    let config = db.clone();
                    let task = backup_database(Arc::clone(&context), config.clone());
                    (config, tokio::spawn(task.in_current_span()))
                })
                .collect();

            let mut results = Vec::with_capacity(handles.len());
            for (config, handle) in handles {
                let result = handle.await.unwrap_or_else(|e| {
                    BackupResult::failed(
                        &config.name,
                        config.engine.clone(),
                        Local::now(),
                        BackupError::new(ErrorKind::Io, format!("backup task aborted: {}", e)),
                    )
                });
                results.push(result);
            }
            results
        }
        .instrument(span)
        .await;

        self.cancelled.store(false, Ordering::SeqCst);

        let summary = RunSummary::from_results(started_at, Local::now(), &results);
        log_summary(&summary, &results);
        (results, summary)
    }

    fn record(&self, summary: RunSummary, results: &[BackupResult]) {
        let mut stats = self.stats.lock();
        stats.record_run(summary, results);
        self.persist(&stats);
    }

    fn persist(&self, stats: &Stats) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(stats) {
                warn!(component = "stats", "Failed to write {:?}: {}", store.path(), e);
            }
        }
    }
}

fn acquire_lock(backup_dir: &std::path::Path) -> Result<RunLock, RunError> {
    RunLock::try_acquire(backup_dir)
        .map_err(RunError::Lock)?
        .ok_or(RunError::AlreadyRunning)
}

async fn backup_database(context: Arc<RunContext>, config: DatabaseConfig) -> BackupResult {
    let span = info_span!("backup", database = %config.name, engine = %config.engine);

    async move {
        if !config.enabled {
            info!(component = "orchestrator", "Database '{}' is disabled, skipping", config.name);
            return BackupResult::skipped(&config.name, config.engine.clone(), SkipReason::Disabled);
        }

        let _permit = match Arc::clone(&context.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return BackupResult::skipped(&config.name, config.engine.clone(), SkipReason::Cancelled)
            }
        };

        if context.cancelled.load(Ordering::SeqCst) {
            warn!(component = "orchestrator", "Run cancelled before '{}' started", config.name);
            return BackupResult::skipped(&config.name, config.engine.clone(), SkipReason::Cancelled);
        }

        let started_at = Local::now();
        let fail = |err: BackupError| {
            error!(component = "orchestrator", "{}: {}", config.name, err);
            BackupResult::failed(&config.name, config.engine.clone(), started_at, err)
        };

        let generator = match context.factory.resolve(&config.engine) {
            Ok(generator) => generator,
            Err(err) => return fail(err),
        };

        let credentials = match context.secrets.resolve(&config.credentials_ref) {
            Ok(credentials) => credentials,
            Err(err) => return fail(err),
        };

        let timeout = Duration::from_secs(context.settings.per_database_timeout_seconds);
        let request = GenerateRequest {
            destination_dir: context.backup_dir.clone(),
            artifact: ArtifactName::for_run(&config.name, context.today, false),
            credentials,
            timeout,
            sqlserver: context.settings.sqlserver.clone(),
        };

        let worker = {
            let config = config.clone();
            let request = request.clone();
            tokio::task::spawn_blocking(move || generator.generate(&config, &request))
        };

        let result = match tokio::time::timeout(timeout + TIMEOUT_GRACE, worker).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                return fail(BackupError::new(
                    ErrorKind::Io,
                    format!("generator task aborted: {}", e),
                ))
            }
            Err(_) => {
                return fail(BackupError::new(
                    ErrorKind::Timeout,
                    format!("no result after {}s", timeout.as_secs()),
                ))
            }
        };

        if result.is_success() && context.settings.compress {
            compress_result(result, &request).await
        } else {
            result
        }
    }
    .instrument(span)
    .await
}

/// Replace the plain artifact with its `.gz`; on failure the plain one stays
async fn compress_result(result: BackupResult, request: &GenerateRequest) -> BackupResult {
    let Some(source) = result.output_path().cloned() else {
        return result;
    };
    let target = request.artifact.compressed().path_in(&request.destination_dir);

    let job = {
        let (source, target) = (source.clone(), target.clone());
        tokio::task::spawn_blocking(move || gzip_file(&source, &target))
    };

    match job.await {
        Ok(Ok(size)) => {
            info!(
                component = "orchestrator",
                "Compressed {} -> {} ({:.2} MB)",
                source.display(),
                target.display(),
                size as f64 / (1024.0 * 1024.0)
            );
            BackupResult::success(
                result.database_name(),
                result.engine().clone(),
                result.started_at(),
                target,
                size,
            )
        }
        Ok(Err(e)) => {
            warn!(component = "orchestrator", "Compression of {} failed, keeping plain artifact: {}", source.display(), e);
            result
        }
        Err(e) => {
            warn!(component = "orchestrator", "Compression task aborted: {}", e);
            result
        }
    }
}

fn log_summary(summary: &RunSummary, results: &[BackupResult]) {
    for result in results {
        if result.is_failed() {
            error!(component = "orchestrator", "{}", result);
        } else {
            info!(component = "orchestrator", "{}", result);
        }
    }

    info!(
        component = "orchestrator",
        "Run finished in {:.2}s: {} succeeded, {} failed, {} skipped ({:.2} MB written)",
        summary.duration_secs(),
        summary.succeeded,
        summary.failed,
        summary.skipped,
        summary.bytes_written as f64 / (1024.0 * 1024.0)
    );
    if !summary.all_succeeded() {
        warn!(component = "orchestrator", "{} database(s) failed to back up", summary.failed);
    }
}
