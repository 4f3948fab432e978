use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use db_backup_manager::config::{self, expand_tilde, EnvSecretsProvider};
use db_backup_manager::managers::backup::{BackupOrchestrator, RunTrigger};
use db_backup_manager::managers::cleanup;
use db_backup_manager::managers::logging::{self, LoggingConfig};
use db_backup_manager::managers::scheduler::Scheduler;
use db_backup_manager::managers::stats::StatsStore;
use db_backup_manager::strategies::StrategyFactory;
use db_backup_manager::utils::RealExecutor;
use db_backup_manager::{BackupStatus, Config};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "db-backup-manager")]
#[command(about = "Scheduled database backups with daily and annual retention", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file (JSON, or TOML with a .toml extension)
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Run as a daily scheduler or perform a single run and exit
    #[arg(value_enum, default_value_t = Mode::Scheduler)]
    mode: Mode,

    /// Back up only this database and exit
    #[arg(long)]
    db: Option<String>,

    /// Show storage statistics and the last run summary
    #[arg(long)]
    stats: bool,

    /// Write an example configuration file
    #[arg(long)]
    init: bool,

    /// In scheduler mode, also run immediately at start-up
    #[arg(long)]
    now: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Scheduler,
    Once,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // --init runs before any configuration exists
    if cli.init {
        logging::init_console_logging();
        return handle_init(&cli.config);
    }

    let config = config::load_config(&cli.config)
        .with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;

    // Setup logging with file rotation (must keep guard alive)
    let _log_guard = logging::init_logging(&LoggingConfig::from_settings(&config.logging))?;

    if cli.stats {
        return handle_stats(&config);
    }

    let orchestrator = Arc::new(build_orchestrator(&config));
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

    let success = if let Some(name) = cli.db.as_deref() {
        runtime.block_on(handle_single(&orchestrator, &config, name))?
    } else {
        match cli.mode {
            Mode::Once => runtime.block_on(handle_once(&orchestrator, &config))?,
            Mode::Scheduler => {
                runtime.block_on(handle_scheduler(Arc::clone(&orchestrator), config, cli.now));
                true
            }
        }
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

fn build_orchestrator(config: &Config) -> BackupOrchestrator {
    let factory = StrategyFactory::with_defaults(Arc::new(RealExecutor::new()));
    let backup_dir = expand_tilde(&config.backup_settings.backup_dir);

    BackupOrchestrator::new(factory, Arc::new(EnvSecretsProvider::new()))
        .with_stats_store(StatsStore::new(&backup_dir))
}

/// Cancel databases that have not started yet when Ctrl+C arrives
fn cancel_on_interrupt(orchestrator: &Arc<BackupOrchestrator>) {
    let orchestrator = Arc::clone(orchestrator);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted; remaining databases will be skipped");
            orchestrator.cancel();
        }
    });
}

async fn handle_once(orchestrator: &Arc<BackupOrchestrator>, config: &Config) -> Result<bool> {
    cancel_on_interrupt(orchestrator);
    println!("Running backups for {} database(s)...", config.databases.len());

    let report = orchestrator
        .run_cycle(&config.databases, &config.backup_settings, RunTrigger::OneShot)
        .await
        .context("Backup run failed")?;

    for result in &report.results {
        println!("{}", result);
    }
    println!(
        "\n{} succeeded, {} failed, {} skipped, {} old artifact(s) deleted",
        report.summary.succeeded,
        report.summary.failed,
        report.summary.skipped,
        report.summary.deleted_artifacts
    );

    if report.summary.all_succeeded() {
        println!("✓ All backups completed successfully");
    }
    Ok(report.summary.all_succeeded())
}

async fn handle_single(
    orchestrator: &Arc<BackupOrchestrator>,
    config: &Config,
    name: &str,
) -> Result<bool> {
    cancel_on_interrupt(orchestrator);
    println!("Running backup for database: {}", name);

    let result = orchestrator
        .run_for(name, &config.databases, &config.backup_settings)
        .await
        .with_context(|| format!("Backup of '{}' failed", name))?;

    println!("{}", result);
    Ok(result.is_success())
}

async fn handle_scheduler(orchestrator: Arc<BackupOrchestrator>, config: Config, run_now: bool) {
    let (scheduler, handle) = Scheduler::new(orchestrator, config);

    if run_now {
        handle.run_now();
    }

    let signals = handle.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        eprintln!("Shutting down scheduler...");
        signals.shutdown();
    });

    scheduler.run().await;
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn handle_stats(config: &Config) -> Result<()> {
    let backup_dir = expand_tilde(&config.backup_settings.backup_dir);
    let storage = cleanup::storage_stats(&backup_dir)
        .with_context(|| format!("Failed to read backup directory {:?}", backup_dir))?;

    println!("=== Backup Storage ===\n");
    println!("Directory: {}", backup_dir.display());
    println!("Artifacts: {}", storage.total_files);
    println!("Total size: {:.2} MB", storage.total_bytes as f64 / (1024.0 * 1024.0));
    if let Some(oldest) = &storage.oldest {
        println!("Oldest: {} ({})", oldest.file_name(), oldest.date);
    }
    if let Some(newest) = &storage.newest {
        println!("Newest: {} ({})", newest.file_name(), newest.date);
    }

    let stats = StatsStore::new(&backup_dir).load();

    println!("\n=== Last Run ===\n");
    match &stats.last_run {
        Some(run) => {
            println!("Started: {}", run.started_at.format("%Y-%m-%d %H:%M:%S"));
            println!("Duration: {:.2}s", run.duration_secs());
            println!(
                "Results: {} succeeded, {} failed, {} skipped",
                run.succeeded, run.failed, run.skipped
            );
            println!("Deleted artifacts: {}", run.deleted_artifacts);
        }
        None => println!("No runs recorded"),
    }

    if let Some(next) = stats.next_scheduled_run {
        println!("Next scheduled run: {}", next.format("%Y-%m-%d %H:%M"));
    }

    if !stats.per_database_history.is_empty() {
        println!("\n=== Databases ===\n");
        for (name, history) in &stats.per_database_history {
            let Some(last) = history.last() else {
                continue;
            };
            let successes = history.iter().filter(|e| e.status == BackupStatus::Success).count();
            println!(
                "{}: last {} at {} ({}/{} recent runs succeeded)",
                name,
                last.status,
                last.started_at.format("%Y-%m-%d %H:%M"),
                successes,
                history.len()
            );
            if let Some(message) = &last.error_message {
                println!("  Error: {}", message);
            }
        }
    }

    Ok(())
}

fn handle_init(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("Configuration file {:?} already exists", path);
    }

    let example = config::example_config();
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let contents = if is_toml {
        toml::to_string_pretty(&example).context("Failed to render example configuration")?
    } else {
        serde_json::to_string_pretty(&example).context("Failed to render example configuration")?
    };

    fs::write(path, contents).with_context(|| format!("Failed to write {:?}", path))?;
    println!("✓ Example configuration written to {}", path.display());
    println!("Set <REF>_USER / <REF>_PASSWORD environment variables for each credentials_ref.");
    Ok(())
}
