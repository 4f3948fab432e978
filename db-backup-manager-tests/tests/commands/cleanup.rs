//! Tests for the retention sweep that follows each scheduled run

use chrono::{Duration, Local, NaiveDate, TimeZone};
use db_backup_manager::strategies::StrategyFactory;
use db_backup_manager::utils::clock::FixedClock;
use db_backup_manager::{BackupOrchestrator, CleanupService, RunTrigger};
use std::sync::Arc;
use test_utils::{
    artifact_file, mysql_dump_output, secrets_for, seed_artifacts, ConfigBuilder, MockExecutor,
    MockResponse, TestContext,
};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 4).unwrap()
}

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(Local.with_ymd_and_hms(2025, 3, 4, 2, 0, 0).unwrap()))
}

#[tokio::test]
async fn test_cycle_applies_retention() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().with_retention(7));
    let config = ctx.config().unwrap();
    let dir = ctx.backup_dir();
    seed_artifacts(&dir, "shop", today(), &[1, 7, 8, 40]);
    artifact_file(&dir, "shop", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), true);
    ctx.create_file("backups/README.txt", "keep me");

    let executor = MockExecutor::new().expect("mysqldump", MockResponse::stdout(mysql_dump_output()));
    let orchestrator = BackupOrchestrator::new(
        StrategyFactory::with_defaults(Arc::new(executor)),
        Arc::new(secrets_for(&["shop"])),
    )
    .with_clock(clock());

    let report = orchestrator
        .run_cycle(&config.databases, &config.backup_settings, RunTrigger::Manual)
        .await
        .unwrap();

    let sweep = report.sweep.unwrap();
    assert_eq!(sweep.deleted.len(), 2);
    assert!(sweep.errors.is_empty());
    assert_eq!(report.summary.deleted_artifacts, 2);
    assert_eq!(
        ctx.artifacts(),
        [
            "README.txt",
            "shop_20240101_annual.sql.gz",
            "shop_20250225.sql",
            "shop_20250303.sql",
            "shop_20250304.sql",
        ]
    );
}

#[tokio::test]
async fn test_failed_backup_still_sweeps() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().with_retention(7));
    let config = ctx.config().unwrap();
    let old = seed_artifacts(&ctx.backup_dir(), "shop", today(), &[30]);

    let executor = MockExecutor::new().expect("mysqldump", MockResponse::failure(2, "Can't connect to MySQL server"));
    let report = BackupOrchestrator::new(
        StrategyFactory::with_defaults(Arc::new(executor)),
        Arc::new(secrets_for(&["shop"])),
    )
    .with_clock(clock())
    .run_cycle(&config.databases, &config.backup_settings, RunTrigger::Scheduled)
    .await
    .unwrap();

    assert_eq!(report.summary.failed, 1);
    assert!(!old[0].exists());
}

#[test]
fn test_service_sweep_and_storage() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().with_retention(2));
    let config = ctx.config().unwrap();
    let dir = ctx.backup_dir();
    seed_artifacts(&dir, "ledger", today(), &[0, 1, 2, 3]);

    let service = CleanupService::new(clock());
    let first = service.sweep(&dir, &config.backup_settings).unwrap();
    let again = service.sweep(&dir, &config.backup_settings).unwrap();

    assert_eq!(first.deleted.len(), 1);
    assert!(first.freed_bytes() > 0);
    assert!(again.deleted.is_empty());

    let storage = service.storage_stats(&dir).unwrap();
    assert_eq!(storage.total_files, 3);
    assert_eq!(storage.oldest.unwrap().date, today() - Duration::days(2));
}
