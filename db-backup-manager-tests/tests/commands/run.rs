//! Tests for backup runs across engines
//!
//! A run covers every configured database, isolates failures and
//! compresses artifacts when configured.

use chrono::{Local, TimeZone};
use db_backup_manager::strategies::sqlserver::SqlServerGenerator;
use db_backup_manager::strategies::StrategyFactory;
use db_backup_manager::utils::clock::FixedClock;
use db_backup_manager::{BackupOrchestrator, ErrorKind, RunError, StatsStore};
use flate2::read::GzDecoder;
use std::io::Read;
use std::sync::Arc;
use test_utils::{
    cyclic_catalog, mysql_dump_output, postgres_dump_output, secrets_for, BackupStatus,
    ConfigBuilder, MockExecutor, MockResponse, OptionAssertions, ResultAssertions, SkipReason,
    TestContext,
};

fn orchestrator(executor: MockExecutor, names: &[&str]) -> BackupOrchestrator {
    let mut factory = StrategyFactory::with_defaults(Arc::new(executor));
    factory.register("sqlserver", Arc::new(SqlServerGenerator::new(Arc::new(cyclic_catalog()))));

    let clock = FixedClock::new(Local.with_ymd_and_hms(2025, 3, 4, 2, 0, 0).unwrap());
    BackupOrchestrator::new(factory, Arc::new(secrets_for(names))).with_clock(Arc::new(clock))
}

fn gunzip(path: &std::path::Path) -> String {
    let mut text = String::new();
    GzDecoder::new(std::fs::File::open(path).unwrap())
        .read_to_string(&mut text)
        .unwrap();
    text
}

#[tokio::test]
async fn test_run_all_engines() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::new()
            .add_database("shop", "mysql")
            .add_database("ledger", "postgresql")
            .add_database("erp", "sqlserver"),
    );
    let config = ctx.config().unwrap();
    let executor = MockExecutor::new()
        .expect("mysqldump", MockResponse::stdout(mysql_dump_output()))
        .expect(
            "pg_dump",
            MockResponse::failure(1, "pg_dump: error: FATAL:  password authentication failed for user \"backup\""),
        );

    let results = orchestrator(executor, &["shop", "ledger", "erp"])
        .run_once(&config.databases, &config.backup_settings)
        .await
        .unwrap();

    let names: Vec<&str> = results.iter().map(|r| r.database_name()).collect();
    assert_eq!(names, ["shop", "ledger", "erp"]);
    assert!(results[0].is_success());
    assert_eq!(results[1].error_kind(), Some(ErrorKind::Auth));
    assert!(results[2].is_success(), "{:?}", results[2].error_message());

    assert_eq!(ctx.artifacts(), ["erp_20250304.sql", "shop_20250304.sql"]);
    assert!(ctx
        .read_artifact("erp_20250304.sql")
        .unwrap()
        .contains("FK_departments_manager"));
}

#[tokio::test]
async fn test_run_compresses_artifacts() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().with_compress(true));
    let config = ctx.config().unwrap();
    let executor = MockExecutor::new().expect("mysqldump", MockResponse::stdout(mysql_dump_output()));

    let results = orchestrator(executor, &["shop"])
        .run_once(&config.databases, &config.backup_settings)
        .await
        .unwrap();

    assert_eq!(ctx.artifacts(), ["shop_20250304.sql.gz"]);
    let path = results[0].output_path().unwrap();
    assert_eq!(gunzip(path), mysql_dump_output());
    assert_eq!(results[0].size_bytes(), std::fs::metadata(path).unwrap().len());
}

#[tokio::test]
async fn test_run_empty_dump_is_auth_failure() {
    let ctx = TestContext::with_minimal_config();
    let config = ctx.config().unwrap();
    let executor = MockExecutor::new().expect("mysqldump", MockResponse::stdout(""));

    let results = orchestrator(executor, &["shop"])
        .run_once(&config.databases, &config.backup_settings)
        .await
        .unwrap();

    assert_eq!(results[0].error_kind(), Some(ErrorKind::Auth));
    assert!(ctx.artifacts().is_empty());
}

#[tokio::test]
async fn test_run_dump_timeout() {
    let ctx = TestContext::from_builder(ConfigBuilder::new().add_database("ledger", "postgresql"));
    let config = ctx.config().unwrap();
    let executor = MockExecutor::new().expect("pg_dump", MockResponse::Timeout);

    let results = orchestrator(executor, &["ledger"])
        .run_once(&config.databases, &config.backup_settings)
        .await
        .unwrap();

    assert_eq!(results[0].error_kind(), Some(ErrorKind::Timeout));
}

#[tokio::test]
async fn test_run_skips_disabled() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::minimal()
            .add_disabled_database("archive", "postgresql")
            .with_max_parallel(2),
    );
    let config = ctx.config().unwrap();
    let executor = MockExecutor::new().with_default_response(MockResponse::stdout(mysql_dump_output()));
    let calls = executor.calls.clone();

    let results = orchestrator(executor, &["shop", "archive"])
        .run_once(&config.databases, &config.backup_settings)
        .await
        .unwrap();

    assert_eq!(results[1].status(), BackupStatus::Skipped);
    assert_eq!(results[1].skip_reason(), Some(SkipReason::Disabled));
    assert!(calls.lock().iter().all(|c| c.program == "mysqldump"));
}

#[tokio::test]
async fn test_run_for_single_database() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().add_database("erp", "sqlserver"));
    let config = ctx.config().unwrap();

    let result = orchestrator(MockExecutor::new(), &["erp"])
        .run_for("erp", &config.databases, &config.backup_settings)
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(ctx.artifacts(), ["erp_20250304.sql"]);

    let err = orchestrator(MockExecutor::new(), &[])
        .run_for("missing", &config.databases, &config.backup_settings)
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::UnknownDatabase(ref n) if n == "missing"));
}

#[tokio::test]
async fn test_run_records_stats() {
    let ctx = TestContext::with_minimal_config();
    let config = ctx.config().unwrap();
    let store = StatsStore::new(&ctx.backup_dir());
    let executor = MockExecutor::new().expect("mysqldump", MockResponse::failure(2, "Unknown database 'shop'"));

    let orchestrator = orchestrator(executor, &["shop"]).with_stats_store(store.clone());
    orchestrator
        .run_once(&config.databases, &config.backup_settings)
        .await
        .unwrap();

    let stats = store.load();
    let run = stats.last_run.as_ref().unwrap();
    assert_eq!((run.succeeded, run.failed), (0, 1));
    assert_eq!(stats.history("shop")[0].status, BackupStatus::Failed);
    assert!(stats.last_success("shop").is_none());
    assert_eq!(orchestrator.get_stats().history("shop").len(), 1);
    // the stats file is not an artifact
    assert!(ctx.artifacts().is_empty());
}

#[tokio::test]
async fn test_postgres_credentials_via_environment() {
    let ctx = TestContext::from_builder(ConfigBuilder::new().add_database("ledger", "postgresql"));
    let config = ctx.config().unwrap();
    let executor = MockExecutor::new().expect("pg_dump", MockResponse::stdout(postgres_dump_output()));
    let calls = executor.calls.clone();

    let result = orchestrator(executor, &["ledger"])
        .run_for("ledger", &config.databases, &config.backup_settings)
        .await
        .assert_ok();

    let path = result.output_path().assert_some();
    assert_eq!(std::fs::read_to_string(path).unwrap(), postgres_dump_output());

    let call = calls.lock()[0].clone();
    assert!(call.env.contains(&("PGPASSWORD".to_string(), "secret".to_string())));
    assert!(!call.args.iter().any(|a| a.contains("secret")));
}
