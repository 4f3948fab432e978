//! Unit tests for the retention sweep
//!
//! The scenarios use a fixed "today" so ages are exact.

use chrono::{Duration, Local, NaiveDate, TimeZone};
use db_backup_manager::managers::cleanup::{is_expired, storage_stats, sweep_at};
use test_utils::{artifact_file, seed_artifacts, Artifact, BackupSettings, TestContext};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, 15).unwrap()
}

fn settings(days: u32) -> BackupSettings {
    BackupSettings {
        daily_retention_days: days,
        ..BackupSettings::default()
    }
}

fn now() -> chrono::DateTime<Local> {
    Local.with_ymd_and_hms(2025, 9, 15, 2, 0, 0).unwrap()
}

#[test]
fn test_retention_keeps_recent_and_annual() {
    let ctx = TestContext::new();
    let dir = ctx.temp_dir();
    let paths = seed_artifacts(dir, "erp", today(), &[0, 29, 30, 31, 365]);
    let annual = artifact_file(dir, "erp", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), true);

    let report = sweep_at(dir, &settings(30), now(), None).unwrap();

    assert_eq!(report.deleted.len(), 2);
    assert!(paths[0].exists() && paths[1].exists() && paths[2].exists());
    assert!(!paths[3].exists() && !paths[4].exists());
    assert!(annual.exists());
    assert_eq!(report.kept_annual.len(), 1);
}

#[test]
fn test_sweep_twice_deletes_nothing_more() {
    let ctx = TestContext::new();
    seed_artifacts(ctx.temp_dir(), "shop", today(), &[3, 10, 20]);

    let first = sweep_at(ctx.temp_dir(), &settings(7), now(), None).unwrap();
    let second = sweep_at(ctx.temp_dir(), &settings(7), now(), None).unwrap();

    assert_eq!(first.deleted.len(), 2);
    assert!(second.deleted.is_empty());
    assert!(second.errors.is_empty());
}

#[test]
fn test_is_expired_boundaries() {
    let artifact = |days: i64| Artifact {
        path: "x.sql".into(),
        date: today() - Duration::days(days),
        name: None,
        size_bytes: 0,
    };

    assert!(!is_expired(&artifact(7), today(), 7));
    assert!(is_expired(&artifact(8), today(), 7));
}

#[test]
fn test_storage_stats_counts_artifacts_only() {
    let ctx = TestContext::new();
    seed_artifacts(ctx.temp_dir(), "erp", today(), &[1, 2, 3]);
    ctx.create_file("notes.txt", "not a backup");

    let stats = storage_stats(ctx.temp_dir()).unwrap();

    assert_eq!(stats.total_files, 3);
    assert!(stats.total_bytes > 0);
    assert_eq!(stats.oldest.unwrap().date, today() - Duration::days(3));
    assert_eq!(stats.newest.unwrap().date, today() - Duration::days(1));
}
