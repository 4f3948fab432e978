//! PostgreSQL integration tests
//!
//! Run with: `cargo test -p db-backup-manager-tests --test integration -- --ignored`

use super::common::{prerequisites, real_orchestrator, wait_until_ready, ContainerGuard};
use std::process::Command;
use test_utils::{ConfigBuilder, TestContext};

const HOST_PORT: u16 = 55432;

fn start_postgres(name: &str) -> anyhow::Result<ContainerGuard> {
    let guard = ContainerGuard::new(name);
    let port = format!("{}:5432", HOST_PORT);
    let status = Command::new("docker")
        .args([
            "run", "-d", "--name", name, "-p", &port,
            "-e", "POSTGRES_PASSWORD=testpass",
            "-e", "POSTGRES_DB=testdb",
            "postgres:15-alpine",
        ])
        .status()?;
    anyhow::ensure!(status.success(), "docker run failed");

    wait_until_ready(name, &["pg_isready", "-U", "postgres", "-d", "testdb"])?;
    Ok(guard)
}

fn exec_sql(container: &str, sql: &str) -> anyhow::Result<()> {
    let output = Command::new("docker")
        .args(["exec", container, "psql", "-U", "postgres", "-d", "testdb", "-c", sql])
        .output()?;
    anyhow::ensure!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    Ok(())
}

fn context() -> TestContext {
    TestContext::from_builder(ConfigBuilder::new().add_database("ledger", "postgresql"))
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_postgres_backup() {
    if !prerequisites("pg_dump") {
        return;
    }
    let container = start_postgres("dbbm-test-postgres").expect("Failed to start PostgreSQL");
    exec_sql(container.name(), "CREATE TABLE entries (id SERIAL PRIMARY KEY, memo TEXT)").unwrap();
    exec_sql(container.name(), "INSERT INTO entries (memo) VALUES ('rent'), ('it''s paid')").unwrap();

    let ctx = context();
    let mut config = ctx.config().unwrap().clone();
    config.databases[0].host = "127.0.0.1".into();
    config.databases[0].port = HOST_PORT;
    config.databases[0].database = Some("testdb".into());

    let results = real_orchestrator("LEDGER", "postgres", "testpass")
        .run_once(&config.databases, &config.backup_settings)
        .await
        .unwrap();

    assert!(results[0].is_success(), "{:?}", results[0].error_message());
    let name = &ctx.artifacts()[0];
    let dump = ctx.read_artifact(name).unwrap();
    assert!(dump.contains("CREATE TABLE public.entries"));
    assert!(dump.contains("it''s paid") || dump.contains("it's paid"));
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_postgres_wrong_password() {
    if !prerequisites("pg_dump") {
        return;
    }
    let _container = start_postgres("dbbm-test-postgres-auth").expect("Failed to start PostgreSQL");

    let ctx = context();
    let mut config = ctx.config().unwrap().clone();
    config.databases[0].host = "127.0.0.1".into();
    config.databases[0].port = HOST_PORT;
    config.databases[0].database = Some("testdb".into());

    let results = real_orchestrator("LEDGER", "postgres", "wrong")
        .run_once(&config.databases, &config.backup_settings)
        .await
        .unwrap();

    assert_eq!(results[0].error_kind(), Some(db_backup_manager::ErrorKind::Auth));
    assert!(ctx.artifacts().is_empty());
}
