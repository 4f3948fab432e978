//! MySQL integration tests
//!
//! Run with: `cargo test -p db-backup-manager-tests --test integration -- --ignored`

use super::common::{prerequisites, real_orchestrator, wait_until_ready, ContainerGuard};
use db_backup_manager::RunTrigger;
use std::process::Command;
use test_utils::{ConfigBuilder, TestContext};

const HOST_PORT: u16 = 53306;

fn start_mysql(name: &str) -> anyhow::Result<ContainerGuard> {
    let guard = ContainerGuard::new(name);
    let port = format!("{}:3306", HOST_PORT);
    let status = Command::new("docker")
        .args([
            "run", "-d", "--name", name, "-p", &port,
            "-e", "MYSQL_ROOT_PASSWORD=testpass",
            "-e", "MYSQL_DATABASE=shop",
            "mysql:8.0",
        ])
        .status()?;
    anyhow::ensure!(status.success(), "docker run failed");

    // mysqladmin answers before the TCP listener is up; probe with a query
    wait_until_ready(name, &["mysql", "-uroot", "-ptestpass", "-h127.0.0.1", "-e", "SELECT 1"])?;
    Ok(guard)
}

fn exec_sql(container: &str, sql: &str) -> anyhow::Result<()> {
    let output = Command::new("docker")
        .args(["exec", container, "mysql", "-uroot", "-ptestpass", "shop", "-e", sql])
        .output()?;
    anyhow::ensure!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    Ok(())
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_mysql_cycle() {
    if !prerequisites("mysqldump") {
        return;
    }
    let container = start_mysql("dbbm-test-mysql").expect("Failed to start MySQL");
    exec_sql(container.name(), "CREATE TABLE orders (id INT PRIMARY KEY, note VARCHAR(50))").unwrap();
    exec_sql(container.name(), "INSERT INTO orders VALUES (1, 'first'), (2, 'second')").unwrap();

    let ctx = TestContext::from_builder(ConfigBuilder::minimal().with_compress(true));
    let mut config = ctx.config().unwrap().clone();
    config.databases[0].host = "127.0.0.1".into();
    config.databases[0].port = HOST_PORT;

    let report = real_orchestrator("SHOP", "root", "testpass")
        .run_cycle(&config.databases, &config.backup_settings, RunTrigger::OneShot)
        .await
        .unwrap();

    assert!(report.summary.all_succeeded(), "{:?}", report.results[0].error_message());
    let artifacts = ctx.artifacts();
    assert_eq!(artifacts.len(), 1);
    assert!(artifacts[0].starts_with("shop_") && artifacts[0].ends_with(".sql.gz"));
}
