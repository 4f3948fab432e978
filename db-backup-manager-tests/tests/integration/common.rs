//! Common utilities for integration tests
//!
//! This module provides cleanup guards and helper functions for integration tests.

use db_backup_manager::strategies::StrategyFactory;
use db_backup_manager::utils::RealExecutor;
use db_backup_manager::BackupOrchestrator;
use std::process::Command;
use std::sync::Arc;
use test_utils::{Credentials, StaticSecretsProvider};

/// Guard that ensures Docker container cleanup on drop (even on panic)
pub struct ContainerGuard {
    name: String,
}

impl ContainerGuard {
    pub fn new(name: &str) -> Self {
        // Leftovers from an aborted earlier run would block the name
        cleanup_container(name);
        Self {
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        cleanup_container(&self.name);
    }
}

/// Stop and remove a container with its anonymous volumes
fn cleanup_container(name: &str) {
    let _ = Command::new("docker").args(["stop", name]).output();
    let _ = Command::new("docker").args(["rm", "-v", name]).output();
}

pub fn is_docker_available() -> bool {
    Command::new("docker")
        .args(["ps"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn is_tool_available(tool: &str) -> bool {
    Command::new(tool)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// True when the test can run; prints why it is skipped otherwise
pub fn prerequisites(tool: &str) -> bool {
    if !is_docker_available() {
        println!("Docker not available, skipping test");
        return false;
    }
    if !is_tool_available(tool) {
        println!("{} not installed, skipping test", tool);
        return false;
    }
    true
}

/// Poll `probe` once a second until it succeeds
pub fn wait_until_ready(container: &str, probe: &[&str]) -> anyhow::Result<()> {
    for _ in 0..60 {
        let ready = Command::new("docker")
            .arg("exec")
            .arg(container)
            .args(probe)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        if ready {
            return Ok(());
        }
        std::thread::sleep(std::time::Duration::from_secs(1));
    }
    anyhow::bail!("{} failed to become ready", container)
}

/// Orchestrator using the real dump tools with fixed credentials
pub fn real_orchestrator(credentials_ref: &str, user: &str, password: &str) -> BackupOrchestrator {
    let factory = StrategyFactory::with_defaults(Arc::new(RealExecutor::new()));
    let secrets = StaticSecretsProvider::new().with(credentials_ref, Credentials::new(user, password));
    BackupOrchestrator::new(factory, Arc::new(secrets))
}
