//! Component tests for db-backup-manager
//!
//! These tests drive the orchestrator and scheduler with mocked executors
//! and in-memory catalogs; no database server is needed.

mod cleanup;
mod run;
mod scheduler;
