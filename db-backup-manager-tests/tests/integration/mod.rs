//! Integration tests for db-backup-manager
//!
//! These tests require Docker plus the matching client tools (`pg_dump`,
//! `mysqldump`) on the host, and run real backups against throwaway servers.
//! Run with: `cargo test -p db-backup-manager-tests --test integration -- --ignored`

mod common;
mod mysql;
mod postgres;
