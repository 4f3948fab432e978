//! Unit tests for db-backup-manager
//!
//! Configuration, the artifact naming contract, retention and SQL Server
//! script rendering, exercised through the public API.

mod artifact;
mod config;
mod retention;
mod script;
