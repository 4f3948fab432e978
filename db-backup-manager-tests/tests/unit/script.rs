//! Unit tests for the SQL Server script generator
//!
//! These use the in-memory catalog, so no server is needed.

use chrono::NaiveDate;
use db_backup_manager::config::SqlServerOptions;
use db_backup_manager::strategies::sqlserver::catalog::TableRef;
use db_backup_manager::strategies::sqlserver::ordering::dependency_order;
use db_backup_manager::strategies::sqlserver::SqlServerGenerator;
use db_backup_manager::strategies::{EngineGenerator, GenerateRequest};
use db_backup_manager::{BackupError, ErrorKind};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use test_utils::{
    cyclic_catalog, sample_default, ArtifactName, Credentials, DatabaseConfig, Engine, TestContext,
};

fn erp() -> DatabaseConfig {
    DatabaseConfig {
        name: "erp".to_string(),
        engine: Engine::Sqlserver,
        host: "sql01".to_string(),
        port: 1433,
        credentials_ref: "ERP".to_string(),
        enabled: true,
        database: Some("ErpProd".to_string()),
    }
}

fn request(dir: &Path) -> GenerateRequest {
    GenerateRequest {
        destination_dir: dir.to_path_buf(),
        artifact: ArtifactName::for_run("erp", NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(), false),
        credentials: Credentials::new("sa", "pw"),
        timeout: Duration::from_secs(60),
        sqlserver: SqlServerOptions::default(),
    }
}

fn backup_dir(ctx: &TestContext) -> std::path::PathBuf {
    let dir = ctx.backup_dir();
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn position(sql: &str, needle: &str) -> usize {
    sql.find(needle)
        .unwrap_or_else(|| panic!("{:?} missing from script", needle))
}

#[test]
fn test_cycle_members_are_grouped() {
    let catalog = cyclic_catalog();
    let refs: Vec<TableRef> = catalog.tables.iter().map(|t| t.table.clone()).collect();

    let order = dependency_order(&refs, &catalog.foreign_keys);

    let names: Vec<&str> = order.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["departments", "employees", "audit", "regions"]);
    assert_eq!(order.cycles.len(), 1);
    assert_eq!(
        order.cycles[0],
        vec![TableRef::new("dbo", "departments"), TableRef::new("dbo", "employees")]
    );
}

#[test]
fn test_cyclic_schema_script() {
    let ctx = TestContext::new();
    let generator = SqlServerGenerator::new(Arc::new(cyclic_catalog()));

    let result = generator.generate(&erp(), &request(&backup_dir(&ctx)));
    assert!(result.is_success(), "{:?}", result.error_message());

    let sql = ctx.read_artifact("erp_20250601.sql").unwrap();

    assert!(sql.starts_with("-- BACKUP OF DATABASE: ErpProd"));
    assert!(sql.contains("USE [ErpProd];"));
    assert!(sql.contains("-- Foreign key cycle among dbo.departments, dbo.employees"));

    // every table exists before any data, every row before any foreign key
    assert!(position(&sql, "CREATE TABLE [dbo].[regions]") < position(&sql, "-- DATA INSERTS"));
    assert!(position(&sql, "INSERT INTO [dbo].[regions]") < position(&sql, "-- FOREIGN KEYS"));
    for fk in ["FK_departments_manager", "FK_employees_department", "FK_audit_employee"] {
        assert!(position(&sql, "INSERT INTO [dbo].[audit]") < position(&sql, fk));
    }

    assert!(sql.contains("SET IDENTITY_INSERT [dbo].[departments] ON;"));
    assert!(sql.contains("N'O''Brien''s review'"));
    assert!(sql.contains("'2020-02-29'"));
    assert!(sql.contains("[salary] decimal(10,2) NULL"));
    assert!(sql.contains("IF OBJECT_ID(N'[dbo].[trg_audit]', N'TR') IS NOT NULL DROP TRIGGER [dbo].[trg_audit];"));
    assert!(position(&sql, "-- TRIGGERS") < position(&sql, "CREATE PROCEDURE [dbo].[usp_headcount]"));
    assert!(!sql.contains("DROP TABLE"));
}

#[test]
fn test_metadata_failure_reports_kind() {
    let ctx = TestContext::new();
    let catalog = cyclic_catalog().fail_on(
        "triggers",
        BackupError::new(ErrorKind::MetadataQuery, "sys.triggers is not readable"),
    );
    let generator = SqlServerGenerator::new(Arc::new(catalog));

    let result = generator.generate(&erp(), &request(&backup_dir(&ctx)));

    assert!(result.is_failed());
    assert_eq!(result.error_kind(), Some(ErrorKind::MetadataQuery));
    let partial = ctx.read_artifact("erp_20250601.sql").unwrap();
    assert!(partial.contains("-- FOREIGN KEYS"));
    assert!(!partial.contains("CREATE TRIGGER"));
}

#[test]
fn test_default_constraints_follow_data() {
    let ctx = TestContext::new();
    let mut catalog = cyclic_catalog();
    catalog.defaults.push(sample_default(&TableRef::new("dbo", "audit")));
    let generator = SqlServerGenerator::new(Arc::new(catalog));

    let result = generator.generate(&erp(), &request(&backup_dir(&ctx)));
    assert!(result.is_success(), "{:?}", result.error_message());

    let sql = ctx.read_artifact("erp_20250601.sql").unwrap();
    let default = "ALTER TABLE [dbo].[audit] ADD CONSTRAINT [DF_note] DEFAULT (N'') FOR [note];";
    assert!(position(&sql, "INSERT INTO [dbo].[audit]") < position(&sql, default));
    assert!(position(&sql, default) < position(&sql, "-- FOREIGN KEYS"));
}
