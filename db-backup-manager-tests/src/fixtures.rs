//! Test fixtures and sample data
//!
//! Provides pre-built catalogs, dump output and artifact files for testing.

use chrono::{Duration, NaiveDate};
use db_backup_manager::config::{Credentials, StaticSecretsProvider};
use db_backup_manager::models::ArtifactName;
use db_backup_manager::strategies::sqlserver::catalog::{
    ColumnDef, DefaultConstraint, ForeignKeyDef, InMemoryCatalog, IndexColumn, KeyConstraint,
    KeyKind, ModuleDef, TableDef, TableRef,
};
use db_backup_manager::strategies::sqlserver::value::SqlValue;
use std::fs;
use std::path::{Path, PathBuf};

/// Plausible mysqldump output
pub fn mysql_dump_output() -> &'static str {
    "-- MySQL dump 10.13\n\
     CREATE DATABASE IF NOT EXISTS `shop`;\n\
     USE `shop`;\n\
     CREATE TABLE `orders` (`id` int NOT NULL);\n\
     INSERT INTO `orders` VALUES (1),(2);\n"
}

/// Plausible pg_dump output
pub fn postgres_dump_output() -> &'static str {
    "--\n-- PostgreSQL database dump\n--\n\
     CREATE DATABASE ledger WITH ENCODING = 'UTF8';\n\
     CREATE TABLE public.entries (id integer NOT NULL);\n"
}

/// Secrets for every name, user `backup`, password `secret`
pub fn secrets_for(names: &[&str]) -> StaticSecretsProvider {
    names.iter().fold(StaticSecretsProvider::new(), |provider, name| {
        provider.with(&name.to_uppercase(), Credentials::new("backup", "secret"))
    })
}

/// Write an artifact named per the contract and return its path
pub fn artifact_file(dir: &Path, database: &str, date: NaiveDate, compressed: bool) -> PathBuf {
    let path = ArtifactName::for_run(database, date, compressed).path_in(dir);
    fs::write(&path, format!("-- backup of {} on {}\n", database, date))
        .expect("Failed to write artifact");
    path
}

/// One artifact per entry of `days_ago`, relative to `today`
pub fn seed_artifacts(dir: &Path, database: &str, today: NaiveDate, days_ago: &[i64]) -> Vec<PathBuf> {
    days_ago
        .iter()
        .map(|days| artifact_file(dir, database, today - Duration::days(*days), false))
        .collect()
}

/// Small SQL Server schema with a foreign key cycle
///
/// `departments` and `employees` reference each other; `audit` references
/// `employees`; `regions` is independent.
pub fn cyclic_catalog() -> InMemoryCatalog {
    let regions = TableDef::new(
        "dbo",
        "regions",
        vec![
            ColumnDef::new("id", "int", 4, false),
            ColumnDef::new("name", "nvarchar", 100, false),
        ],
    );
    let departments = TableDef::new(
        "dbo",
        "departments",
        vec![
            ColumnDef::new("id", "int", 4, false).with_identity(1, 1),
            ColumnDef::new("name", "varchar", 50, false),
            ColumnDef::new("manager_id", "int", 4, true),
        ],
    );
    let employees = TableDef::new(
        "dbo",
        "employees",
        vec![
            ColumnDef::new("id", "int", 4, false),
            ColumnDef::new("department_id", "int", 4, false),
            ColumnDef::new("salary", "decimal", 9, true).with_precision(10, 2),
            ColumnDef::new("hired", "date", 3, true),
        ],
    );
    let audit = TableDef::new(
        "dbo",
        "audit",
        vec![
            ColumnDef::new("employee_id", "int", 4, false),
            ColumnDef::new("note", "nvarchar", -1, true),
        ],
    );

    InMemoryCatalog::new()
        .table(audit.clone())
        .table(departments.clone())
        .table(employees.clone())
        .table(regions.clone())
        .with_rows(
            regions.table.clone(),
            vec![vec![SqlValue::Int(1), SqlValue::Text("North".into())]],
        )
        .with_rows(
            departments.table.clone(),
            vec![vec![SqlValue::Int(1), SqlValue::Text("R&D".into()), SqlValue::Int(7)]],
        )
        .with_rows(
            employees.table.clone(),
            vec![vec![
                SqlValue::Int(7),
                SqlValue::Int(1),
                SqlValue::Decimal("1234.50".into()),
                SqlValue::Date(NaiveDate::from_ymd_opt(2020, 2, 29).expect("valid date")),
            ]],
        )
        .with_rows(
            audit.table.clone(),
            vec![vec![SqlValue::Int(7), SqlValue::Text("O'Brien's review".into())]],
        )
        .key(KeyConstraint {
            name: "PK_departments".into(),
            table: departments.table.clone(),
            kind: KeyKind::Primary,
            clustered: true,
            columns: vec![IndexColumn::asc("id")],
        })
        .key(KeyConstraint {
            name: "PK_employees".into(),
            table: employees.table.clone(),
            kind: KeyKind::Primary,
            clustered: true,
            columns: vec![IndexColumn::asc("id")],
        })
        .foreign_key(ForeignKeyDef::new(
            "FK_departments_manager",
            departments.table.clone(),
            &["manager_id"],
            employees.table.clone(),
            &["id"],
        ))
        .foreign_key(ForeignKeyDef::new(
            "FK_employees_department",
            employees.table.clone(),
            &["department_id"],
            departments.table.clone(),
            &["id"],
        ))
        .foreign_key(ForeignKeyDef::new(
            "FK_audit_employee",
            audit.table.clone(),
            &["employee_id"],
            employees.table.clone(),
            &["id"],
        ))
        .trigger(ModuleDef {
            object: TableRef::new("dbo", "trg_audit"),
            definition: "CREATE TRIGGER [dbo].[trg_audit] ON [dbo].[employees] AFTER UPDATE AS\nBEGIN\n    SET NOCOUNT ON;\nEND".into(),
        })
        .procedure(ModuleDef {
            object: TableRef::new("dbo", "usp_headcount"),
            definition: "CREATE PROCEDURE [dbo].[usp_headcount] AS\nSELECT COUNT(*) FROM [dbo].[employees]".into(),
        })
}

/// Default constraint used by tests that extend a catalog
pub fn sample_default(table: &TableRef) -> DefaultConstraint {
    DefaultConstraint {
        name: "DF_note".into(),
        table: table.clone(),
        column: "note".into(),
        definition: "(N'')".into(),
    }
}
