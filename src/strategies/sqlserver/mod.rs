//! SQL Server backups as a replayable T-SQL script
//!
//! No dump binary is involved: the schema is read from the catalog and the
//! script is written in five sections (tables, data, keys/constraints/indexes,
//! foreign keys, triggers/procedures). Each section is appended and flushed
//! before the next one starts, so a failure leaves earlier sections intact.

pub mod catalog;
pub mod ordering;
pub mod script;
pub mod sqlcmd;
pub mod value;

use super::{EngineGenerator, GenerateRequest};
use crate::config::DatabaseConfig;
use crate::error::BackupError;
use crate::utils::executor::CommandExecutor;
use catalog::{InMemoryCatalog, SchemaCatalog, TableRef};
use chrono::Local;
use ordering::dependency_order;
use script::ScriptWriter;
use sqlcmd::SqlcmdConnector;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Opens a catalog session for one database
pub trait CatalogConnector: Send + Sync {
    fn connect(
        &self,
        config: &DatabaseConfig,
        request: &GenerateRequest,
    ) -> Result<Box<dyn SchemaCatalog>, BackupError>;
}

impl CatalogConnector for InMemoryCatalog {
    fn connect(
        &self,
        _config: &DatabaseConfig,
        _request: &GenerateRequest,
    ) -> Result<Box<dyn SchemaCatalog>, BackupError> {
        Ok(Box::new(self.clone()))
    }
}

pub struct SqlServerGenerator {
    connector: Arc<dyn CatalogConnector>,
}

impl SqlServerGenerator {
    pub fn new(connector: Arc<dyn CatalogConnector>) -> Self {
        Self { connector }
    }

    /// Generator reading the catalog through `sqlcmd`
    pub fn with_sqlcmd(executor: Arc<dyn CommandExecutor>) -> Self {
        Self::new(Arc::new(SqlcmdConnector::new(executor)))
    }

    fn write_script(
        &self,
        catalog: &dyn SchemaCatalog,
        config: &DatabaseConfig,
        request: &GenerateRequest,
        script: &mut ScriptWriter,
    ) -> Result<(), BackupError> {
        let db = config.name.as_str();
        script.append(&script::header(config.database_name(), Local::now()))?;

        // 1. tables
        let tables = catalog
            .tables()
            .map_err(|e| e.with_context("reading tables"))?;
        let foreign_keys = catalog
            .foreign_keys()
            .map_err(|e| e.with_context("reading foreign keys"))?;
        let refs: Vec<TableRef> = tables.iter().map(|t| t.table.clone()).collect();
        let order = dependency_order(&refs, &foreign_keys);

        for cycle in &order.cycles {
            let names: Vec<String> = cycle.iter().map(|t| t.to_string()).collect();
            warn!(
                component = "generator",
                database = %db,
                "Foreign key cycle among {}; constraints deferred", names.join(", ")
            );
        }
        info!(component = "generator", database = %db, "[SCHEMA] {} tables", tables.len());
        script.append(&script::render_tables(&tables, &order))?;

        // 2. data, one table at a time
        script.append(&script::banner("DATA INSERTS"))?;
        let total = order.tables.len();
        for (i, table_ref) in order.tables.iter().enumerate() {
            let Some(table) = tables.iter().find(|t| &t.table == table_ref) else {
                continue;
            };
            let columns = table.insertable_columns();
            if columns.is_empty() {
                continue;
            }

            let rows = catalog
                .rows(table, &columns)
                .map_err(|e| e.with_context(&format!("reading rows of {}", table.table)))?;
            info!(
                component = "generator",
                database = %db,
                "[DATA] ({}/{}) {}: {} rows", i + 1, total, table.table, rows.len()
            );
            if rows.is_empty() {
                continue;
            }

            let sql = script::render_table_data(table, &columns, &rows, &request.sqlserver)
                .map_err(|e| e.with_context(&format!("table {}", table.table)))?;
            script.append(&sql)?;
        }

        // 3. keys, constraints, indexes
        let keys = catalog
            .key_constraints()
            .map_err(|e| e.with_context("reading key constraints"))?;
        let checks = catalog
            .check_constraints()
            .map_err(|e| e.with_context("reading check constraints"))?;
        let defaults = catalog
            .default_constraints()
            .map_err(|e| e.with_context("reading default constraints"))?;
        let indexes = catalog
            .indexes()
            .map_err(|e| e.with_context("reading indexes"))?;
        script.append(&script::render_constraints(&keys, &checks, &defaults, &indexes))?;

        // 4. foreign keys
        info!(component = "generator", database = %db, "[FK] {} foreign keys", foreign_keys.len());
        script.append(&script::render_foreign_keys(&foreign_keys, &order))?;

        // 5. triggers and procedures
        let triggers = catalog
            .triggers()
            .map_err(|e| e.with_context("reading triggers"))?;
        let procedures = catalog
            .procedures()
            .map_err(|e| e.with_context("reading procedures"))?;
        script.append(&script::render_modules(&triggers, &procedures))?;

        Ok(())
    }
}

impl EngineGenerator for SqlServerGenerator {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn write_artifact(
        &self,
        config: &DatabaseConfig,
        request: &GenerateRequest,
    ) -> Result<PathBuf, BackupError> {
        let catalog = self.connector.connect(config, request)?;

        let path = request.output_path();
        let mut script = ScriptWriter::create(&path)?;

        if let Err(err) = self.write_script(catalog.as_ref(), config, request, &mut script) {
            warn!(
                component = "generator",
                database = %config.name,
                "Partial script left at {}", script.path().display()
            );
            return Err(err);
        }

        Ok(path)
    }
}
