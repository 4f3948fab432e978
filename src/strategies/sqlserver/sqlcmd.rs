//! Catalog reads through the `sqlcmd` client
//!
//! Every query ends in `FOR JSON PATH, INCLUDE_NULL_VALUES`; sqlcmd prints the
//! JSON text split over several lines, which are joined back before parsing.
//! Values that JSON cannot carry faithfully are converted to text server-side.

use super::catalog::{
    CheckConstraint, ColumnDef, DefaultConstraint, ForeignKeyDef, Identity, IndexColumn, IndexDef,
    KeyConstraint, KeyKind, ModuleDef, SchemaCatalog, TableDef, TableRef,
};
use super::value::{SqlValue, TypeClass};
use super::CatalogConnector;
use crate::config::{Credentials, DatabaseConfig};
use crate::error::{BackupError, ErrorKind};
use crate::strategies::dump::exec_error;
use crate::strategies::GenerateRequest;
use crate::utils::command::CommandSpec;
use crate::utils::executor::CommandExecutor;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

const LOGIN_TIMEOUT_SECS: &str = "30";

const TABLES_QUERY: &str = "\
SELECT s.name AS [schema], t.name AS [table], c.name AS [column],
    CASE WHEN ty.is_user_defined = 1 AND ty.is_assembly_type = 0
         THEN TYPE_NAME(c.system_type_id) ELSE ty.name END AS type_name,
    c.max_length, c.precision, c.scale, c.is_nullable,
    CAST(ic.seed_value AS bigint) AS identity_seed,
    CAST(ic.increment_value AS bigint) AS identity_increment,
    cc.definition AS computed
FROM sys.tables t
JOIN sys.schemas s ON s.schema_id = t.schema_id
JOIN sys.columns c ON c.object_id = t.object_id
JOIN sys.types ty ON ty.user_type_id = c.user_type_id
LEFT JOIN sys.identity_columns ic ON ic.object_id = c.object_id AND ic.column_id = c.column_id
LEFT JOIN sys.computed_columns cc ON cc.object_id = c.object_id AND cc.column_id = c.column_id
WHERE t.is_ms_shipped = 0
ORDER BY s.name, t.name, c.column_id
FOR JSON PATH, INCLUDE_NULL_VALUES";

const KEYS_QUERY: &str = "\
SELECT kc.name, s.name AS [schema], t.name AS [table], i.is_primary_key,
    CASE WHEN i.type = 1 THEN CAST(1 AS bit) ELSE CAST(0 AS bit) END AS clustered,
    c.name AS [column], ic.is_descending_key AS descending
FROM sys.key_constraints kc
JOIN sys.tables t ON t.object_id = kc.parent_object_id
JOIN sys.schemas s ON s.schema_id = t.schema_id
JOIN sys.indexes i ON i.object_id = kc.parent_object_id AND i.index_id = kc.unique_index_id
JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id
WHERE t.is_ms_shipped = 0
ORDER BY s.name, t.name, kc.name, ic.key_ordinal
FOR JSON PATH, INCLUDE_NULL_VALUES";

const CHECKS_QUERY: &str = "\
SELECT cc.name, s.name AS [schema], t.name AS [table], cc.definition
FROM sys.check_constraints cc
JOIN sys.tables t ON t.object_id = cc.parent_object_id
JOIN sys.schemas s ON s.schema_id = t.schema_id
WHERE t.is_ms_shipped = 0
ORDER BY s.name, t.name, cc.name
FOR JSON PATH, INCLUDE_NULL_VALUES";

const DEFAULTS_QUERY: &str = "\
SELECT dc.name, s.name AS [schema], t.name AS [table], c.name AS [column], dc.definition
FROM sys.default_constraints dc
JOIN sys.tables t ON t.object_id = dc.parent_object_id
JOIN sys.schemas s ON s.schema_id = t.schema_id
JOIN sys.columns c ON c.object_id = dc.parent_object_id AND c.column_id = dc.parent_column_id
WHERE t.is_ms_shipped = 0
ORDER BY s.name, t.name, dc.name
FOR JSON PATH, INCLUDE_NULL_VALUES";

const INDEXES_QUERY: &str = "\
SELECT i.name, s.name AS [schema], t.name AS [table], i.is_unique,
    CASE WHEN i.type = 1 THEN CAST(1 AS bit) ELSE CAST(0 AS bit) END AS clustered,
    i.filter_definition AS filter, c.name AS [column],
    ic.is_descending_key AS descending, ic.is_included_column AS included
FROM sys.indexes i
JOIN sys.tables t ON t.object_id = i.object_id
JOIN sys.schemas s ON s.schema_id = t.schema_id
JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id
WHERE i.is_primary_key = 0 AND i.is_unique_constraint = 0 AND i.index_id > 0
    AND i.is_hypothetical = 0 AND i.type IN (1, 2) AND t.is_ms_shipped = 0
ORDER BY s.name, t.name, i.name, ic.is_included_column, ic.key_ordinal, ic.index_column_id
FOR JSON PATH, INCLUDE_NULL_VALUES";

const FOREIGN_KEYS_QUERY: &str = "\
SELECT fk.name, s1.name AS [schema], t1.name AS [table], c1.name AS [column],
    s2.name AS ref_schema, t2.name AS ref_table, c2.name AS ref_column,
    fk.delete_referential_action_desc AS on_delete,
    fk.update_referential_action_desc AS on_update
FROM sys.foreign_keys fk
JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id
JOIN sys.tables t1 ON t1.object_id = fkc.parent_object_id
JOIN sys.schemas s1 ON s1.schema_id = t1.schema_id
JOIN sys.columns c1 ON c1.object_id = t1.object_id AND c1.column_id = fkc.parent_column_id
JOIN sys.tables t2 ON t2.object_id = fkc.referenced_object_id
JOIN sys.schemas s2 ON s2.schema_id = t2.schema_id
JOIN sys.columns c2 ON c2.object_id = t2.object_id AND c2.column_id = fkc.referenced_column_id
ORDER BY s1.name, t1.name, fk.name, fkc.constraint_column_id
FOR JSON PATH, INCLUDE_NULL_VALUES";

const TRIGGERS_QUERY: &str = "\
SELECT s.name AS [schema], tr.name, m.definition
FROM sys.triggers tr
JOIN sys.tables t ON t.object_id = tr.parent_id
JOIN sys.schemas s ON s.schema_id = t.schema_id
JOIN sys.sql_modules m ON m.object_id = tr.object_id
WHERE tr.is_ms_shipped = 0
ORDER BY s.name, t.name, tr.name
FOR JSON PATH, INCLUDE_NULL_VALUES";

const PROCEDURES_QUERY: &str = "\
SELECT s.name AS [schema], p.name, m.definition
FROM sys.procedures p
JOIN sys.schemas s ON s.schema_id = p.schema_id
JOIN sys.sql_modules m ON m.object_id = p.object_id
WHERE p.is_ms_shipped = 0
ORDER BY s.name, p.name
FOR JSON PATH, INCLUDE_NULL_VALUES";

/// Opens [`SqlcmdCatalog`]s
pub struct SqlcmdConnector {
    executor: Arc<dyn CommandExecutor>,
}

impl SqlcmdConnector {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }
}

impl CatalogConnector for SqlcmdConnector {
    fn connect(
        &self,
        config: &DatabaseConfig,
        request: &GenerateRequest,
    ) -> Result<Box<dyn SchemaCatalog>, BackupError> {
        let catalog = SqlcmdCatalog {
            executor: Arc::clone(&self.executor),
            server: server_address(config),
            database: config.database_name().to_string(),
            credentials: request.credentials.clone(),
            deadline: Instant::now() + request.timeout,
        };

        // Surface login and connection errors before anything is written
        catalog
            .query::<IgnoredAny>("SELECT DB_NAME() AS name FOR JSON PATH, INCLUDE_NULL_VALUES")
            .map_err(|e| match e.kind {
                ErrorKind::MetadataQuery => BackupError::new(ErrorKind::Connection, e.message),
                _ => e,
            })?;

        Ok(Box::new(catalog))
    }
}

/// `host,port`, or the bare host when it names an instance (`host\INSTANCE`)
pub fn server_address(config: &DatabaseConfig) -> String {
    if config.host.contains('\\') {
        config.host.clone()
    } else {
        format!("{},{}", config.host, config.port)
    }
}

pub struct SqlcmdCatalog {
    executor: Arc<dyn CommandExecutor>,
    server: String,
    database: String,
    credentials: Credentials,
    deadline: Instant,
}

impl SqlcmdCatalog {
    fn command(&self, sql: &str) -> Result<CommandSpec, BackupError> {
        let remaining = self
            .deadline
            .checked_duration_since(Instant::now())
            .filter(|d| !d.is_zero())
            .ok_or_else(|| {
                BackupError::new(ErrorKind::Timeout, "per-database timeout expired")
            })?;

        Ok(CommandSpec::new("sqlcmd")
            .args(["-S", &self.server, "-d", &self.database, "-U", &self.credentials.user])
            .args(["-l", LOGIN_TIMEOUT_SECS])
            .args(["-C", "-I", "-b", "-r", "1", "-h", "-1", "-y", "0"])
            .arg("-Q")
            .arg(format!("SET NOCOUNT ON; {}", sql))
            .env("SQLCMDPASSWORD", self.credentials.password.clone())
            .timeout(remaining))
    }

    fn query<T: DeserializeOwned>(&self, sql: &str) -> Result<Vec<T>, BackupError> {
        let output = self.executor.execute(&self.command(sql)?).map_err(exec_error)?;

        if !output.success() {
            let message = if output.stderr.trim().is_empty() {
                output.stdout_string()
            } else {
                output.stderr.clone()
            };
            return Err(BackupError::from_client_output(ErrorKind::MetadataQuery, &message));
        }

        parse_json_output(&output.stdout_string())
    }
}

/// Join the line-split JSON text sqlcmd prints and decode it
pub fn parse_json_output<T: DeserializeOwned>(stdout: &str) -> Result<Vec<T>, BackupError> {
    let text: String = stdout.lines().map(|l| l.trim_end_matches('\r')).collect();
    let text = text.trim();

    if text.is_empty() || text == "NULL" {
        return Ok(Vec::new());
    }

    serde_json::from_str(text).map_err(|e| {
        BackupError::new(
            ErrorKind::MetadataQuery,
            format!("unexpected catalog output: {}", e),
        )
    })
}

#[derive(Deserialize)]
struct ColumnRow {
    schema: String,
    table: String,
    column: String,
    type_name: String,
    max_length: i32,
    precision: u8,
    scale: u8,
    is_nullable: bool,
    identity_seed: Option<i64>,
    identity_increment: Option<i64>,
    computed: Option<String>,
}

#[derive(Deserialize)]
struct KeyRow {
    name: String,
    schema: String,
    table: String,
    is_primary_key: bool,
    clustered: bool,
    column: String,
    descending: bool,
}

#[derive(Deserialize)]
struct CheckRow {
    name: String,
    schema: String,
    table: String,
    definition: String,
}

#[derive(Deserialize)]
struct DefaultRow {
    name: String,
    schema: String,
    table: String,
    column: String,
    definition: String,
}

#[derive(Deserialize)]
struct IndexRow {
    name: String,
    schema: String,
    table: String,
    is_unique: bool,
    clustered: bool,
    filter: Option<String>,
    column: String,
    descending: bool,
    included: bool,
}

#[derive(Deserialize)]
struct ForeignKeyRow {
    name: String,
    schema: String,
    table: String,
    column: String,
    ref_schema: String,
    ref_table: String,
    ref_column: String,
    on_delete: String,
    on_update: String,
}

#[derive(Deserialize)]
struct ModuleRow {
    schema: String,
    name: String,
    definition: Option<String>,
}

fn modules(rows: Vec<ModuleRow>, kind: &str) -> Result<Vec<ModuleDef>, BackupError> {
    rows.into_iter()
        .map(|row| {
            // NULL definition means the module is encrypted
            let definition = row.definition.ok_or_else(|| {
                BackupError::new(
                    ErrorKind::MetadataQuery,
                    format!("{} {}.{} has no readable definition", kind, row.schema, row.name),
                )
            })?;
            Ok(ModuleDef {
                object: TableRef::new(&row.schema, &row.name),
                definition,
            })
        })
        .collect()
}

impl SchemaCatalog for SqlcmdCatalog {
    fn tables(&self) -> Result<Vec<TableDef>, BackupError> {
        let rows: Vec<ColumnRow> = self.query(TABLES_QUERY)?;
        let mut tables: Vec<TableDef> = Vec::new();

        for row in rows {
            let table = TableRef::new(&row.schema, &row.table);
            let column = ColumnDef {
                name: row.column,
                type_name: row.type_name,
                max_length: row.max_length,
                precision: row.precision,
                scale: row.scale,
                nullable: row.is_nullable,
                identity: row.identity_seed.map(|seed| Identity {
                    seed,
                    increment: row.identity_increment.unwrap_or(1),
                }),
                computed: row.computed,
            };

            match tables.last_mut() {
                Some(last) if last.table == table => last.columns.push(column),
                _ => tables.push(TableDef {
                    table,
                    columns: vec![column],
                }),
            }
        }

        debug!("Catalog lists {} tables", tables.len());
        Ok(tables)
    }

    fn key_constraints(&self) -> Result<Vec<KeyConstraint>, BackupError> {
        let rows: Vec<KeyRow> = self.query(KEYS_QUERY)?;
        let mut keys: Vec<KeyConstraint> = Vec::new();

        for row in rows {
            let table = TableRef::new(&row.schema, &row.table);
            let column = IndexColumn {
                name: row.column,
                descending: row.descending,
            };
            match keys.last_mut() {
                Some(last) if last.table == table && last.name == row.name => {
                    last.columns.push(column)
                }
                _ => keys.push(KeyConstraint {
                    name: row.name,
                    table,
                    kind: if row.is_primary_key {
                        KeyKind::Primary
                    } else {
                        KeyKind::Unique
                    },
                    clustered: row.clustered,
                    columns: vec![column],
                }),
            }
        }

        Ok(keys)
    }

    fn check_constraints(&self) -> Result<Vec<CheckConstraint>, BackupError> {
        let rows: Vec<CheckRow> = self.query(CHECKS_QUERY)?;
        Ok(rows
            .into_iter()
            .map(|row| CheckConstraint {
                name: row.name,
                table: TableRef::new(&row.schema, &row.table),
                definition: row.definition,
            })
            .collect())
    }

    fn default_constraints(&self) -> Result<Vec<DefaultConstraint>, BackupError> {
        let rows: Vec<DefaultRow> = self.query(DEFAULTS_QUERY)?;
        Ok(rows
            .into_iter()
            .map(|row| DefaultConstraint {
                name: row.name,
                table: TableRef::new(&row.schema, &row.table),
                column: row.column,
                definition: row.definition,
            })
            .collect())
    }

    fn indexes(&self) -> Result<Vec<IndexDef>, BackupError> {
        let rows: Vec<IndexRow> = self.query(INDEXES_QUERY)?;
        let mut indexes: Vec<IndexDef> = Vec::new();

        for row in rows {
            let table = TableRef::new(&row.schema, &row.table);
            let continues = matches!(
                indexes.last(),
                Some(last) if last.table == table && last.name == row.name
            );
            if !continues {
                indexes.push(IndexDef {
                    name: row.name,
                    table,
                    unique: row.is_unique,
                    clustered: row.clustered,
                    columns: Vec::new(),
                    included: Vec::new(),
                    filter: row.filter,
                });
            }
            let Some(index) = indexes.last_mut() else {
                continue;
            };

            if row.included {
                index.included.push(row.column);
            } else {
                index.columns.push(IndexColumn {
                    name: row.column,
                    descending: row.descending,
                });
            }
        }

        Ok(indexes)
    }

    fn foreign_keys(&self) -> Result<Vec<ForeignKeyDef>, BackupError> {
        let rows: Vec<ForeignKeyRow> = self.query(FOREIGN_KEYS_QUERY)?;
        let mut fks: Vec<ForeignKeyDef> = Vec::new();

        for row in rows {
            let table = TableRef::new(&row.schema, &row.table);
            match fks.last_mut() {
                Some(last) if last.table == table && last.name == row.name => {
                    last.columns.push(row.column);
                    last.referenced_columns.push(row.ref_column);
                }
                _ => fks.push(ForeignKeyDef {
                    name: row.name,
                    table,
                    columns: vec![row.column],
                    referenced: TableRef::new(&row.ref_schema, &row.ref_table),
                    referenced_columns: vec![row.ref_column],
                    on_delete: row.on_delete,
                    on_update: row.on_update,
                }),
            }
        }

        Ok(fks)
    }

    fn triggers(&self) -> Result<Vec<ModuleDef>, BackupError> {
        modules(self.query(TRIGGERS_QUERY)?, "trigger")
    }

    fn procedures(&self) -> Result<Vec<ModuleDef>, BackupError> {
        modules(self.query(PROCEDURES_QUERY)?, "procedure")
    }

    fn rows(&self, table: &TableDef, columns: &[&ColumnDef]) -> Result<Vec<Vec<SqlValue>>, BackupError> {
        if columns.is_empty() {
            return Ok(Vec::new());
        }

        let select_list: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} AS [c{}]", select_expression(c), i))
            .collect();
        let sql = format!(
            "SELECT {} FROM {} FOR JSON PATH, INCLUDE_NULL_VALUES",
            select_list.join(", "),
            table.table.quoted()
        );

        let objects: Vec<Map<String, Value>> = self.query(&sql)?;

        objects
            .into_iter()
            .map(|object| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, column)| {
                        let value = object.get(&format!("c{}", i)).unwrap_or(&Value::Null);
                        json_to_value(value, column)
                    })
                    .collect()
            })
            .collect()
    }
}

/// Server-side conversion applied before a column is put into JSON
pub fn select_expression(column: &ColumnDef) -> String {
    let name = super::catalog::quote_ident(&column.name);
    let type_name = column.type_name.to_ascii_lowercase();

    match (TypeClass::of(&type_name), type_name.as_str()) {
        (_, "money" | "smallmoney") => format!("CONVERT(varchar(64), {}, 2)", name),
        (TypeClass::Decimal, _) => format!("CONVERT(varchar(64), {})", name),
        (TypeClass::Float, _) => format!("CONVERT(varchar(64), {}, 3)", name),
        (TypeClass::Date, _) => format!("CONVERT(char(10), {}, 23)", name),
        (TypeClass::Time, _) => format!("CONVERT(varchar(16), {})", name),
        (TypeClass::DateTime | TypeClass::DateTime2, _) => {
            format!("CONVERT(varchar(27), CAST({} AS datetime2(7)), 126)", name)
        }
        (TypeClass::DateTimeOffset, _) => format!("CONVERT(varchar(34), {}, 126)", name),
        (TypeClass::Uuid, _) => format!("CONVERT(char(36), {})", name),
        (_, "text") => format!("CONVERT(varchar(max), {})", name),
        (_, "ntext" | "xml") => format!("CONVERT(nvarchar(max), {})", name),
        (_, "image") => format!("CONVERT(varbinary(max), {})", name),
        (TypeClass::Clr, _) => format!("CAST({} AS varbinary(max))", name),
        _ => name,
    }
}

/// Decode one JSON cell according to the column's type
pub fn json_to_value(value: &Value, column: &ColumnDef) -> Result<SqlValue, BackupError> {
    let invalid = || {
        BackupError::new(
            ErrorKind::Serialization,
            format!(
                "cannot read value {} of column [{}] ({})",
                value, column.name, column.type_name
            ),
        )
    };

    if value.is_null() {
        return Ok(SqlValue::Null);
    }

    let text = value.as_str();
    let parsed = match TypeClass::of(&column.type_name) {
        TypeClass::Bit => value
            .as_bool()
            .or_else(|| value.as_i64().map(|i| i != 0))
            .map(SqlValue::Bool),
        TypeClass::Integer => value.as_i64().map(SqlValue::Int),
        TypeClass::Decimal => text.map(|s| SqlValue::Decimal(s.trim().to_string())),
        TypeClass::Float => text
            .and_then(|s| s.trim().parse::<f64>().ok())
            .map(SqlValue::Float),
        TypeClass::Text { .. } => text.map(|s| SqlValue::Text(s.to_string())),
        TypeClass::Binary | TypeClass::Clr => text
            .and_then(|s| BASE64.decode(s).ok())
            .map(SqlValue::Binary),
        TypeClass::Date => text
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .map(SqlValue::Date),
        TypeClass::Time => text
            .and_then(|s| NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f").ok())
            .map(SqlValue::Time),
        TypeClass::DateTime | TypeClass::DateTime2 => text
            .and_then(|s| NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%dT%H:%M:%S%.f").ok())
            .map(SqlValue::DateTime),
        TypeClass::DateTimeOffset => text
            .and_then(|s| {
                DateTime::parse_from_rfc3339(s.trim())
                    .or_else(|_| DateTime::parse_from_str(s.trim(), "%Y-%m-%dT%H:%M:%S%.f%:z"))
                    .ok()
            })
            .map(SqlValue::DateTimeOffset),
        TypeClass::Uuid => text.map(|s| SqlValue::Uuid(s.trim().to_string())),
        TypeClass::Unsupported => None,
    };

    parsed.ok_or_else(invalid)
}
