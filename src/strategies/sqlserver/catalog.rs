//! Schema metadata model and the catalog abstraction the script generator reads

use super::value::SqlValue;
use crate::error::BackupError;
use std::collections::HashMap;
use std::fmt;

/// Schema-qualified object name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: &str, name: &str) -> Self {
        Self {
            schema: schema.to_string(),
            name: name.to_string(),
        }
    }

    /// `[schema].[name]` with closing brackets escaped
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Bracket-quote an identifier
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub seed: i64,
    pub increment: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    /// Base type name as reported by `sys.types`
    pub type_name: String,
    /// Bytes; -1 for `(MAX)`
    pub max_length: i32,
    pub precision: u8,
    pub scale: u8,
    pub nullable: bool,
    pub identity: Option<Identity>,
    /// Definition of a computed column
    pub computed: Option<String>,
}

impl ColumnDef {
    /// Plain column with no identity and no computation
    pub fn new(name: &str, type_name: &str, max_length: i32, nullable: bool) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            max_length,
            precision: 0,
            scale: 0,
            nullable,
            identity: None,
            computed: None,
        }
    }

    pub fn with_precision(mut self, precision: u8, scale: u8) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    pub fn with_identity(mut self, seed: i64, increment: i64) -> Self {
        self.identity = Some(Identity { seed, increment });
        self
    }

    pub fn with_computed(mut self, definition: &str) -> Self {
        self.computed = Some(definition.to_string());
        self
    }

    /// Columns whose values can be inserted explicitly
    pub fn is_insertable(&self) -> bool {
        self.computed.is_none()
            && !["timestamp", "rowversion"]
                .iter()
                .any(|t| self.type_name.eq_ignore_ascii_case(t))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub table: TableRef,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn new(schema: &str, name: &str, columns: Vec<ColumnDef>) -> Self {
        Self {
            table: TableRef::new(schema, name),
            columns,
        }
    }

    pub fn has_identity(&self) -> bool {
        self.columns.iter().any(|c| c.identity.is_some())
    }

    pub fn insertable_columns(&self) -> Vec<&ColumnDef> {
        self.columns.iter().filter(|c| c.is_insertable()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Primary,
    Unique,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumn {
    pub name: String,
    pub descending: bool,
}

impl IndexColumn {
    pub fn asc(name: &str) -> Self {
        Self {
            name: name.to_string(),
            descending: false,
        }
    }
}

/// Primary key or unique constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyConstraint {
    pub name: String,
    pub table: TableRef,
    pub kind: KeyKind,
    pub clustered: bool,
    pub columns: Vec<IndexColumn>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckConstraint {
    pub name: String,
    pub table: TableRef,
    /// Definition text as stored in the catalog, parentheses included
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultConstraint {
    pub name: String,
    pub table: TableRef,
    pub column: String,
    pub definition: String,
}

/// Index not backing a key constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub table: TableRef,
    pub unique: bool,
    pub clustered: bool,
    pub columns: Vec<IndexColumn>,
    pub included: Vec<String>,
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDef {
    pub name: String,
    pub table: TableRef,
    pub columns: Vec<String>,
    pub referenced: TableRef,
    pub referenced_columns: Vec<String>,
    /// `NO_ACTION`, `CASCADE`, `SET_NULL` or `SET_DEFAULT`
    pub on_delete: String,
    pub on_update: String,
}

impl ForeignKeyDef {
    pub fn new(name: &str, table: TableRef, columns: &[&str], referenced: TableRef, referenced_columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            table,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            referenced,
            referenced_columns: referenced_columns.iter().map(|c| c.to_string()).collect(),
            on_delete: "NO_ACTION".to_string(),
            on_update: "NO_ACTION".to_string(),
        }
    }
}

/// Trigger or stored procedure with its source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDef {
    pub object: TableRef,
    pub definition: String,
}

/// Read-only view of a database's schema and rows
pub trait SchemaCatalog {
    fn tables(&self) -> Result<Vec<TableDef>, BackupError>;
    fn key_constraints(&self) -> Result<Vec<KeyConstraint>, BackupError>;
    fn check_constraints(&self) -> Result<Vec<CheckConstraint>, BackupError>;
    fn default_constraints(&self) -> Result<Vec<DefaultConstraint>, BackupError>;
    fn indexes(&self) -> Result<Vec<IndexDef>, BackupError>;
    fn foreign_keys(&self) -> Result<Vec<ForeignKeyDef>, BackupError>;
    fn triggers(&self) -> Result<Vec<ModuleDef>, BackupError>;
    fn procedures(&self) -> Result<Vec<ModuleDef>, BackupError>;

    /// All rows of `table`, values in the order of `columns`
    fn rows(&self, table: &TableDef, columns: &[&ColumnDef]) -> Result<Vec<Vec<SqlValue>>, BackupError>;
}

/// Catalog held entirely in memory
///
/// Rows are stored per table in declared column order; `rows` projects them
/// onto the requested columns.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    pub tables: Vec<TableDef>,
    pub keys: Vec<KeyConstraint>,
    pub checks: Vec<CheckConstraint>,
    pub defaults: Vec<DefaultConstraint>,
    pub indexes: Vec<IndexDef>,
    pub foreign_keys: Vec<ForeignKeyDef>,
    pub triggers: Vec<ModuleDef>,
    pub procedures: Vec<ModuleDef>,
    pub data: HashMap<TableRef, Vec<Vec<SqlValue>>>,
    /// Make the named query fail with this error
    pub failing_query: Option<(String, BackupError)>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, table: TableDef) -> Self {
        self.tables.push(table);
        self
    }

    pub fn with_rows(mut self, table: TableRef, rows: Vec<Vec<SqlValue>>) -> Self {
        self.data.insert(table, rows);
        self
    }

    pub fn key(mut self, key: KeyConstraint) -> Self {
        self.keys.push(key);
        self
    }

    pub fn foreign_key(mut self, fk: ForeignKeyDef) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    pub fn trigger(mut self, trigger: ModuleDef) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn procedure(mut self, procedure: ModuleDef) -> Self {
        self.procedures.push(procedure);
        self
    }

    /// Make `query` ("tables", "rows", "foreign_keys", ...) fail
    pub fn fail_on(mut self, query: &str, error: BackupError) -> Self {
        self.failing_query = Some((query.to_string(), error));
        self
    }

    fn check(&self, query: &str) -> Result<(), BackupError> {
        match &self.failing_query {
            Some((name, err)) if name == query => Err(err.clone()),
            _ => Ok(()),
        }
    }
}

impl SchemaCatalog for InMemoryCatalog {
    fn tables(&self) -> Result<Vec<TableDef>, BackupError> {
        self.check("tables")?;
        Ok(self.tables.clone())
    }

    fn key_constraints(&self) -> Result<Vec<KeyConstraint>, BackupError> {
        self.check("key_constraints")?;
        Ok(self.keys.clone())
    }

    fn check_constraints(&self) -> Result<Vec<CheckConstraint>, BackupError> {
        self.check("check_constraints")?;
        Ok(self.checks.clone())
    }

    fn default_constraints(&self) -> Result<Vec<DefaultConstraint>, BackupError> {
        self.check("default_constraints")?;
        Ok(self.defaults.clone())
    }

    fn indexes(&self) -> Result<Vec<IndexDef>, BackupError> {
        self.check("indexes")?;
        Ok(self.indexes.clone())
    }

    fn foreign_keys(&self) -> Result<Vec<ForeignKeyDef>, BackupError> {
        self.check("foreign_keys")?;
        Ok(self.foreign_keys.clone())
    }

    fn triggers(&self) -> Result<Vec<ModuleDef>, BackupError> {
        self.check("triggers")?;
        Ok(self.triggers.clone())
    }

    fn procedures(&self) -> Result<Vec<ModuleDef>, BackupError> {
        self.check("procedures")?;
        Ok(self.procedures.clone())
    }

    fn rows(&self, table: &TableDef, columns: &[&ColumnDef]) -> Result<Vec<Vec<SqlValue>>, BackupError> {
        self.check("rows")?;

        let positions: Vec<usize> = columns
            .iter()
            .filter_map(|wanted| table.columns.iter().position(|c| c.name == wanted.name))
            .collect();

        let rows = self
            .data
            .get(&table.table)
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        positions
                            .iter()
                            .map(|&i| row.get(i).cloned().unwrap_or(SqlValue::Null))
                            .collect()
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(rows)
    }
}
