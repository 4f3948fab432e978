//! T-SQL text for each section of the backup script

use super::catalog::{
    quote_ident, CheckConstraint, ColumnDef, DefaultConstraint, ForeignKeyDef, IndexColumn,
    IndexDef, KeyConstraint, KeyKind, ModuleDef, TableDef, TableRef,
};
use super::ordering::TableOrder;
use super::value::{render_type, to_literal, SqlValue};
use crate::config::SqlServerOptions;
use crate::error::BackupError;
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// SQL Server rejects more rows than this in one VALUES list
pub const MAX_ROWS_PER_INSERT: usize = 1000;

/// Append-only script file; every append is flushed
pub struct ScriptWriter {
    out: BufWriter<File>,
    path: PathBuf,
}

impl ScriptWriter {
    pub fn create(path: &Path) -> Result<Self, BackupError> {
        let file = File::create(path)
            .map_err(|e| BackupError::io(&format!("cannot create {}", path.display()), e))?;
        Ok(Self {
            out: BufWriter::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn append(&mut self, text: &str) -> Result<(), BackupError> {
        self.out
            .write_all(text.as_bytes())
            .and_then(|_| self.out.flush())
            .map_err(|e| BackupError::io(&format!("write to {} failed", self.path.display()), e))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn banner(title: &str) -> String {
    format!(
        "\n-- =============================================\n-- {}\n-- =============================================\n\n",
        title
    )
}

pub fn header(database: &str, generated_at: DateTime<Local>) -> String {
    format!(
        "-- BACKUP OF DATABASE: {}\n-- DATE: {}\nUSE {};\nGO\nSET ANSI_NULLS ON;\nSET QUOTED_IDENTIFIER ON;\nGO\n",
        database,
        generated_at.format("%Y-%m-%d %H:%M:%S"),
        quote_ident(database)
    )
}

fn string_literal(s: &str) -> String {
    format!("N'{}'", s.replace('\'', "''"))
}

fn column_list(columns: &[&ColumnDef]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn index_columns(columns: &[IndexColumn]) -> String {
    columns
        .iter()
        .map(|c| {
            format!(
                "{} {}",
                quote_ident(&c.name),
                if c.descending { "DESC" } else { "ASC" }
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn clustering(clustered: bool) -> &'static str {
    if clustered {
        "CLUSTERED"
    } else {
        "NONCLUSTERED"
    }
}

/// Stage 1: `CREATE TABLE` for every table, dependencies first
pub fn render_tables(tables: &[TableDef], order: &TableOrder) -> String {
    let by_ref: HashMap<&TableRef, &TableDef> = tables.iter().map(|t| (&t.table, t)).collect();
    let mut out = banner("SCHEMA: TABLES");

    for cycle in &order.cycles {
        let names: Vec<String> = cycle.iter().map(|t| t.to_string()).collect();
        let _ = writeln!(
            out,
            "-- Foreign key cycle among {}; constraints are added in the FOREIGN KEYS section\n",
            names.join(", ")
        );
    }

    for table in order.tables.iter().filter_map(|t| by_ref.get(t)) {
        out.push_str(&create_table(table));
    }

    out
}

pub fn create_table(table: &TableDef) -> String {
    let mut out = format!("-- TABLE: {}\nCREATE TABLE {} (\n", table.table, table.table.quoted());

    let lines: Vec<String> = table
        .columns
        .iter()
        .map(|column| {
            let name = quote_ident(&column.name);
            if let Some(definition) = &column.computed {
                return format!("    {} AS {}", name, definition);
            }

            let mut line = format!("    {} {}", name, render_type(column));
            if let Some(identity) = &column.identity {
                let _ = write!(line, " IDENTITY({},{})", identity.seed, identity.increment);
            }
            line.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
            line
        })
        .collect();

    out.push_str(&lines.join(",\n"));
    out.push_str("\n);\nGO\n\n");
    out
}

/// Stage 2 for one table: batched `INSERT` statements
///
/// A statement is closed when it holds `batch_rows` rows or its text would
/// grow past `batch_bytes`; a single oversized row still gets its own statement.
pub fn render_table_data(
    table: &TableDef,
    columns: &[&ColumnDef],
    rows: &[Vec<SqlValue>],
    options: &SqlServerOptions,
) -> Result<String, BackupError> {
    let batch_rows = options.batch_rows.clamp(1, MAX_ROWS_PER_INSERT);
    let identity = columns.iter().any(|c| c.identity.is_some());
    let target = table.table.quoted();
    let insert = format!("INSERT INTO {} ({}) VALUES\n", target, column_list(columns));

    let mut out = format!("-- DATA: {} ({} rows)\n", table.table, rows.len());
    if identity {
        let _ = writeln!(out, "SET IDENTITY_INSERT {} ON;", target);
    }

    let mut batch: Vec<String> = Vec::new();
    let mut batch_bytes = insert.len();

    for row in rows {
        let literals = row
            .iter()
            .zip(columns)
            .map(|(value, column)| to_literal(value, column))
            .collect::<Result<Vec<_>, _>>()?;
        let tuple = format!("({})", literals.join(", "));

        if !batch.is_empty()
            && (batch.len() >= batch_rows || batch_bytes + tuple.len() + 2 > options.batch_bytes)
        {
            flush_batch(&mut out, &insert, &mut batch);
            batch_bytes = insert.len();
        }

        batch_bytes += tuple.len() + 2;
        batch.push(tuple);
    }
    flush_batch(&mut out, &insert, &mut batch);

    if identity {
        let _ = writeln!(out, "SET IDENTITY_INSERT {} OFF;", target);
        out.push_str("GO\n");
    }
    out.push('\n');

    Ok(out)
}

fn flush_batch(out: &mut String, insert: &str, batch: &mut Vec<String>) {
    if batch.is_empty() {
        return;
    }
    out.push_str(insert);
    out.push_str(&batch.join(",\n"));
    out.push_str(";\nGO\n");
    batch.clear();
}

/// Stage 3: keys, check and default constraints, then indexes
pub fn render_constraints(
    keys: &[KeyConstraint],
    checks: &[CheckConstraint],
    defaults: &[DefaultConstraint],
    indexes: &[IndexDef],
) -> String {
    let mut out = banner("PRIMARY KEYS AND CONSTRAINTS");

    let primary = keys.iter().filter(|k| k.kind == KeyKind::Primary);
    let unique = keys.iter().filter(|k| k.kind == KeyKind::Unique);
    for key in primary.chain(unique) {
        let _ = writeln!(
            out,
            "ALTER TABLE {} ADD CONSTRAINT {} {} {} ({});\nGO",
            key.table.quoted(),
            quote_ident(&key.name),
            match key.kind {
                KeyKind::Primary => "PRIMARY KEY",
                KeyKind::Unique => "UNIQUE",
            },
            clustering(key.clustered),
            index_columns(&key.columns)
        );
    }

    for check in checks {
        let _ = writeln!(
            out,
            "ALTER TABLE {} WITH CHECK ADD CONSTRAINT {} CHECK {};\nGO",
            check.table.quoted(),
            quote_ident(&check.name),
            check.definition
        );
    }

    out.push_str(&banner("DEFAULT CONSTRAINTS"));
    for default in defaults {
        let _ = writeln!(
            out,
            "ALTER TABLE {} ADD CONSTRAINT {} DEFAULT {} FOR {};\nGO",
            default.table.quoted(),
            quote_ident(&default.name),
            default.definition,
            quote_ident(&default.column)
        );
    }

    out.push_str(&banner("INDEXES"));
    for index in indexes {
        let mut statement = format!(
            "CREATE {}{} INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            clustering(index.clustered),
            quote_ident(&index.name),
            index.table.quoted(),
            index_columns(&index.columns)
        );
        if !index.included.is_empty() {
            let included: Vec<String> = index.included.iter().map(|c| quote_ident(c)).collect();
            let _ = write!(statement, " INCLUDE ({})", included.join(", "));
        }
        if let Some(filter) = &index.filter {
            let _ = write!(statement, " WHERE {}", filter);
        }
        let _ = writeln!(out, "{};\nGO", statement);
    }

    out
}

fn referential_action(clause: &str, action: &str) -> String {
    match action {
        "" | "NO_ACTION" => String::new(),
        other => format!(" ON {} {}", clause, other.replace('_', " ")),
    }
}

/// Stage 4: every foreign key, ordered by the referencing table's position
pub fn render_foreign_keys(foreign_keys: &[ForeignKeyDef], order: &TableOrder) -> String {
    let position: HashMap<&TableRef, usize> =
        order.tables.iter().enumerate().map(|(i, t)| (t, i)).collect();

    let mut sorted: Vec<&ForeignKeyDef> = foreign_keys.iter().collect();
    sorted.sort_by(|a, b| {
        let pa = position.get(&a.table).copied().unwrap_or(usize::MAX);
        let pb = position.get(&b.table).copied().unwrap_or(usize::MAX);
        pa.cmp(&pb).then_with(|| a.name.cmp(&b.name))
    });

    let mut out = banner("FOREIGN KEYS");
    for fk in sorted {
        let columns: Vec<String> = fk.columns.iter().map(|c| quote_ident(c)).collect();
        let referenced: Vec<String> = fk.referenced_columns.iter().map(|c| quote_ident(c)).collect();
        let _ = writeln!(
            out,
            "ALTER TABLE {} WITH CHECK ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}){}{};\nGO",
            fk.table.quoted(),
            quote_ident(&fk.name),
            columns.join(", "),
            fk.referenced.quoted(),
            referenced.join(", "),
            referential_action("DELETE", &fk.on_delete),
            referential_action("UPDATE", &fk.on_update)
        );
    }

    out
}

/// Stage 5: triggers then stored procedures, definition text verbatim
pub fn render_modules(triggers: &[ModuleDef], procedures: &[ModuleDef]) -> String {
    let mut out = banner("TRIGGERS");
    for trigger in triggers {
        push_module(&mut out, trigger, "TR", "TRIGGER");
    }

    out.push_str(&banner("STORED PROCEDURES"));
    for procedure in procedures {
        push_module(&mut out, procedure, "P", "PROCEDURE");
    }

    out
}

fn push_module(out: &mut String, module: &ModuleDef, type_code: &str, keyword: &str) {
    let name = module.object.quoted();
    let _ = writeln!(
        out,
        "IF OBJECT_ID({}, N'{}') IS NOT NULL DROP {} {};\nGO",
        string_literal(&name),
        type_code,
        keyword,
        name
    );
    out.push_str(&module.definition);
    if !module.definition.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("GO\n\n");
}
