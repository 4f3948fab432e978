//! Column values and their T-SQL literal form
//!
//! Every literal is rendered for the column's declared type; a value that
//! does not fit that type is a serialization error rather than a guess.

use super::catalog::ColumnDef;
use crate::error::{BackupError, ErrorKind};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::fmt::Write;

/// A value read from a table
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    /// Exact numeric kept as its decimal text
    Decimal(String),
    Float(f64),
    Text(String),
    Binary(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Uuid(String),
}

/// How a declared column type is read and written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    Bit,
    Integer,
    Decimal,
    Float,
    Text { unicode: bool },
    Binary,
    Date,
    Time,
    /// `datetime` and `smalldatetime` (millisecond precision)
    DateTime,
    DateTime2,
    DateTimeOffset,
    Uuid,
    /// CLR types carried as their binary serialization
    Clr,
    Unsupported,
}

impl TypeClass {
    pub fn of(type_name: &str) -> Self {
        match type_name.to_ascii_lowercase().as_str() {
            "bit" => TypeClass::Bit,
            "tinyint" | "smallint" | "int" | "bigint" => TypeClass::Integer,
            "decimal" | "numeric" | "money" | "smallmoney" => TypeClass::Decimal,
            "float" | "real" => TypeClass::Float,
            "char" | "varchar" | "text" => TypeClass::Text { unicode: false },
            "nchar" | "nvarchar" | "ntext" | "xml" | "sysname" => TypeClass::Text { unicode: true },
            "binary" | "varbinary" | "image" | "timestamp" | "rowversion" => TypeClass::Binary,
            "date" => TypeClass::Date,
            "time" => TypeClass::Time,
            "datetime" | "smalldatetime" => TypeClass::DateTime,
            "datetime2" => TypeClass::DateTime2,
            "datetimeoffset" => TypeClass::DateTimeOffset,
            "uniqueidentifier" => TypeClass::Uuid,
            "geography" | "geometry" | "hierarchyid" => TypeClass::Clr,
            _ => TypeClass::Unsupported,
        }
    }
}

/// Render the DDL type of a column: `nvarchar(50)`, `decimal(10,2)`, `datetime2(3)`
pub fn render_type(column: &ColumnDef) -> String {
    let name = column.type_name.to_ascii_lowercase();
    let length = |divisor: i32| {
        if column.max_length == -1 {
            "MAX".to_string()
        } else {
            (column.max_length / divisor).to_string()
        }
    };

    match name.as_str() {
        "char" | "varchar" | "binary" | "varbinary" => format!("{}({})", name, length(1)),
        "nchar" | "nvarchar" => format!("{}({})", name, length(2)),
        "decimal" | "numeric" => format!("{}({},{})", name, column.precision, column.scale),
        "datetime2" | "time" | "datetimeoffset" => format!("{}({})", name, column.scale),
        "float" if column.precision > 0 && column.precision != 53 => {
            format!("float({})", column.precision)
        }
        _ => name,
    }
}

fn mismatch(column: &ColumnDef, value: &SqlValue) -> BackupError {
    BackupError::new(
        ErrorKind::Serialization,
        format!(
            "value {:?} cannot be written to column [{}] of type {}",
            value, column.name, column.type_name
        ),
    )
}

/// Render `value` as a literal for `column`
pub fn to_literal(value: &SqlValue, column: &ColumnDef) -> Result<String, BackupError> {
    let class = TypeClass::of(&column.type_name);

    if *value == SqlValue::Null {
        return Ok("NULL".to_string());
    }

    let literal = match (class, value) {
        (TypeClass::Unsupported, _) => {
            return Err(BackupError::new(
                ErrorKind::Serialization,
                format!(
                    "column [{}] has unsupported type {}",
                    column.name, column.type_name
                ),
            ))
        }
        (TypeClass::Bit, SqlValue::Bool(b)) => (if *b { "1" } else { "0" }).to_string(),
        (TypeClass::Bit, SqlValue::Int(i)) if *i == 0 || *i == 1 => i.to_string(),
        (TypeClass::Integer, SqlValue::Int(i)) => i.to_string(),
        (TypeClass::Decimal, SqlValue::Decimal(d)) if is_decimal_text(d) => d.clone(),
        (TypeClass::Decimal, SqlValue::Int(i)) => i.to_string(),
        (TypeClass::Float, SqlValue::Float(f)) if f.is_finite() => format!("{:e}", f),
        (TypeClass::Float, SqlValue::Int(i)) => i.to_string(),
        (TypeClass::Text { unicode }, SqlValue::Text(s)) => text_literal(s, unicode),
        (TypeClass::Binary | TypeClass::Clr, SqlValue::Binary(bytes)) => binary_literal(bytes),
        (TypeClass::Date, SqlValue::Date(d)) => format!("'{}'", d.format("%Y-%m-%d")),
        (TypeClass::Time, SqlValue::Time(t)) => format!("'{}'", time_text(t, 7)),
        (TypeClass::DateTime, SqlValue::DateTime(dt)) => datetime_literal(dt, 3),
        (TypeClass::DateTime2, SqlValue::DateTime(dt)) => datetime_literal(dt, 7),
        (TypeClass::DateTimeOffset, SqlValue::DateTimeOffset(dt)) => format!(
            "'{}T{}{}'",
            dt.date_naive().format("%Y-%m-%d"),
            time_text(&dt.time(), 7),
            dt.format("%:z")
        ),
        (TypeClass::Uuid, SqlValue::Uuid(u)) if is_uuid_text(u) => format!("'{}'", u.to_uppercase()),
        _ => return Err(mismatch(column, value)),
    };

    Ok(literal)
}

fn datetime_literal(dt: &NaiveDateTime, max_digits: usize) -> String {
    format!("'{}T{}'", dt.date().format("%Y-%m-%d"), time_text(&dt.time(), max_digits))
}

/// `HH:MM:SS[.fffffff]` with trailing zeros trimmed
fn time_text(t: &NaiveTime, max_digits: usize) -> String {
    let mut out = t.format("%H:%M:%S").to_string();
    let nanos = t.nanosecond() % 1_000_000_000;
    if nanos > 0 {
        let digits = format!("{:09}", nanos);
        let fraction = digits[..max_digits.min(9)].trim_end_matches('0');
        if !fraction.is_empty() {
            out.push('.');
            out.push_str(fraction);
        }
    }
    out
}

fn binary_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        let _ = write!(out, "{:02X}", b);
    }
    out
}

/// Quote a string, doubling embedded quotes
///
/// A line inside the value that reads as a `GO` separator would split the
/// batch when replayed through sqlcmd, so line breaks in such values are
/// emitted as `CHAR(10)`/`CHAR(13)` concatenations.
fn text_literal(s: &str, unicode: bool) -> String {
    let prefix = if unicode { "N" } else { "" };
    let quote = |part: &str| format!("{}'{}'", prefix, part.replace('\'', "''"));

    if !contains_batch_separator(s) {
        return quote(s);
    }

    let char_fn = if unicode { "NCHAR" } else { "CHAR" };
    let mut pieces = Vec::new();
    let mut current = String::new();
    for ch in s.chars() {
        match ch {
            '\n' | '\r' => {
                pieces.push(quote(&current));
                current.clear();
                pieces.push(format!("{}({})", char_fn, ch as u32));
            }
            _ => current.push(ch),
        }
    }
    pieces.push(quote(&current));
    pieces.join(" + ")
}

fn contains_batch_separator(s: &str) -> bool {
    s.lines().skip(1).any(|line| {
        let mut words = line.split_whitespace();
        match (words.next(), words.next()) {
            (Some(first), rest) => {
                first.eq_ignore_ascii_case("go")
                    && rest.map(|r| r.bytes().all(|b| b.is_ascii_digit())).unwrap_or(true)
            }
            _ => false,
        }
    })
}

fn is_decimal_text(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let mut parts = digits.splitn(2, '.');
    let whole = parts.next().unwrap_or("");
    let fraction = parts.next();
    !whole.is_empty()
        && whole.bytes().all(|b| b.is_ascii_digit())
        && fraction.map(|f| f.bytes().all(|b| b.is_ascii_digit())).unwrap_or(true)
}

fn is_uuid_text(s: &str) -> bool {
    s.len() == 36
        && s.char_indices().all(|(i, c)| match i {
            8 | 13 | 18 | 23 => c == '-',
            _ => c.is_ascii_hexdigit(),
        })
}
