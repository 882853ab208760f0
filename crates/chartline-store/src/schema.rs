//! SQL generation and value mapping between records and DuckDB
//!
//! Column types map as:
//! - Text → VARCHAR
//! - Integer → BIGINT
//! - Float → DOUBLE
//! - Boolean → BOOLEAN
//! - Date → DATE (bound and read back as `YYYY-MM-DD` text)
//! - List → VARCHAR holding a JSON array

use anyhow::{Result, bail};
use chartline_core::{Column, ColumnType, Record};
use duckdb::types::Value as DbValue;
use serde_json::Value;

fn sql_type(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Text | ColumnType::List => "VARCHAR",
        ColumnType::Integer => "BIGINT",
        ColumnType::Float => "DOUBLE",
        ColumnType::Boolean => "BOOLEAN",
        ColumnType::Date => "DATE",
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quoted SQL string literal (paths in COPY / read_parquet).
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn column_defs(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(c.name), sql_type(c.ty)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn column_list(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Keyed table for `R`.
pub fn create_table<R: Record>() -> String {
    let key = R::KEY
        .iter()
        .map(|k| quote_ident(k))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({}, PRIMARY KEY ({key}))",
        quote_ident(R::TABLE),
        column_defs(R::COLUMNS)
    )
}

/// Unkeyed temp table with `R`'s columns, used to stage snapshot writes.
pub fn create_staging<R: Record>(name: &str) -> String {
    format!(
        "CREATE OR REPLACE TEMP TABLE {} ({})",
        quote_ident(name),
        column_defs(R::COLUMNS)
    )
}

fn placeholders(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|c| match c.ty {
            ColumnType::Date => "CAST(? AS DATE)",
            _ => "?",
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Insert that silently skips rows whose key already exists.
pub fn insert_or_ignore<R: Record>() -> String {
    format!(
        "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
        quote_ident(R::TABLE),
        column_list(R::COLUMNS),
        placeholders(R::COLUMNS)
    )
}

pub fn insert_into<R: Record>(table: &str) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        column_list(R::COLUMNS),
        placeholders(R::COLUMNS)
    )
}

/// Select list returning every column in `R::COLUMNS` order, dates as text.
pub fn select_list<R: Record>() -> String {
    R::COLUMNS
        .iter()
        .map(|c| match c.ty {
            ColumnType::Date => format!("CAST({} AS VARCHAR)", quote_ident(c.name)),
            _ => quote_ident(c.name),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Bind parameters for one row.
pub fn to_params<R: Record>(row: Vec<Value>) -> Result<Vec<DbValue>> {
    R::COLUMNS
        .iter()
        .zip(row)
        .map(|(c, v)| to_db(c, v))
        .collect()
}

fn to_db(column: &Column, value: Value) -> Result<DbValue> {
    Ok(match (column.ty, value) {
        (_, Value::Null) => DbValue::Null,
        (ColumnType::List, v @ Value::Array(_)) => DbValue::Text(serde_json::to_string(&v)?),
        (ColumnType::Boolean, Value::Bool(b)) => DbValue::Boolean(b),
        (ColumnType::Integer, Value::Number(n)) => match n.as_i64() {
            Some(i) => DbValue::BigInt(i),
            None => bail!("{}: {n} is not a 64-bit integer", column.name),
        },
        (ColumnType::Float, Value::Number(n)) => DbValue::Double(n.as_f64().unwrap_or(0.0)),
        (ColumnType::Text | ColumnType::Date, Value::String(s)) => DbValue::Text(s),
        (ty, v) => bail!("{}: cannot store {v} as {ty:?}", column.name),
    })
}

/// Decode one selected value back to JSON for [`chartline_core::record::from_row`].
pub fn from_db(column: &Column, value: DbValue) -> Result<Value> {
    Ok(match (column.ty, value) {
        (_, DbValue::Null) => Value::Null,
        (ColumnType::List, DbValue::Text(s)) => serde_json::from_str(&s)?,
        (ColumnType::Text | ColumnType::Date, DbValue::Text(s)) => Value::String(s),
        (ColumnType::Boolean, DbValue::Boolean(b)) => Value::Bool(b),
        (ColumnType::Integer, DbValue::BigInt(i)) => Value::from(i),
        (ColumnType::Integer, DbValue::Int(i)) => Value::from(i),
        (ColumnType::Float, DbValue::Double(f)) => Value::from(f),
        (ColumnType::Float, DbValue::Float(f)) => Value::from(f64::from(f)),
        (ty, v) => bail!("{}: unexpected {v:?} for {ty:?}", column.name),
    })
}
