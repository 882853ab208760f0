//! Keyed tables in a DuckDB file

use std::path::Path;

use anyhow::{Context, Result};
use chartline_core::Record;
use chartline_core::record::{from_row, to_row};
use duckdb::Connection;
use duckdb::types::Value as DbValue;

use crate::schema;

/// Row count of one table, for `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCount {
    pub table: String,
    pub rows: u64,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create dir: {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open DuckDB in-memory connection")?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create `R`'s table with its primary key if it does not exist yet.
    pub fn ensure_table<R: Record>(&self) -> Result<()> {
        self.conn
            .execute_batch(&schema::create_table::<R>())
            .with_context(|| format!("Failed to create table {}", R::TABLE))
    }

    /// Insert rows whose key is not stored yet; returns how many were new.
    pub fn upsert<R: Record>(&mut self, records: &[R]) -> Result<usize> {
        self.ensure_table::<R>()?;
        let count_sql = format!("SELECT count(*) FROM {}", schema::quote_ident(R::TABLE));

        let tx = self
            .conn
            .transaction()
            .context("Failed to begin transaction")?;
        let before: i64 = tx.query_row(&count_sql, [], |row| row.get(0))?;
        {
            let mut stmt = tx
                .prepare(&schema::insert_or_ignore::<R>())
                .with_context(|| format!("Failed to prepare insert into {}", R::TABLE))?;
            for record in records {
                let params: Vec<DbValue> = schema::to_params::<R>(to_row(record)?)?;
                stmt.execute(duckdb::params_from_iter(params))
                    .with_context(|| format!("Failed to insert into {}", R::TABLE))?;
            }
        }
        let after: i64 = tx.query_row(&count_sql, [], |row| row.get(0))?;
        tx.commit()
            .with_context(|| format!("Failed to commit {}", R::TABLE))?;

        let inserted = usize::try_from(after - before).unwrap_or(0);
        log::debug!(
            "{}: {inserted} new of {} rows",
            R::TABLE,
            records.len()
        );
        Ok(inserted)
    }

    /// Every stored row of `R`, ordered by key.
    pub fn rows<R: Record>(&self) -> Result<Vec<R>> {
        self.ensure_table::<R>()?;
        let order = R::KEY
            .iter()
            .map(|k| schema::quote_ident(k))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {order}",
            schema::select_list::<R>(),
            schema::quote_ident(R::TABLE)
        );
        query_records::<R>(&self.conn, &sql)
    }

    /// Row counts of every table, by name.
    pub fn table_counts(&self) -> Result<Vec<TableCount>> {
        let mut stmt = self.conn.prepare(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'main' AND table_type = 'BASE TABLE' ORDER BY table_name",
        )?;
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;

        tables
            .into_iter()
            .map(|table| -> Result<TableCount> {
                let rows: i64 = self.conn.query_row(
                    &format!("SELECT count(*) FROM {}", schema::quote_ident(&table)),
                    [],
                    |row| row.get(0),
                )?;
                Ok(TableCount {
                    table,
                    rows: rows.max(0) as u64,
                })
            })
            .collect()
    }
}

/// Run `sql` (selecting [`schema::select_list`]) and decode each row as `R`.
pub(crate) fn query_records<R: Record>(conn: &Connection, sql: &str) -> Result<Vec<R>> {
    let mut stmt = conn
        .prepare(sql)
        .with_context(|| format!("Failed to prepare query on {}", R::TABLE))?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(R::COLUMNS.len());
        for (i, column) in R::COLUMNS.iter().enumerate() {
            let value: DbValue = row.get(i)?;
            values.push(schema::from_db(column, value)?);
        }
        out.push(from_row(values)?);
    }
    Ok(out)
}
