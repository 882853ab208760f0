//! Parquet snapshot directory
//!
//! Directory layout:
//! ```text
//! {output}/snapshots/
//! ├── tracks/
//! │   ├── tracks_000001.parquet      # append mode: one part per write
//! │   └── tracks_000002.parquet
//! └── artists/
//!     └── artists.parquet            # merge/replace: rewritten atomically
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chartline_core::record::to_row;
use chartline_core::{Record, SnapshotMode};
use duckdb::Connection;
use duckdb::types::Value as DbValue;

use crate::database::query_records;
use crate::schema::{self, quote_ident, quote_literal};

/// Files and rows of one snapshot table, for `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotCount {
    pub table: String,
    pub files: usize,
    pub rows: u64,
}

pub struct SnapshotDir {
    root: PathBuf,
}

impl SnapshotDir {
    pub fn new(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("Failed to create snapshot dir: {}", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table_dir(&self, table: &str) -> PathBuf {
        self.root.join(table)
    }

    /// Parquet files of `table`, sorted by name (part order for append mode).
    pub fn files(&self, table: &str) -> Result<Vec<PathBuf>> {
        let pattern = self.table_dir(table).join("*.parquet");
        let pattern = pattern.to_string_lossy();
        let mut files: Vec<PathBuf> = glob::glob(&pattern)
            .with_context(|| format!("Invalid glob pattern: {pattern}"))?
            .filter_map(|entry| entry.ok())
            .collect();
        files.sort();
        Ok(files)
    }

    /// Write `records` as a new part file.
    pub fn append<R: Record>(&self, conn: &Connection, records: &[R]) -> Result<PathBuf> {
        let dir = self.table_dir(R::TABLE);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create dir: {}", dir.display()))?;
        let next = self
            .files(R::TABLE)?
            .iter()
            .filter_map(|p| part_index(p, R::TABLE))
            .max()
            .unwrap_or(0)
            + 1;
        let path = dir.join(format!("{}_{next:06}.parquet", R::TABLE));
        write_parquet(conn, records, &path)?;
        Ok(path)
    }

    /// Replace the snapshot with `records` via `.tmp` then rename.
    pub fn overwrite<R: Record>(&self, conn: &Connection, records: &[R]) -> Result<PathBuf> {
        let dir = self.table_dir(R::TABLE);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create dir: {}", dir.display()))?;
        let path = dir.join(format!("{}.parquet", R::TABLE));
        let tmp = dir.join(format!("{}.parquet.tmp", R::TABLE));
        write_parquet(conn, records, &tmp)?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to rename {} -> {}", tmp.display(), path.display()))?;
        Ok(path)
    }

    /// Every snapshot row of `R`; empty when nothing was written yet.
    pub fn load<R: Record>(&self, conn: &Connection) -> Result<Vec<R>> {
        let files = match R::SNAPSHOT {
            SnapshotMode::Append => self.files(R::TABLE)?,
            SnapshotMode::Merge | SnapshotMode::Replace => {
                let path = self.table_dir(R::TABLE).join(format!("{}.parquet", R::TABLE));
                if path.exists() { vec![path] } else { Vec::new() }
            }
        };
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM read_parquet({})",
            schema::select_list::<R>(),
            file_list(&files)
        );
        query_records::<R>(conn, &sql)
            .with_context(|| format!("Failed to read {} snapshot", R::TABLE))
    }

    /// File and row counts per snapshot table.
    pub fn counts(&self, conn: &Connection) -> Result<Vec<SnapshotCount>> {
        let mut tables: Vec<String> = fs::read_dir(&self.root)
            .with_context(|| format!("Failed to list {}", self.root.display()))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        tables.sort();

        let mut counts = Vec::with_capacity(tables.len());
        for table in tables {
            let files = self.files(&table)?;
            let rows: i64 = if files.is_empty() {
                0
            } else {
                conn.query_row(
                    &format!("SELECT count(*) FROM read_parquet({})", file_list(&files)),
                    [],
                    |row| row.get(0),
                )?
            };
            counts.push(SnapshotCount {
                table,
                files: files.len(),
                rows: rows.max(0) as u64,
            });
        }
        Ok(counts)
    }
}

/// `tracks_000012.parquet` → 12
fn part_index(path: &Path, table: &str) -> Option<u32> {
    path.file_stem()?
        .to_str()?
        .strip_prefix(table)?
        .strip_prefix('_')?
        .parse()
        .ok()
}

fn file_list(files: &[PathBuf]) -> String {
    let quoted: Vec<String> = files
        .iter()
        .map(|p| quote_literal(&p.to_string_lossy()))
        .collect();
    format!("[{}]", quoted.join(", "))
}

/// Stage rows in a temp table and COPY it out as Parquet.
fn write_parquet<R: Record>(conn: &Connection, records: &[R], path: &Path) -> Result<()> {
    let staging = format!("snapshot_{}", R::TABLE);
    conn.execute_batch(&schema::create_staging::<R>(&staging))
        .with_context(|| format!("Failed to create staging table for {}", R::TABLE))?;
    {
        let mut stmt = conn.prepare(&schema::insert_into::<R>(&staging))?;
        for record in records {
            let params: Vec<DbValue> = schema::to_params::<R>(to_row(record)?)?;
            stmt.execute(duckdb::params_from_iter(params))?;
        }
    }
    conn.execute_batch(&format!(
        "COPY {} TO {} (FORMAT PARQUET); DROP TABLE {};",
        quote_ident(&staging),
        quote_literal(&path.to_string_lossy()),
        quote_ident(&staging)
    ))
    .with_context(|| format!("Failed to write {}", path.display()))?;
    log::debug!("Wrote {} rows to {}", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_index_parses_suffix() {
        assert_eq!(part_index(Path::new("/s/tracks/tracks_000012.parquet"), "tracks"), Some(12));
        assert_eq!(part_index(Path::new("/s/tracks/tracks.parquet"), "tracks"), None);
        assert_eq!(
            part_index(Path::new("/s/x/tracks_streams_000001.parquet"), "tracks"),
            None
        );
    }

    #[test]
    fn file_list_is_sql_array() {
        let files = vec![PathBuf::from("/a/x.parquet"), PathBuf::from("/a/y.parquet")];
        assert_eq!(file_list(&files), "['/a/x.parquet', '/a/y.parquet']");
    }
}
