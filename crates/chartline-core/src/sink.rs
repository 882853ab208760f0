//! Persistence boundary for stage output

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;

use crate::record::{Record, SnapshotMode, dedupe_sorted, from_row, key_string, merge_snapshot, to_row};

/// Where stage output is persisted.
///
/// Two stores per record type: an idempotent keyed table and a cumulative
/// snapshot. Implementations never overwrite a keyed row.
pub trait Sink {
    /// Insert-or-ignore on `R::KEY`. Returns the number of rows newly stored.
    fn upsert<R: Record>(&mut self, records: &[R]) -> anyhow::Result<usize>;

    /// Current snapshot rows, empty if none has been written.
    fn load_snapshot<R: Record>(&self) -> anyhow::Result<Vec<R>>;

    /// Add rows to the snapshot history.
    fn append_snapshot<R: Record>(&mut self, records: &[R]) -> anyhow::Result<()>;

    /// Make the snapshot contain exactly `records`.
    fn overwrite_snapshot<R: Record>(&mut self, records: &[R]) -> anyhow::Result<()>;

    /// Write `records` according to `R::SNAPSHOT` and return what the
    /// snapshot now holds for this batch (the merged set for `Merge`).
    fn write_snapshot<R: Record>(&mut self, records: &[R]) -> anyhow::Result<Vec<R>> {
        match R::SNAPSHOT {
            SnapshotMode::Append => {
                self.append_snapshot(records)?;
                Ok(records.to_vec())
            }
            SnapshotMode::Merge => {
                let merged = merge_snapshot(self.load_snapshot::<R>()?, records);
                self.overwrite_snapshot(&merged)?;
                Ok(merged)
            }
            SnapshotMode::Replace => {
                let batch = dedupe_sorted(records.iter().cloned());
                self.overwrite_snapshot(&batch)?;
                Ok(batch)
            }
        }
    }
}

#[derive(Debug, Default)]
struct MemoryTable {
    keys: FxHashSet<String>,
    rows: Vec<Vec<Value>>,
}

/// In-memory [`Sink`] for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: FxHashMap<&'static str, MemoryTable>,
    snapshots: FxHashMap<&'static str, Vec<Vec<Value>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows stored in the keyed table for `R`.
    pub fn rows<R: Record>(&self) -> anyhow::Result<Vec<R>> {
        self.tables
            .get(R::TABLE)
            .map(|t| t.rows.iter().cloned().map(from_row).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    pub fn table_len(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |t| t.rows.len())
    }

    pub fn snapshot_len(&self, table: &str) -> usize {
        self.snapshots.get(table).map_or(0, Vec::len)
    }
}

impl Sink for MemorySink {
    fn upsert<R: Record>(&mut self, records: &[R]) -> anyhow::Result<usize> {
        let table = self.tables.entry(R::TABLE).or_default();
        let mut inserted = 0;
        for record in records {
            if table.keys.insert(key_string(record)?) {
                table.rows.push(to_row(record)?);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    fn load_snapshot<R: Record>(&self) -> anyhow::Result<Vec<R>> {
        self.snapshots
            .get(R::TABLE)
            .map(|rows| rows.iter().cloned().map(from_row).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn append_snapshot<R: Record>(&mut self, records: &[R]) -> anyhow::Result<()> {
        let rows = records.iter().map(to_row).collect::<anyhow::Result<Vec<_>>>()?;
        self.snapshots.entry(R::TABLE).or_default().extend(rows);
        Ok(())
    }

    fn overwrite_snapshot<R: Record>(&mut self, records: &[R]) -> anyhow::Result<()> {
        let rows = records.iter().map(to_row).collect::<anyhow::Result<Vec<_>>>()?;
        self.snapshots.insert(R::TABLE, rows);
        Ok(())
    }
}
