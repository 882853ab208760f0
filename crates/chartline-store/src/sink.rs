//! [`Sink`] over a DuckDB file plus a Parquet snapshot directory

use std::path::{Path, PathBuf};

use anyhow::Result;
use chartline_core::{Record, Sink};

use crate::database::{Database, TableCount};
use crate::snapshot::{SnapshotCount, SnapshotDir};

/// Default database file name under the output directory.
pub const DATABASE_FILE: &str = "chartline.duckdb";

/// Row counts for `chartline status`.
#[derive(Debug, Clone, Default)]
pub struct StoreStatus {
    pub tables: Vec<TableCount>,
    pub snapshots: Vec<SnapshotCount>,
}

pub struct StoreSink {
    db: Database,
    snapshots: SnapshotDir,
    database_path: PathBuf,
}

impl StoreSink {
    /// Open `{output}/chartline.duckdb` and `{output}/snapshots/`.
    pub fn open(output: &Path) -> Result<Self> {
        Self::open_with(output, &output.join(DATABASE_FILE))
    }

    /// Open with an explicit database path.
    pub fn open_with(output: &Path, database: &Path) -> Result<Self> {
        let db = Database::open(database)?;
        let snapshots = SnapshotDir::new(&output.join("snapshots"))?;
        log::debug!(
            "Store opened: db={}, snapshots={}",
            database.display(),
            snapshots.root().display()
        );
        Ok(Self {
            db,
            snapshots,
            database_path: database.to_path_buf(),
        })
    }

    /// Create `R`'s keyed table up front so `status` lists it before any write.
    pub fn register<R: Record>(&self) -> Result<()> {
        self.db.ensure_table::<R>()
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn snapshot_dir(&self) -> &Path {
        self.snapshots.root()
    }

    /// Stored rows of `R`, ordered by key.
    pub fn rows<R: Record>(&self) -> Result<Vec<R>> {
        self.db.rows()
    }

    pub fn status(&self) -> Result<StoreStatus> {
        Ok(StoreStatus {
            tables: self.db.table_counts()?,
            snapshots: self.snapshots.counts(self.db.connection())?,
        })
    }
}

impl Sink for StoreSink {
    fn upsert<R: Record>(&mut self, records: &[R]) -> Result<usize> {
        self.db.upsert(records)
    }

    fn load_snapshot<R: Record>(&self) -> Result<Vec<R>> {
        self.snapshots.load(self.db.connection())
    }

    fn append_snapshot<R: Record>(&mut self, records: &[R]) -> Result<()> {
        let path = self.snapshots.append(self.db.connection(), records)?;
        log::info!("{}: appended {} rows to {}", R::TABLE, records.len(), path.display());
        Ok(())
    }

    fn overwrite_snapshot<R: Record>(&mut self, records: &[R]) -> Result<()> {
        let path = self.snapshots.overwrite(self.db.connection(), records)?;
        log::info!("{}: wrote {} rows to {}", R::TABLE, records.len(), path.display());
        Ok(())
    }
}
