//! Record shape shared by sinks: table name, typed columns, unique key,
//! snapshot mode.

use std::collections::BTreeMap;

use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Storage type of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Float,
    Boolean,
    /// `YYYY-MM-DD`
    Date,
    /// Ordered list of strings
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
}

impl Column {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self { name, ty }
    }
}

/// How a stage's output lands in the cumulative snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotMode {
    /// New rows are added to the history as written
    Append,
    /// Existing rows plus new rows, deduplicated by key (existing wins), sorted
    Merge,
    /// The current batch, deduplicated by key, replaces the snapshot
    Replace,
}

impl std::fmt::Display for SnapshotMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Append => "append",
            Self::Merge => "merge",
            Self::Replace => "replace",
        })
    }
}

/// A persisted record type.
///
/// The serde field names must match `COLUMNS` exactly; sinks move rows
/// through `serde_json::Value` by column name.
pub trait Record: Serialize + DeserializeOwned + Clone {
    const TABLE: &'static str;
    const COLUMNS: &'static [Column];
    /// Column names forming the unique key
    const KEY: &'static [&'static str];
    const SNAPSHOT: SnapshotMode;

    type Key: Ord + Clone + std::fmt::Debug;

    fn key(&self) -> Self::Key;
}

/// Deduplicate by key (first occurrence wins) and sort by key.
pub fn dedupe_sorted<R: Record>(records: impl IntoIterator<Item = R>) -> Vec<R> {
    let mut by_key = BTreeMap::new();
    for record in records {
        by_key.entry(record.key()).or_insert(record);
    }
    by_key.into_values().collect()
}

/// Cumulative merge: `existing` rows win over `incoming` on key collision.
pub fn merge_snapshot<R: Record>(existing: Vec<R>, incoming: &[R]) -> Vec<R> {
    dedupe_sorted(existing.into_iter().chain(incoming.iter().cloned()))
}

/// Column values of `record` in `R::COLUMNS` order.
pub fn to_row<R: Record>(record: &R) -> anyhow::Result<Vec<Value>> {
    let value = serde_json::to_value(record)
        .with_context(|| format!("Failed to serialize {} row", R::TABLE))?;
    let Value::Object(mut fields) = value else {
        anyhow::bail!("{} record did not serialize to an object", R::TABLE);
    };
    Ok(R::COLUMNS
        .iter()
        .map(|c| fields.remove(c.name).unwrap_or(Value::Null))
        .collect())
}

/// Rebuild a record from column values in `R::COLUMNS` order.
pub fn from_row<R: Record>(values: Vec<Value>) -> anyhow::Result<R> {
    anyhow::ensure!(
        values.len() == R::COLUMNS.len(),
        "{}: expected {} columns, got {}",
        R::TABLE,
        R::COLUMNS.len(),
        values.len()
    );
    let fields: Map<String, Value> = R::COLUMNS
        .iter()
        .map(|c| c.name.to_string())
        .zip(values)
        .collect();
    serde_json::from_value(Value::Object(fields))
        .with_context(|| format!("Failed to decode {} row", R::TABLE))
}

/// Stable string form of a record's key columns, for hashing.
pub fn key_string<R: Record>(record: &R) -> anyhow::Result<String> {
    let row = to_row(record)?;
    let key: Vec<&Value> = R::KEY
        .iter()
        .filter_map(|k| R::COLUMNS.iter().position(|c| c.name == *k))
        .map(|i| &row[i])
        .collect();
    Ok(serde_json::to_string(&key)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Song {
        pub id: String,
        pub day: String,
        pub plays: i64,
        pub tags: Vec<String>,
    }

    impl Song {
        pub fn new(id: &str, day: &str, plays: i64) -> Self {
            Self {
                id: id.into(),
                day: day.into(),
                plays,
                tags: vec!["pop".into()],
            }
        }
    }

    impl Record for Song {
        const TABLE: &'static str = "songs";
        const COLUMNS: &'static [Column] = &[
            Column::new("id", ColumnType::Text),
            Column::new("day", ColumnType::Date),
            Column::new("plays", ColumnType::Integer),
            Column::new("tags", ColumnType::List),
        ];
        const KEY: &'static [&'static str] = &["id", "day"];
        const SNAPSHOT: SnapshotMode = SnapshotMode::Merge;
        type Key = (String, String);

        fn key(&self) -> Self::Key {
            (self.id.clone(), self.day.clone())
        }
    }

    #[test]
    fn dedupe_keeps_first_and_sorts() {
        let out = dedupe_sorted(vec![
            Song::new("b", "2024-01-01", 1),
            Song::new("a", "2024-01-02", 2),
            Song::new("b", "2024-01-01", 99),
            Song::new("a", "2024-01-01", 3),
        ]);
        let keys: Vec<_> = out.iter().map(|s| (s.id.as_str(), s.plays)).collect();
        assert_eq!(keys, vec![("a", 3), ("a", 2), ("b", 1)]);
    }

    #[test]
    fn merge_prefers_existing_rows() {
        let existing = vec![Song::new("a", "2024-01-01", 1)];
        let incoming = vec![
            Song::new("a", "2024-01-01", 50),
            Song::new("c", "2024-01-01", 7),
        ];
        let merged = merge_snapshot(existing, &incoming);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].plays, 1);
        assert_eq!(merged[1].id, "c");
    }

    #[test]
    fn row_follows_column_order() {
        let song = Song::new("x", "2024-03-01", 5);
        let row = to_row(&song).unwrap();
        assert_eq!(row[0], Value::from("x"));
        assert_eq!(row[2], Value::from(5));
        assert_eq!(row[3], serde_json::json!(["pop"]));
        assert_eq!(from_row::<Song>(row).unwrap(), song);
    }

    #[test]
    fn from_row_rejects_wrong_width() {
        assert!(from_row::<Song>(vec![Value::from("x")]).is_err());
    }

    #[test]
    fn key_string_uses_key_columns_only() {
        let a = Song::new("x", "2024-03-01", 5);
        let b = Song::new("x", "2024-03-01", 6);
        assert_eq!(key_string(&a).unwrap(), key_string(&b).unwrap());
        assert_eq!(key_string(&a).unwrap(), r#"["x","2024-03-01"]"#);
    }
}
