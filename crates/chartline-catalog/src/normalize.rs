//! Set operations between stages: date coercion, explode, left join

use chrono::NaiveDate;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::records::{AudioFeatureRecord, AudioFeatures, StreamRecord, TrackRecord, UNKNOWN};

/// Sentinel for release dates the API omits or we cannot parse: 2001-01-01.
pub fn default_release_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2001, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Parse an album release date at day, month or year precision.
///
/// `2024-03-15`, `2024-03` (first of month) and `2024` (1 January) are
/// accepted; anything else, including `None`, becomes [`default_release_date`].
pub fn parse_release_date(raw: Option<&str>) -> NaiveDate {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return default_release_date();
    };
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d;
    }
    let parts: Vec<&str> = raw.split('-').collect();
    let parsed = match parts.as_slice() {
        [y, m] if y.len() == 4 => y
            .parse()
            .ok()
            .zip(m.parse().ok())
            .and_then(|(y, m)| NaiveDate::from_ymd_opt(y, m, 1)),
        [y] if y.len() == 4 => y.parse().ok().and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1)),
        _ => None,
    };
    parsed.unwrap_or_else(default_release_date)
}

/// Every artist id across `tracks`, first-seen order, no duplicates.
pub fn unique_artist_ids(tracks: &[TrackRecord]) -> Vec<String> {
    let mut seen = FxHashSet::default();
    tracks
        .iter()
        .flat_map(|t| t.artist_ids.iter())
        .map(|id| id.trim())
        .filter(|id| !id.is_empty() && *id != UNKNOWN)
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}

/// Distinct track ids in first-seen order.
pub fn unique_track_ids(tracks: &[TrackRecord]) -> Vec<String> {
    let mut seen = FxHashSet::default();
    tracks
        .iter()
        .filter(|t| seen.insert(t.track_id.as_str()))
        .map(|t| t.track_id.clone())
        .collect()
}

/// Left join tracks with fetched features on track id.
///
/// Every track row appears exactly once, in input order; rows without a match
/// get [`AudioFeatures::default`]. `date` is stamped with the run date.
pub fn join_audio_features(
    tracks: &[TrackRecord],
    features: Vec<(String, AudioFeatures)>,
    run_date: NaiveDate,
) -> Vec<AudioFeatureRecord> {
    let mut by_id: FxHashMap<String, AudioFeatures> = FxHashMap::default();
    for (track_id, f) in features {
        by_id.entry(track_id).or_insert(f);
    }
    tracks
        .iter()
        .map(|t| AudioFeatureRecord {
            track: TrackRecord {
                date: run_date,
                ..t.clone()
            },
            features: by_id.get(&t.track_id).cloned().unwrap_or_default(),
        })
        .collect()
}

/// One track to query for stream counts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StreamTarget {
    pub track_id: String,
    pub release_date: NaiveDate,
}

/// Distinct (track id, release date) pairs charted on `reference`, sorted.
pub fn stream_targets(snapshot: &[TrackRecord], reference: NaiveDate) -> Vec<StreamTarget> {
    let mut targets: Vec<StreamTarget> = snapshot
        .iter()
        .filter(|t| t.date == reference)
        .map(|t| StreamTarget {
            track_id: t.track_id.clone(),
            release_date: t.release_date,
        })
        .collect();
    targets.sort();
    targets.dedup();
    targets
}

/// Counts for one day, before the track columns are joined in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyStreams {
    pub date: NaiveDate,
    pub daily: i64,
    pub total: i64,
}

/// Attach album/artist/uri/name from the first snapshot row of each track.
///
/// Tracks missing from the snapshot keep placeholder columns.
pub fn join_stream_tracks(
    counts: Vec<(String, DailyStreams)>,
    snapshot: &[TrackRecord],
) -> Vec<StreamRecord> {
    let mut first_row: FxHashMap<&str, &TrackRecord> = FxHashMap::default();
    for t in snapshot {
        first_row.entry(t.track_id.as_str()).or_insert(t);
    }
    counts
        .into_iter()
        .map(|(track_id, day)| {
            let info = first_row.get(track_id.as_str());
            StreamRecord {
                artist_ids: info.map(|t| t.artist_ids.clone()).unwrap_or_default(),
                album_id: info.map_or_else(|| UNKNOWN.into(), |t| t.album_id.clone()),
                track_uri: info.map_or_else(|| UNKNOWN.into(), |t| t.track_uri.clone()),
                track_name: info.map_or_else(|| UNKNOWN.into(), |t| t.track_name.clone()),
                track_id,
                date: day.date,
                daily_streams: day.daily,
                total_streams: day.total,
            }
        })
        .collect()
}
