//! Normalized record types produced by the five stages

use chartline_core::ColumnType::{Boolean, Date, Float, Integer, List, Text};
use chartline_core::{Column, Record, SnapshotMode};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Placeholder for absent string fields.
pub const UNKNOWN: &str = "Unknown";

/// Daily Top 50 playlist for one market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistRecord {
    pub country: String,
    pub playlist_id: String,
    pub playlist_name: String,
}

impl Record for PlaylistRecord {
    const TABLE: &'static str = "playlists";
    const COLUMNS: &'static [Column] = &[
        Column::new("country", Text),
        Column::new("playlist_id", Text),
        Column::new("playlist_name", Text),
    ];
    const KEY: &'static [&'static str] = &["playlist_id"];
    const SNAPSHOT: SnapshotMode = SnapshotMode::Replace;
    type Key = String;

    fn key(&self) -> String {
        self.playlist_id.clone()
    }
}

const TRACK_COLUMNS: [Column; 13] = [
    Column::new("artist_ids", List),
    Column::new("album_id", Text),
    Column::new("track_id", Text),
    Column::new("track_uri", Text),
    Column::new("track_name", Text),
    Column::new("release_date", Date),
    Column::new("date_added", Text),
    Column::new("track_duration_ms", Integer),
    Column::new("popularity", Integer),
    Column::new("position", Integer),
    Column::new("is_explicit", Boolean),
    Column::new("country", Text),
    Column::new("date", Date),
];

/// One chart entry: a track at a position in a market's playlist on a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRecord {
    /// Artist ids in API order
    pub artist_ids: Vec<String>,
    pub album_id: String,
    pub track_id: String,
    pub track_uri: String,
    pub track_name: String,
    pub release_date: NaiveDate,
    pub date_added: String,
    pub track_duration_ms: i64,
    pub popularity: i64,
    /// 1-based over the playlist's non-null items
    pub position: i64,
    pub is_explicit: bool,
    pub country: String,
    pub date: NaiveDate,
}

impl Record for TrackRecord {
    const TABLE: &'static str = "tracks";
    const COLUMNS: &'static [Column] = &TRACK_COLUMNS;
    const KEY: &'static [&'static str] = &["track_id", "country", "date"];
    const SNAPSHOT: SnapshotMode = SnapshotMode::Append;
    type Key = (String, String, NaiveDate);

    fn key(&self) -> Self::Key {
        (self.track_id.clone(), self.country.clone(), self.date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRecord {
    pub artist_id: String,
    pub artist_uri: String,
    pub artist_name: String,
    pub genres: Vec<String>,
    pub popularity: i64,
    pub followers: i64,
    /// First image URL, or empty
    pub image_url: String,
}

impl Record for ArtistRecord {
    const TABLE: &'static str = "artists";
    const COLUMNS: &'static [Column] = &[
        Column::new("artist_id", Text),
        Column::new("artist_uri", Text),
        Column::new("artist_name", Text),
        Column::new("genres", List),
        Column::new("popularity", Integer),
        Column::new("followers", Integer),
        Column::new("image_url", Text),
    ];
    const KEY: &'static [&'static str] = &["artist_id"];
    const SNAPSHOT: SnapshotMode = SnapshotMode::Merge;
    type Key = String;

    fn key(&self) -> String {
        self.artist_id.clone()
    }
}

/// Audio analysis fields for one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub danceability: f64,
    pub energy: f64,
    /// Pitch class, -1 when unknown
    pub key: i64,
    pub loudness: f64,
    pub mode: i64,
    pub speechiness: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub valence: f64,
    pub tempo: f64,
    pub duration_ms: i64,
    pub time_signature: i64,
}

impl Default for AudioFeatures {
    fn default() -> Self {
        Self {
            danceability: 0.0,
            energy: 0.0,
            key: -1,
            loudness: 0.0,
            mode: 0,
            speechiness: 0.0,
            acousticness: 0.0,
            instrumentalness: 0.0,
            liveness: 0.0,
            valence: 0.0,
            tempo: 0.0,
            duration_ms: 0,
            time_signature: 4,
        }
    }
}

const AUDIO_FEATURE_COLUMNS: [Column; 26] = [
    TRACK_COLUMNS[0],
    TRACK_COLUMNS[1],
    TRACK_COLUMNS[2],
    TRACK_COLUMNS[3],
    TRACK_COLUMNS[4],
    TRACK_COLUMNS[5],
    TRACK_COLUMNS[6],
    TRACK_COLUMNS[7],
    TRACK_COLUMNS[8],
    TRACK_COLUMNS[9],
    TRACK_COLUMNS[10],
    TRACK_COLUMNS[11],
    TRACK_COLUMNS[12],
    Column::new("danceability", Float),
    Column::new("energy", Float),
    Column::new("key", Integer),
    Column::new("loudness", Float),
    Column::new("mode", Integer),
    Column::new("speechiness", Float),
    Column::new("acousticness", Float),
    Column::new("instrumentalness", Float),
    Column::new("liveness", Float),
    Column::new("valence", Float),
    Column::new("tempo", Float),
    Column::new("duration_ms", Integer),
    Column::new("time_signature", Integer),
];

/// Track row left-joined with its audio features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatureRecord {
    #[serde(flatten)]
    pub track: TrackRecord,
    #[serde(flatten)]
    pub features: AudioFeatures,
}

impl Record for AudioFeatureRecord {
    const TABLE: &'static str = "tracks_audio_features";
    const COLUMNS: &'static [Column] = &AUDIO_FEATURE_COLUMNS;
    const KEY: &'static [&'static str] = &["track_id", "country", "date"];
    const SNAPSHOT: SnapshotMode = SnapshotMode::Append;
    type Key = (String, String, NaiveDate);

    fn key(&self) -> Self::Key {
        self.track.key()
    }
}

/// Daily and cumulative stream counts for a track on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub artist_ids: Vec<String>,
    pub album_id: String,
    pub track_id: String,
    pub track_uri: String,
    pub track_name: String,
    pub date: NaiveDate,
    pub daily_streams: i64,
    pub total_streams: i64,
}

impl Record for StreamRecord {
    const TABLE: &'static str = "tracks_streams";
    const COLUMNS: &'static [Column] = &[
        Column::new("artist_ids", List),
        Column::new("album_id", Text),
        Column::new("track_id", Text),
        Column::new("track_uri", Text),
        Column::new("track_name", Text),
        Column::new("date", Date),
        Column::new("daily_streams", Integer),
        Column::new("total_streams", Integer),
    ];
    const KEY: &'static [&'static str] = &["track_id", "date"];
    const SNAPSHOT: SnapshotMode = SnapshotMode::Merge;
    type Key = (String, NaiveDate);

    fn key(&self) -> Self::Key {
        (self.track_id.clone(), self.date)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    pub fn track(id: &str, artists: &[&str], country: &str, day: &str) -> TrackRecord {
        TrackRecord {
            artist_ids: artists.iter().map(|a| a.to_string()).collect(),
            album_id: format!("album-{id}"),
            track_id: id.to_string(),
            track_uri: format!("spotify:track:{id}"),
            track_name: format!("Song {id}"),
            release_date: date("2024-01-05"),
            date_added: "2024-06-01T00:00:00Z".into(),
            track_duration_ms: 180_000,
            popularity: 80,
            position: 1,
            is_explicit: false,
            country: country.to_string(),
            date: date(day),
        }
    }
}
