//! Stage 2: playlist detail into chart entries

use chartline_core::{ApiCall, CallError, HttpRequest, Session};
use chrono::NaiveDate;
use serde::Deserialize;

use super::{CATALOG_TIMEOUT, null_as_default, or_unknown};
use crate::config::Endpoints;
use crate::normalize::parse_release_date;
use crate::records::{PlaylistRecord, TrackRecord};

#[derive(Deserialize)]
struct PlaylistDetail {
    #[serde(default, deserialize_with = "null_as_default")]
    tracks: TrackPage,
}

#[derive(Default, Deserialize)]
struct TrackPage {
    #[serde(default, deserialize_with = "null_as_default")]
    items: Vec<Option<PlaylistItem>>,
}

#[derive(Deserialize)]
struct PlaylistItem {
    added_at: Option<String>,
    track: Option<ApiTrack>,
}

#[derive(Deserialize)]
struct ApiTrack {
    id: Option<String>,
    uri: Option<String>,
    name: Option<String>,
    duration_ms: Option<i64>,
    popularity: Option<i64>,
    explicit: Option<bool>,
    album: Option<Album>,
    #[serde(default, deserialize_with = "null_as_default")]
    artists: Vec<Option<ArtistRef>>,
}

#[derive(Deserialize)]
struct Album {
    id: Option<String>,
    release_date: Option<String>,
}

#[derive(Deserialize)]
struct ArtistRef {
    id: Option<String>,
}

/// Fetch every track of `playlist` as chart entries dated `run_date`.
///
/// Null tracks are skipped and do not consume a position.
pub fn fetch_tracks(
    session: &mut Session,
    endpoints: &Endpoints,
    playlist: &PlaylistRecord,
    run_date: NaiveDate,
) -> Result<Vec<TrackRecord>, CallError> {
    let request =
        HttpRequest::get(endpoints.playlist(&playlist.playlist_id)).timeout(CATALOG_TIMEOUT);
    let body = session.call(&ApiCall::catalog(request))?;
    let detail: PlaylistDetail = serde_json::from_str(&body)?;

    let mut tracks = Vec::with_capacity(detail.tracks.items.len());
    for item in detail.tracks.items.into_iter().flatten() {
        let Some(track) = item.track else {
            log::warn!("Missing track data in playlist: {}", playlist.playlist_id);
            continue;
        };

        let artist_ids: Vec<String> = track
            .artists
            .into_iter()
            .flatten()
            .filter_map(|a| a.id)
            .collect();
        let track_id = or_unknown(track.id);
        if artist_ids.is_empty() {
            log::warn!("No artists found for track: {track_id}");
        }
        let (album_id, release_date) = match track.album {
            Some(album) => (album.id, album.release_date),
            None => (None, None),
        };

        tracks.push(TrackRecord {
            artist_ids,
            album_id: or_unknown(album_id),
            track_id,
            track_uri: or_unknown(track.uri),
            track_name: or_unknown(track.name),
            release_date: parse_release_date(release_date.as_deref()),
            date_added: or_unknown(item.added_at),
            track_duration_ms: track.duration_ms.unwrap_or(0),
            popularity: track.popularity.unwrap_or(0),
            position: tracks.len() as i64 + 1,
            is_explicit: track.explicit.unwrap_or(false),
            country: playlist.country.clone(),
            date: run_date,
        });
    }
    Ok(tracks)
}
