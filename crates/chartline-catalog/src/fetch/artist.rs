//! Stage 3: batch artist lookup

use chartline_core::{ApiCall, CallError, HttpRequest, Session};
use serde::Deserialize;

use super::{CATALOG_TIMEOUT, null_as_default, or_unknown};
use crate::config::Endpoints;
use crate::records::ArtistRecord;

#[derive(Deserialize)]
struct ArtistsResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    artists: Vec<Option<ApiArtist>>,
}

#[derive(Deserialize)]
struct ApiArtist {
    id: Option<String>,
    uri: Option<String>,
    name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    genres: Vec<String>,
    popularity: Option<i64>,
    followers: Option<Followers>,
    #[serde(default, deserialize_with = "null_as_default")]
    images: Vec<Image>,
}

#[derive(Deserialize)]
struct Followers {
    total: Option<i64>,
}

#[derive(Deserialize)]
struct Image {
    url: Option<String>,
}

/// Look up one batch of artist ids (at most 50) in a single call.
pub fn fetch_artists(
    session: &mut Session,
    endpoints: &Endpoints,
    ids: &[String],
) -> Result<Vec<ArtistRecord>, CallError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let request = HttpRequest::get(endpoints.artists())
        .query("ids", ids.join(","))
        .timeout(CATALOG_TIMEOUT);
    let body = session.call(&ApiCall::catalog(request))?;
    let response: ArtistsResponse = serde_json::from_str(&body)?;

    Ok(response
        .artists
        .into_iter()
        .flatten()
        .map(|a| ArtistRecord {
            artist_id: or_unknown(a.id),
            artist_uri: or_unknown(a.uri),
            artist_name: or_unknown(a.name),
            genres: a.genres,
            popularity: a.popularity.unwrap_or(0),
            followers: a.followers.and_then(|f| f.total).unwrap_or(0),
            image_url: a
                .images
                .into_iter()
                .next()
                .and_then(|i| i.url)
                .unwrap_or_default(),
        })
        .collect())
}
