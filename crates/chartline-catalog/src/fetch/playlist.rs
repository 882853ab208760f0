//! Stage 1: locate a market's official Top 50 playlist via search

use chartline_core::{ApiCall, CallError, HttpRequest, Session};
use serde::Deserialize;

use super::{SEARCH_TIMEOUT, null_as_default, or_unknown};
use crate::config::{Endpoints, Market, SearchConfig};
use crate::records::PlaylistRecord;

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    playlists: PlaylistPage,
}

#[derive(Default, Deserialize)]
struct PlaylistPage {
    #[serde(default, deserialize_with = "null_as_default")]
    items: Vec<Option<PlaylistItem>>,
}

#[derive(Deserialize)]
struct PlaylistItem {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    owner: Option<Owner>,
}

#[derive(Deserialize)]
struct Owner {
    id: Option<String>,
}

/// Search `Top 50 - {country}` in the market and accept the first hit only if
/// it is the official chart playlist.
pub fn fetch_playlist(
    session: &mut Session,
    endpoints: &Endpoints,
    search: &SearchConfig,
    market: &Market,
) -> Result<Option<PlaylistRecord>, CallError> {
    let request = HttpRequest::get(endpoints.search())
        .query("q", SearchConfig::query(&market.country))
        .query("type", "playlist")
        .query("market", market.code.as_str())
        .query("limit", "1")
        .timeout(SEARCH_TIMEOUT);
    let body = session.call(&ApiCall::catalog(request))?;
    let response: SearchResponse = serde_json::from_str(&body)?;

    let Some(Some(hit)) = response.playlists.items.into_iter().next() else {
        log::warn!("{}: search returned no playlist", market.country);
        return Ok(None);
    };

    let owner = hit.owner.and_then(|o| o.id);
    let expected = search.description(&market.country);
    if owner.as_deref() != Some(search.owner.as_str())
        || hit.description.as_deref() != Some(expected.as_str())
    {
        log::warn!(
            "{}: top search hit {:?} is not the official chart (owner {:?})",
            market.country,
            hit.name,
            owner
        );
        return Ok(None);
    }

    Ok(Some(PlaylistRecord {
        country: market.country.clone(),
        playlist_id: or_unknown(hit.id),
        playlist_name: or_unknown(hit.name),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::harness;
    use chartline_core::HttpResponse;

    fn search_body(owner: &str, description: &str) -> String {
        serde_json::json!({
            "playlists": {
                "items": [{
                    "id": "37i9dQZEVXbLdGSmz6xilI",
                    "name": "Top 50 - Vietnam",
                    "description": description,
                    "owner": {"id": owner}
                }]
            }
        })
        .to_string()
    }

    fn run(body: &str) -> (Result<Option<PlaylistRecord>, CallError>, Vec<HttpRequest>) {
        let (mut session, transport, _clock) = harness::session();
        transport.route("/search", HttpResponse::new(200, body));
        let result = fetch_playlist(
            &mut session,
            &Endpoints::default(),
            &SearchConfig::default(),
            &Market::new("Vietnam", "VN"),
        );
        (result, transport.requests())
    }

    #[test]
    fn accepts_official_playlist() {
        let body = search_body(
            "spotify",
            "Your daily update of the most played tracks right now - Vietnam.",
        );
        let (result, requests) = run(&body);
        let record = result.unwrap().unwrap();
        assert_eq!(record.playlist_id, "37i9dQZEVXbLdGSmz6xilI");
        assert_eq!(record.country, "Vietnam");

        let req = &requests[0];
        assert_eq!(req.query_value("q"), Some("Top 50 - Vietnam"));
        assert_eq!(req.query_value("type"), Some("playlist"));
        assert_eq!(req.query_value("market"), Some("VN"));
        assert_eq!(req.query_value("limit"), Some("1"));
    }

    #[test]
    fn rejects_user_playlist() {
        let body = search_body(
            "someone",
            "Your daily update of the most played tracks right now - Vietnam.",
        );
        assert_eq!(run(&body).0.unwrap(), None);
    }

    #[test]
    fn rejects_other_description() {
        let body = search_body("spotify", "Top hits from Vietnam");
        assert_eq!(run(&body).0.unwrap(), None);
    }

    #[test]
    fn empty_or_null_results_are_absent() {
        assert_eq!(run(r#"{"playlists":{"items":[]}}"#).0.unwrap(), None);
        assert_eq!(run(r#"{"playlists":{"items":[null]}}"#).0.unwrap(), None);
        assert_eq!(run(r#"{"playlists":null}"#).0.unwrap(), None);
    }

    #[test]
    fn malformed_body_is_decode_error() {
        assert!(matches!(run("not json").0, Err(CallError::Decode(_))));
    }
}
