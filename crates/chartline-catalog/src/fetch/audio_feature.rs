//! Stage 4: batch audio-feature lookup

use chartline_core::{ApiCall, CallError, HttpRequest, Session};
use serde::Deserialize;

use super::{CATALOG_TIMEOUT, null_as_default, or_unknown};
use crate::config::Endpoints;
use crate::records::AudioFeatures;

#[derive(Deserialize)]
struct FeaturesResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    audio_features: Vec<Option<ApiFeatures>>,
}

#[derive(Deserialize)]
struct ApiFeatures {
    id: Option<String>,
    danceability: Option<f64>,
    energy: Option<f64>,
    key: Option<i64>,
    loudness: Option<f64>,
    mode: Option<i64>,
    speechiness: Option<f64>,
    acousticness: Option<f64>,
    instrumentalness: Option<f64>,
    liveness: Option<f64>,
    valence: Option<f64>,
    tempo: Option<f64>,
    duration_ms: Option<i64>,
    time_signature: Option<i64>,
}

impl ApiFeatures {
    /// Track id plus features, absent fields defaulted.
    fn into_pair(self) -> (String, AudioFeatures) {
        let d = AudioFeatures::default();
        let features = AudioFeatures {
            danceability: self.danceability.unwrap_or(d.danceability),
            energy: self.energy.unwrap_or(d.energy),
            key: self.key.unwrap_or(d.key),
            loudness: self.loudness.unwrap_or(d.loudness),
            mode: self.mode.unwrap_or(d.mode),
            speechiness: self.speechiness.unwrap_or(d.speechiness),
            acousticness: self.acousticness.unwrap_or(d.acousticness),
            instrumentalness: self.instrumentalness.unwrap_or(d.instrumentalness),
            liveness: self.liveness.unwrap_or(d.liveness),
            valence: self.valence.unwrap_or(d.valence),
            tempo: self.tempo.unwrap_or(d.tempo),
            duration_ms: self.duration_ms.unwrap_or(d.duration_ms),
            time_signature: self.time_signature.unwrap_or(d.time_signature),
        };
        (or_unknown(self.id), features)
    }
}

/// Look up features for one batch of track ids (at most 100).
///
/// Returns `(track_id, features)` pairs; tracks the API has no analysis for
/// are simply absent.
pub fn fetch_audio_features(
    session: &mut Session,
    endpoints: &Endpoints,
    ids: &[String],
) -> Result<Vec<(String, AudioFeatures)>, CallError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let request = HttpRequest::get(endpoints.audio_features())
        .query("ids", ids.join(","))
        .timeout(CATALOG_TIMEOUT);
    let body = session.call(&ApiCall::catalog(request))?;
    let response: FeaturesResponse = serde_json::from_str(&body)?;

    Ok(response
        .audio_features
        .into_iter()
        .flatten()
        .map(ApiFeatures::into_pair)
        .collect())
}
