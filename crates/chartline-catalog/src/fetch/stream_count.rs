//! Stage 5: per-track daily stream counts

use std::collections::BTreeMap;

use chartline_core::{ApiCall, CallError, HttpRequest, Session};
use serde::Deserialize;
use serde_json::Value;

use super::{STREAMS_TIMEOUT, null_as_default};
use crate::config::Endpoints;
use crate::normalize::DailyStreams;
use crate::window::StreamWindow;

#[derive(Deserialize)]
struct StreamsResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    data: BTreeMap<String, Option<DayCounts>>,
}

#[derive(Deserialize)]
struct DayCounts {
    daily: Option<Value>,
    total: Option<Value>,
}

/// The endpoint answers 200 while it is still computing counts: either with a
/// truthy `error` field or with `status: "processing"`.
pub fn is_pending(body: &str) -> bool {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return false;
    };
    truthy(value.get("error"))
        || value.get("status").and_then(Value::as_str) == Some("processing")
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

/// Integer count, 0 when null or absent.
fn count(value: Option<&Value>) -> i64 {
    value
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or(0)
}

/// Fetch counts for `track_id` and keep the days inside `window`.
///
/// Days missing from the payload are skipped; an empty payload is absent data.
pub fn fetch_stream_counts(
    session: &mut Session,
    endpoints: &Endpoints,
    track_id: &str,
    window: &StreamWindow,
) -> Result<Vec<DailyStreams>, CallError> {
    let request = HttpRequest::get(endpoints.track_streams(track_id)).timeout(STREAMS_TIMEOUT);
    let body = session.call(&ApiCall::streams(request, is_pending))?;
    let response: StreamsResponse = serde_json::from_str(&body)?;

    if response.data.is_empty() {
        log::warn!("No stream data available for track: {track_id}");
        return Ok(Vec::new());
    }

    Ok(window
        .days()
        .filter_map(|date| {
            let key = date.format("%Y-%m-%d").to_string();
            let day = response.data.get(&key)?.as_ref()?;
            Some(DailyStreams {
                date,
                daily: count(day.daily.as_ref()),
                total: count(day.total.as_ref()),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::harness;
    use crate::records::fixtures::date;
    use chartline_core::{Authorization, HttpResponse};
    use std::time::Duration;

    fn window() -> StreamWindow {
        StreamWindow {
            start: date("2024-06-01"),
            end: date("2024-06-03"),
        }
    }

    #[test]
    fn pending_sentinels() {
        assert!(is_pending(r#"{"status":"processing"}"#));
        assert!(is_pending(r#"{"error":"Track is being processed"}"#));
        assert!(is_pending(r#"{"error":true}"#));
        assert!(!is_pending(r#"{"error":null,"data":{}}"#));
        assert!(!is_pending(r#"{"error":false,"status":"done"}"#));
        assert!(!is_pending("garbage"));
    }

    #[test]
    fn keeps_days_inside_window() {
        let (mut session, transport, _clock) = harness::session();
        transport.route(
            "/api/track/t1/streams",
            HttpResponse::new(
                200,
                serde_json::json!({"data": {
                    "2024-05-31": {"daily": 1, "total": 1},
                    "2024-06-01": {"daily": 1000, "total": 50000},
                    "2024-06-03": {"daily": null, "total": 52000.0},
                    "2024-06-04": {"daily": 9, "total": 9}
                }})
                .to_string(),
            ),
        );
        let counts =
            fetch_stream_counts(&mut session, &Endpoints::default(), "t1", &window()).unwrap();

        assert_eq!(
            counts,
            vec![
                DailyStreams {
                    date: date("2024-06-01"),
                    daily: 1000,
                    total: 50000
                },
                DailyStreams {
                    date: date("2024-06-03"),
                    daily: 0,
                    total: 52000
                },
            ]
        );
        assert_eq!(transport.requests()[0].auth, Authorization::None);
    }

    #[test]
    fn empty_data_is_absent() {
        let (mut session, transport, _clock) = harness::session();
        transport.route("/streams", HttpResponse::new(200, r#"{"data":{}}"#));
        let counts =
            fetch_stream_counts(&mut session, &Endpoints::default(), "t1", &window()).unwrap();
        assert!(counts.is_empty());
    }

    #[test]
    fn processing_backs_off_then_succeeds() {
        let (mut session, transport, clock) = harness::session();
        transport.route("/streams", HttpResponse::new(200, r#"{"status":"processing"}"#));
        transport.route("/streams", HttpResponse::new(200, r#"{"error":"processing"}"#));
        transport.route(
            "/streams",
            HttpResponse::new(200, r#"{"data":{"2024-06-02":{"daily":5,"total":6}}}"#),
        );
        let counts =
            fetch_stream_counts(&mut session, &Endpoints::default(), "t1", &window()).unwrap();

        assert_eq!(counts.len(), 1);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(30), Duration::from_secs(60)]
        );
    }

    #[test]
    fn unauthorized_is_hard_failure() {
        let (mut session, transport, _clock) = harness::session();
        transport.route("/streams", HttpResponse::new(401, ""));
        let err = fetch_stream_counts(&mut session, &Endpoints::default(), "t1", &window())
            .unwrap_err();
        assert_eq!(err, CallError::AuthExpired);
        assert_eq!(transport.count("/streams"), 1);
        assert_eq!(transport.count("/token"), 0);
    }
}
