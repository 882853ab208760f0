//! End-to-end stage runs against a scripted network and an in-memory sink

use std::sync::Arc;
use std::time::Duration;

use chartline_catalog::{
    CrawlConfig, Market, Pipeline, PlaylistRecord, Stage, StreamRecord, TrackRecord,
};
use chartline_core::{
    CredentialPair, CredentialPool, HttpResponse, ManualClock, MemorySink, ScriptedTransport,
    Session, Sink, TokenProvider,
};
use chrono::NaiveDate;
use serde_json::json;

struct Harness {
    session: Session,
    transport: Arc<ScriptedTransport>,
    clock: Arc<ManualClock>,
    sink: MemorySink,
    config: CrawlConfig,
}

fn harness() -> Harness {
    let transport = Arc::new(ScriptedTransport::new());
    let clock = Arc::new(ManualClock::new());
    let config = CrawlConfig {
        markets: vec![Market::new("Vietnam", "VN")],
        ..CrawlConfig::default()
    };
    let pool = CredentialPool::new(vec![
        CredentialPair::new("id-1", "secret-1"),
        CredentialPair::new("id-2", "secret-2"),
    ])
    .unwrap();
    let session = Session::new(
        Box::new(transport.clone()),
        clock.clone(),
        pool,
        TokenProvider::new(config.endpoints.token_url.clone()),
    );
    Harness {
        session,
        transport,
        clock,
        sink: MemorySink::new(),
        config,
    }
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn token_ok() -> HttpResponse {
    HttpResponse::new(200, r#"{"access_token":"tok","token_type":"Bearer","expires_in":3600}"#)
}

fn search_hit() -> HttpResponse {
    HttpResponse::new(
        200,
        json!({"playlists": {"items": [{
            "id": "top50vn",
            "name": "Top 50 - Vietnam",
            "description": "Your daily update of the most played tracks right now - Vietnam.",
            "owner": {"id": "spotify"}
        }]}})
        .to_string(),
    )
}

/// Two tracks credited to the same artist.
fn playlist_detail() -> HttpResponse {
    let track = |id: &str, release: &str| {
        json!({
            "added_at": "2024-06-01T07:00:00Z",
            "track": {
                "id": id,
                "uri": format!("spotify:track:{id}"),
                "name": format!("Song {id}"),
                "duration_ms": 200000,
                "popularity": 75,
                "explicit": false,
                "album": {"id": format!("album-{id}"), "release_date": release},
                "artists": [{"id": "a1"}]
            }
        })
    };
    HttpResponse::new(
        200,
        json!({"tracks": {"items": [track("t1", "2024-05-10"), track("t2", "n/a")]}})
            .to_string(),
    )
}

fn playlist() -> PlaylistRecord {
    PlaylistRecord {
        country: "Vietnam".into(),
        playlist_id: "top50vn".into(),
        playlist_name: "Top 50 - Vietnam".into(),
    }
}

#[test]
fn shared_artist_is_fetched_once() {
    let mut h = harness();
    let t = &h.transport;
    for _ in 0..4 {
        t.route("/api/token", token_ok());
    }
    t.route("/search", search_hit());
    t.route("/playlists/top50vn", playlist_detail());
    t.route(
        "/artists",
        HttpResponse::new(
            200,
            json!({"artists": [{
                "id": "a1",
                "uri": "spotify:artist:a1",
                "name": "Shared Artist",
                "genres": ["v-pop"],
                "popularity": 60,
                "followers": {"total": 1000},
                "images": [{"url": "https://img/a1.jpg"}]
            }]})
            .to_string(),
        ),
    );
    t.route(
        "/audio-features",
        HttpResponse::new(
            200,
            json!({"audio_features": [{"id": "t1", "tempo": 120.0}, {"id": "t2", "tempo": 90.0}]})
                .to_string(),
        ),
    );

    let summary =
        Pipeline::new(&mut h.session, &mut h.sink, &h.config, date("2024-06-02")).run_all();

    assert!(summary.is_success(), "{:?}", summary.failure);
    assert_eq!(summary.stages.len(), 5);
    assert_eq!(summary.stage(Stage::Tracks).map(|s| s.produced), Some(2));
    assert_eq!(summary.stage(Stage::Artists).map(|s| s.produced), Some(1));
    assert_eq!(summary.stage(Stage::AudioFeatures).map(|s| s.produced), Some(2));

    let tracks: Vec<TrackRecord> = h.sink.rows().unwrap();
    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[0].position, 1);
    assert_eq!(tracks[1].position, 2);
    // unparseable release date falls back to the default
    assert_eq!(tracks[1].release_date, date("2001-01-01"));

    assert_eq!(h.sink.table_len("playlists"), 1);
    assert_eq!(h.sink.table_len("artists"), 1);
    assert_eq!(h.sink.table_len("tracks_audio_features"), 2);
    assert_eq!(t.count("/artists"), 1);
    let artist_call = t
        .requests()
        .into_iter()
        .find(|r| r.url.contains("/artists"))
        .unwrap();
    assert_eq!(artist_call.query_value("ids"), Some("a1"));

    // tracks are dated the run date, so nothing charted on the reference date
    assert_eq!(summary.stage(Stage::Streams).map(|s| s.inputs), Some(0));
    assert_eq!(t.count("/streams"), 0);
    // one pause after the accepted search hit
    assert_eq!(h.clock.sleeps(), vec![h.config.search.pause]);
}

#[test]
fn expired_token_is_refreshed_transparently() {
    let run_date = date("2024-06-02");

    let mut direct = harness();
    direct.transport.route("/api/token", token_ok());
    direct.transport.route("/playlists/top50vn", playlist_detail());
    let expected = Pipeline::new(&mut direct.session, &mut direct.sink, &direct.config, run_date)
        .tracks(&[playlist()])
        .unwrap();

    let mut retried = harness();
    retried.transport.route("/api/token", token_ok());
    retried.transport.route("/api/token", token_ok());
    retried
        .transport
        .route("/playlists/top50vn", HttpResponse::new(401, ""));
    retried.transport.route("/playlists/top50vn", playlist_detail());
    let actual = Pipeline::new(
        &mut retried.session,
        &mut retried.sink,
        &retried.config,
        run_date,
    )
    .tracks(&[playlist()])
    .unwrap();

    assert_eq!(actual.records, expected.records);
    assert_eq!(actual.stats.failed, 0);
    assert_eq!(
        retried.session.stats().token_requests,
        direct.session.stats().token_requests + 1
    );
    assert_eq!(retried.clock.sleeps(), vec![Duration::from_secs(60)]);
    // refresh reuses the same credential
    assert_eq!(retried.session.credentials().index(), 0);
}

#[test]
fn future_release_yields_no_streams() {
    let mut h = harness();
    let run_date = date("2024-06-02");
    let reference = date("2024-06-01");

    let mut upcoming = track("t-future", reference);
    upcoming.release_date = date("2024-06-05");
    let mut charted = track("t-old", reference);
    charted.release_date = date("2023-03-01");
    h.sink.write_snapshot(&[upcoming, charted]).unwrap();

    h.transport.route(
        "/api/track/t-old/streams",
        HttpResponse::new(
            200,
            json!({"data": {
                "2024-05-25": {"daily": 10, "total": 100},
                "2024-05-26": {"daily": 12, "total": 112}
            }})
            .to_string(),
        ),
    );

    let out = Pipeline::new(&mut h.session, &mut h.sink, &h.config, run_date)
        .streams()
        .unwrap();

    assert_eq!(out.stats.inputs, 2);
    assert_eq!(out.stats.absent, 1);
    assert!(out.records.iter().all(|r| r.track_id == "t-old"));
    assert_eq!(out.records.len(), 2);
    assert_eq!(out.records[0].album_id, "album-t-old");
    assert_eq!(h.transport.count("/api/track/t-future/"), 0);
    // anonymous endpoint: no token exchange
    assert_eq!(h.transport.count("/api/token"), 0);

    let stored: Vec<StreamRecord> = h.sink.rows().unwrap();
    assert_eq!(stored.len(), 2);
}

fn track(id: &str, day: NaiveDate) -> TrackRecord {
    TrackRecord {
        artist_ids: vec!["a1".into()],
        album_id: format!("album-{id}"),
        track_id: id.into(),
        track_uri: format!("spotify:track:{id}"),
        track_name: format!("Song {id}"),
        release_date: date("2024-01-01"),
        date_added: "2024-05-01T00:00:00Z".into(),
        track_duration_ms: 180_000,
        popularity: 50,
        position: 1,
        is_explicit: false,
        country: "Vietnam".into(),
        date: day,
    }
}
