//! The five crawl stages and the sequential chain that runs them

use std::sync::Arc;
use std::time::Instant;

use chartline_core::{CallError, ProgressContext, Record, Session, SharedProgress, Sink};
use chrono::NaiveDate;
use indicatif::ProgressBar;

use crate::config::CrawlConfig;
use crate::fetch::{
    fetch_artists, fetch_audio_features, fetch_playlist, fetch_stream_counts, fetch_tracks,
};
use crate::normalize::{
    join_audio_features, join_stream_tracks, stream_targets, unique_artist_ids, unique_track_ids,
};
use crate::records::{
    ArtistRecord, AudioFeatureRecord, PlaylistRecord, StreamRecord, TrackRecord,
};
use crate::state::Stage;
use crate::stats::{RunSummary, StageStats};
use crate::window::StreamWindow;

/// Why a stage stopped before producing its handoff.
#[derive(Debug)]
pub enum StageError {
    /// No credential yielded a token; no authenticated call is possible
    CredentialExhaustion { stage: Stage, attempts: u32 },
    /// Snapshot or database write failed
    Sink { stage: Stage, source: anyhow::Error },
}

impl StageError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::CredentialExhaustion { stage, .. } | Self::Sink { stage, .. } => *stage,
        }
    }
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CredentialExhaustion { stage, attempts } => {
                write!(f, "{stage}: no access token after {attempts} attempts")
            }
            Self::Sink { stage, source } => write!(f, "{stage}: persistence failed: {source:#}"),
        }
    }
}

impl std::error::Error for StageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sink { source, .. } => Some(&**source),
            Self::CredentialExhaustion { .. } => None,
        }
    }
}

/// A stage's handoff plus its counters.
#[derive(Debug, Clone)]
pub struct StageOutput<R> {
    pub records: Vec<R>,
    pub stats: StageStats,
}

/// Runs stages against one session and one sink for a single run date.
///
/// Items within a stage are processed one at a time; a failed item is logged
/// and skipped, only credential exhaustion or a sink failure ends a stage.
pub struct Pipeline<'a, S: Sink> {
    session: &'a mut Session,
    sink: &'a mut S,
    config: &'a CrawlConfig,
    run_date: NaiveDate,
    progress: SharedProgress,
}

impl<'a, S: Sink> Pipeline<'a, S> {
    pub fn new(
        session: &'a mut Session,
        sink: &'a mut S,
        config: &'a CrawlConfig,
        run_date: NaiveDate,
    ) -> Self {
        Self {
            session,
            sink,
            config,
            run_date,
            progress: Arc::new(ProgressContext::hidden()),
        }
    }

    pub fn with_progress(mut self, progress: SharedProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn run_date(&self) -> NaiveDate {
        self.run_date
    }

    /// Date whose chart entries the stream stage queries: the day before the run.
    pub fn reference_date(&self) -> NaiveDate {
        self.run_date.pred_opt().unwrap_or(self.run_date)
    }

    /// Run all five stages in order; the first stage error stops the chain.
    pub fn run_all(&mut self) -> RunSummary {
        let mut summary = RunSummary::new(self.run_date);
        if let Err(e) = self.chain(&mut summary) {
            log::error!("Pipeline stopped: {e}");
            summary.failure = Some((e.stage(), e.to_string()));
        }
        summary.session = self.session.stats();
        summary
    }

    fn chain(&mut self, summary: &mut RunSummary) -> Result<(), StageError> {
        let playlists = self.playlists()?;
        summary.stages.push(playlists.stats);

        let tracks = self.tracks(&playlists.records)?;
        summary.stages.push(tracks.stats);

        let artists = self.artists(&tracks.records)?;
        summary.stages.push(artists.stats);

        let features = self.audio_features(&tracks.records)?;
        summary.stages.push(features.stats);

        let streams = self.streams()?;
        summary.stages.push(streams.stats);
        Ok(())
    }

    // =========================================================================
    // Stage 1: playlists
    // =========================================================================

    /// Find each market's official Top 50 playlist.
    pub fn playlists(&mut self) -> Result<StageOutput<PlaylistRecord>, StageError> {
        let mut run = self.begin(Stage::Playlists, self.config.markets.len())?;
        let config = self.config;

        let mut playlists = Vec::new();
        for market in &config.markets {
            log::debug!("Searching playlist for {} ({})", market.country, market.code);
            run.bar.set_message(market.country.clone());
            match fetch_playlist(self.session, &config.endpoints, &config.search, market) {
                Ok(Some(playlist)) => {
                    run.stats.fetched += 1;
                    log::info!("{}: {}", market.country, playlist.playlist_name);
                    playlists.push(playlist);
                    self.session.pause(config.search.pause);
                }
                Ok(None) => run.stats.absent += 1,
                Err(e) => run.item_failed(&market.country, e)?,
            }
            run.bar.inc(1);
        }

        self.finish(run, playlists)
    }

    // =========================================================================
    // Stage 2: tracks
    // =========================================================================

    /// Expand each playlist into dated chart entries.
    pub fn tracks(
        &mut self,
        playlists: &[PlaylistRecord],
    ) -> Result<StageOutput<TrackRecord>, StageError> {
        let mut run = self.begin(Stage::Tracks, playlists.len())?;

        let mut tracks = Vec::new();
        for (i, playlist) in playlists.iter().enumerate() {
            log::debug!(
                "Playlist {}/{}: {}",
                i + 1,
                playlists.len(),
                playlist.playlist_name
            );
            run.bar.set_message(playlist.country.clone());
            match fetch_tracks(self.session, &self.config.endpoints, playlist, self.run_date) {
                Ok(found) if found.is_empty() => {
                    log::info!("No tracks found for: {}", playlist.playlist_id);
                    run.stats.absent += 1;
                }
                Ok(found) => {
                    run.stats.fetched += 1;
                    tracks.extend(found);
                }
                Err(e) => run.item_failed(&playlist.playlist_id, e)?,
            }
            run.bar.inc(1);
        }

        self.finish(run, tracks)
    }

    // =========================================================================
    // Stage 3: artists
    // =========================================================================

    /// Look up every artist credited on `tracks`, merged into the cumulative set.
    pub fn artists(
        &mut self,
        tracks: &[TrackRecord],
    ) -> Result<StageOutput<ArtistRecord>, StageError> {
        let ids = unique_artist_ids(tracks);
        let batches: Vec<&[String]> = ids.chunks(self.config.batch.artists).collect();
        let mut run = self.begin(Stage::Artists, batches.len())?;
        log::info!("{} unique artists in {} batches", ids.len(), batches.len());

        let mut artists = Vec::new();
        for (i, batch) in batches.iter().enumerate() {
            match fetch_artists(self.session, &self.config.endpoints, batch) {
                Ok(found) if found.is_empty() => run.stats.absent += 1,
                Ok(found) => {
                    run.stats.fetched += 1;
                    artists.extend(found);
                }
                Err(e) => run.item_failed(&format!("artist batch {}", i + 1), e)?,
            }
            run.bar.inc(1);
        }

        self.finish(run, artists)
    }

    // =========================================================================
    // Stage 4: audio features
    // =========================================================================

    /// Fetch features for every distinct track and left-join them onto `tracks`.
    pub fn audio_features(
        &mut self,
        tracks: &[TrackRecord],
    ) -> Result<StageOutput<AudioFeatureRecord>, StageError> {
        let ids = unique_track_ids(tracks);
        let batches: Vec<&[String]> = ids.chunks(self.config.batch.audio_features).collect();
        let mut run = self.begin(Stage::AudioFeatures, batches.len())?;

        let mut features = Vec::new();
        for (i, batch) in batches.iter().enumerate() {
            match fetch_audio_features(self.session, &self.config.endpoints, batch) {
                Ok(found) if found.is_empty() => run.stats.absent += 1,
                Ok(found) => {
                    run.stats.fetched += 1;
                    features.extend(found);
                }
                Err(e) => run.item_failed(&format!("audio feature batch {}", i + 1), e)?,
            }
            run.bar.inc(1);
        }

        // nothing fetched: no rows at all, not rows of defaults
        let joined = if features.is_empty() {
            Vec::new()
        } else {
            join_audio_features(tracks, features, self.run_date)
        };
        self.finish(run, joined)
    }

    // =========================================================================
    // Stage 5: stream counts
    // =========================================================================

    /// Collect daily stream counts for tracks charted on the reference date.
    ///
    /// Reads the cumulative track snapshot rather than an in-memory handoff.
    pub fn streams(&mut self) -> Result<StageOutput<StreamRecord>, StageError> {
        let stage = Stage::Streams;
        let reference = self.reference_date();
        let snapshot: Vec<TrackRecord> = self
            .sink
            .load_snapshot()
            .map_err(|source| StageError::Sink { stage, source })?;
        let targets = stream_targets(&snapshot, reference);
        let mut run = self.begin(stage, targets.len())?;
        log::info!(
            "{} tracks charted on {reference} out of {} snapshot rows",
            targets.len(),
            snapshot.len()
        );

        let windows = self.config.streams;
        let mut counts = Vec::new();
        for target in &targets {
            run.bar.set_message(target.track_id.clone());
            let Some(window) = StreamWindow::anchored(
                target.release_date,
                reference,
                windows.lookback_days,
                windows.window_days,
            ) else {
                log::info!(
                    "{}: released {} after reference date, no stream dates",
                    target.track_id,
                    target.release_date
                );
                run.stats.absent += 1;
                run.bar.inc(1);
                continue;
            };

            match fetch_stream_counts(
                self.session,
                &self.config.endpoints,
                &target.track_id,
                &window,
            ) {
                Ok(days) if days.is_empty() => run.stats.absent += 1,
                Ok(days) => {
                    log::debug!("{}: {} stream dates", target.track_id, days.len());
                    run.stats.fetched += 1;
                    counts.extend(days.into_iter().map(|d| (target.track_id.clone(), d)));
                }
                Err(e) => run.item_failed(&target.track_id, e)?,
            }
            run.bar.inc(1);
        }

        let records = join_stream_tracks(counts, &snapshot);
        self.finish(run, records)
    }

    // =========================================================================
    // Shared stage plumbing
    // =========================================================================

    fn begin(&mut self, stage: Stage, inputs: usize) -> Result<StageRun, StageError> {
        log::info!("Stage {}/5: {stage} ({inputs} units)", stage as usize + 1);
        let line = self.progress.stage_line(stage.name());
        if stage.needs_token() {
            line.set_message("requesting access token");
            if let Err(e) = self.session.acquire_token() {
                line.finish_with_message("no access token");
                return Err(match e {
                    CallError::CredentialExhaustion { attempts } => {
                        StageError::CredentialExhaustion { stage, attempts }
                    }
                    other => StageError::Sink {
                        stage,
                        source: anyhow::anyhow!("token acquisition failed: {other}"),
                    },
                });
            }
        }
        line.set_message("fetching");

        let mut stats = StageStats::new(stage);
        stats.inputs = inputs;
        Ok(StageRun {
            stats,
            started: Instant::now(),
            bar: self.progress.item_bar(stage.name(), inputs),
            line,
        })
    }

    /// Snapshot, upsert and hand off. Empty results persist nothing.
    fn finish<R: Record>(
        &mut self,
        mut run: StageRun,
        records: Vec<R>,
    ) -> Result<StageOutput<R>, StageError> {
        let stage = run.stats.stage;
        run.bar.finish_and_clear();

        let records = if records.is_empty() {
            log::info!("{stage}: nothing fetched, skipping persistence");
            records
        } else {
            let sink_err = |source| StageError::Sink { stage, source };
            let normalized = self.sink.write_snapshot(&records).map_err(sink_err)?;
            run.stats.persisted = self.sink.upsert(&records).map_err(sink_err)?;
            normalized
        };

        run.stats.produced = records.len();
        run.stats.elapsed = run.started.elapsed();
        run.line.finish_with_message(format!(
            "{} rows, {} failed",
            records.len(),
            run.stats.failed
        ));
        run.stats.log();
        Ok(StageOutput {
            records,
            stats: run.stats,
        })
    }
}

/// Mutable state of a stage in progress.
struct StageRun {
    stats: StageStats,
    started: Instant,
    bar: ProgressBar,
    line: ProgressBar,
}

impl StageRun {
    /// Record a per-item failure; only credential exhaustion escalates.
    fn item_failed(&mut self, item: &str, err: CallError) -> Result<(), StageError> {
        if let CallError::CredentialExhaustion { attempts } = err {
            return Err(StageError::CredentialExhaustion {
                stage: self.stats.stage,
                attempts,
            });
        }
        log::error!("{}: {item} failed: {err}", self.stats.stage);
        self.stats.failed += 1;
        Ok(())
    }
}
