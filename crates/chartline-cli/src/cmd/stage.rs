//! `chartline stage` - run one stage with a JSON handoff
//!
//! The input file holds the previous stage's output records; the output
//! file receives this stage's records. Without `--input` the previous
//! stage's snapshot is read from the store instead.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chartline_catalog::{Pipeline, PlaylistRecord, Stage, StageOutput, TrackRecord};
use chartline_core::{SharedProgress, Sink};
use chrono::NaiveDate;
use clap::Args;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct StageArgs {
    /// Stage: playlists, tracks, artists, audio-features, streams
    #[arg(value_parser = parse_stage)]
    pub stage: Stage,

    /// Previous stage's output (JSON array of records)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Where to write this stage's records (default: stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Run date (YYYY-MM-DD, default: today UTC)
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Store directory (default: [output] dir from config)
    #[arg(long)]
    pub store: Option<PathBuf>,
}

fn parse_stage(s: &str) -> Result<Stage, String> {
    Stage::from_name(s).ok_or_else(|| {
        let names: Vec<_> = Stage::ALL.iter().map(|s| s.name()).collect();
        format!("unknown stage '{s}' (expected one of: {})", names.join(", "))
    })
}

pub fn run(args: StageArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    config.validate()?;
    let crawl = config.crawl_config();
    let run_date = super::run_date(args.date);

    let mut session = super::open_session(config)?;
    let mut sink = super::open_store(config, args.store.as_deref())?;

    let input = args.input.as_deref();
    let out = args.output.as_deref();

    match args.stage {
        Stage::Playlists => {
            let mut pipeline = Pipeline::new(&mut session, &mut sink, &crawl, run_date)
                .with_progress(progress.clone());
            emit(pipeline.playlists()?, out)
        }
        Stage::Tracks => {
            let playlists: Vec<PlaylistRecord> = match input {
                Some(path) => read_handoff(path)?,
                None => sink.load_snapshot()?,
            };
            let mut pipeline = Pipeline::new(&mut session, &mut sink, &crawl, run_date)
                .with_progress(progress.clone());
            emit(pipeline.tracks(&playlists)?, out)
        }
        Stage::Artists | Stage::AudioFeatures => {
            let tracks: Vec<TrackRecord> = match input {
                Some(path) => read_handoff(path)?,
                None => todays_tracks(&sink, run_date)?,
            };
            let mut pipeline = Pipeline::new(&mut session, &mut sink, &crawl, run_date)
                .with_progress(progress.clone());
            if args.stage == Stage::Artists {
                emit(pipeline.artists(&tracks)?, out)
            } else {
                emit(pipeline.audio_features(&tracks)?, out)
            }
        }
        Stage::Streams => {
            if input.is_some() {
                log::warn!("streams reads the track snapshot; --input is ignored");
            }
            let mut pipeline = Pipeline::new(&mut session, &mut sink, &crawl, run_date)
                .with_progress(progress.clone());
            emit(pipeline.streams()?, out)
        }
    }
}

/// Track snapshot rows charted on `run_date`.
fn todays_tracks(sink: &impl Sink, run_date: NaiveDate) -> Result<Vec<TrackRecord>> {
    let tracks: Vec<TrackRecord> = sink.load_snapshot()?;
    let today: Vec<TrackRecord> = tracks.into_iter().filter(|t| t.date == run_date).collect();
    log::info!("{} track rows dated {run_date} in snapshot", today.len());
    Ok(today)
}

fn read_handoff<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open handoff: {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse handoff: {}", path.display()))
}

fn emit<R: Serialize>(output: StageOutput<R>, path: Option<&Path>) -> Result<()> {
    let stats = &output.stats;
    eprintln!(
        "{}: {} rows, {} failed of {} units",
        stats.stage, stats.produced, stats.failed, stats.inputs
    );
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &output.records)?;
            writer.flush()?;
            log::info!("Wrote {} records to {}", output.records.len(), path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = BufWriter::new(stdout.lock());
            serde_json::to_writer_pretty(&mut writer, &output.records)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_parse() {
        assert_eq!(parse_stage("audio-features"), Ok(Stage::AudioFeatures));
        assert_eq!(parse_stage("streams"), Ok(Stage::Streams));
        let err = parse_stage("lyrics").unwrap_err();
        assert!(err.contains("playlists, tracks, artists, audio-features, streams"));
    }

    #[test]
    fn handoff_round_trips_through_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("playlists.json");
        let records = vec![PlaylistRecord {
            country: "Vietnam".into(),
            playlist_id: "p1".into(),
            playlist_name: "Top 50 - Vietnam".into(),
        }];
        std::fs::write(&path, serde_json::to_string(&records).unwrap()).unwrap();
        let back: Vec<PlaylistRecord> = read_handoff(&path).unwrap();
        assert_eq!(back, records);
    }

    #[test]
    fn missing_handoff_names_the_file() {
        let err = read_handoff::<PlaylistRecord>(Path::new("/nonexistent/x.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/x.json"));
    }
}
