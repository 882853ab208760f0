//! Per-stage counters and the end-of-run summary.
//!
//! Stage-level: `StageStats`, one per stage that ran.
//! Run-level: `RunSummary`, all stages plus session counters and the failure
//! that stopped the chain, if any.

use std::time::Duration;

use chartline_core::{SessionStats, fmt_duration, fmt_num};
use chrono::NaiveDate;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use crate::state::Stage;

// =============================================================================
// Stage-level
// =============================================================================

/// Counters for one stage run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageStats {
    pub stage: Stage,
    /// Work units: markets, playlists, id batches or tracks
    pub inputs: usize,
    /// Units whose fetch returned data
    pub fetched: usize,
    /// Units with no data (absent payload, rejected hit, out of window)
    pub absent: usize,
    /// Units that failed after retries
    pub failed: usize,
    /// Rows handed to the next stage
    pub produced: usize,
    /// Rows newly stored by the upsert
    pub persisted: usize,
    pub elapsed: Duration,
}

impl StageStats {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            inputs: 0,
            fetched: 0,
            absent: 0,
            failed: 0,
            produced: 0,
            persisted: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Log stage completion (non-TTY summary line).
    pub fn log(&self) {
        log::info!(
            "{}: {} rows ({} new) from {}/{} units, {} absent, {} failed [{}]",
            self.stage,
            fmt_num(self.produced),
            fmt_num(self.persisted),
            fmt_num(self.fetched),
            fmt_num(self.inputs),
            fmt_num(self.absent),
            fmt_num(self.failed),
            fmt_duration(self.elapsed)
        );
    }
}

// =============================================================================
// Run-level
// =============================================================================

/// Everything that happened in one `run`.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_date: NaiveDate,
    pub stages: Vec<StageStats>,
    pub session: SessionStats,
    /// Stage that stopped the chain and why
    pub failure: Option<(Stage, String)>,
}

impl RunSummary {
    pub fn new(run_date: NaiveDate) -> Self {
        Self {
            run_date,
            stages: Vec::new(),
            session: SessionStats::default(),
            failure: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageStats> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn failed_items(&self) -> usize {
        self.stages.iter().map(|s| s.failed).sum()
    }

    /// Format summary table as a string.
    pub fn format_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new(format!("Run {}", self.run_date))
                    .fg(Color::Cyan)
                    .add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Units").fg(Color::Cyan),
                Cell::new("Absent").fg(Color::Cyan),
                Cell::new("Failed").fg(Color::Cyan),
                Cell::new("Rows").fg(Color::Cyan),
                Cell::new("New").fg(Color::Cyan),
                Cell::new("Time").fg(Color::Cyan),
            ]);

        for s in &self.stages {
            let failed = Cell::new(fmt_num(s.failed));
            table.add_row(vec![
                Cell::new(s.stage.name()),
                Cell::new(format!("{}/{}", fmt_num(s.fetched), fmt_num(s.inputs))),
                Cell::new(fmt_num(s.absent)),
                if s.failed > 0 { failed.fg(Color::Yellow) } else { failed },
                Cell::new(fmt_num(s.produced)).fg(Color::Green),
                Cell::new(fmt_num(s.persisted)),
                Cell::new(fmt_duration(s.elapsed)),
            ]);
        }

        if let Some((stage, reason)) = &self.failure {
            table.add_row(vec![
                Cell::new(stage.name()).fg(Color::Red),
                Cell::new(format!("FAILED: {reason}")).fg(Color::Red),
            ]);
        }

        table.add_row(vec![
            Cell::new("HTTP").fg(Color::DarkGrey),
            Cell::new(format!(
                "{} calls, {} token requests, {} rotations",
                fmt_num(self.session.http_attempts),
                fmt_num(self.session.token_requests),
                fmt_num(self.session.rotations)
            ))
            .fg(Color::DarkGrey),
        ]);

        format!("\n{table}")
    }

    /// Print summary table (TTY mode).
    pub fn print(&self) {
        eprintln!("{}", self.format_table());
    }

    /// Log one line per stage (non-TTY mode).
    pub fn log(&self) {
        for s in &self.stages {
            s.log();
        }
        match &self.failure {
            Some((stage, reason)) => log::error!("Run {} stopped at {stage}: {reason}", self.run_date),
            None => log::info!(
                "Run {} complete: {} HTTP calls, {} failed items",
                self.run_date,
                fmt_num(self.session.http_attempts),
                fmt_num(self.failed_items())
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::fixtures::date;

    fn summary() -> RunSummary {
        let mut s = RunSummary::new(date("2024-06-02"));
        let mut tracks = StageStats::new(Stage::Tracks);
        tracks.inputs = 6;
        tracks.fetched = 5;
        tracks.failed = 1;
        tracks.produced = 250;
        s.stages.push(StageStats::new(Stage::Playlists));
        s.stages.push(tracks);
        s
    }

    #[test]
    fn table_lists_every_stage() {
        let table = summary().format_table();
        assert!(table.contains("playlists"));
        assert!(table.contains("tracks"));
        assert!(table.contains("5/6"));
        assert!(table.contains("Run 2024-06-02"));
    }

    #[test]
    fn failure_is_shown() {
        let mut s = summary();
        assert!(s.is_success());
        s.failure = Some((Stage::Artists, "credentials exhausted".into()));
        assert!(!s.is_success());
        assert!(s.format_table().contains("FAILED: credentials exhausted"));
    }

    #[test]
    fn failed_items_sum_across_stages() {
        assert_eq!(summary().failed_items(), 1);
        assert_eq!(summary().stage(Stage::Tracks).map(|s| s.produced), Some(250));
        assert!(summary().stage(Stage::Streams).is_none());
    }
}
