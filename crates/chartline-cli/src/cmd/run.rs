//! `chartline run` - all five stages for one date

use std::path::PathBuf;

use anyhow::Result;
use chartline_catalog::Pipeline;
use chartline_core::SharedProgress;
use chrono::NaiveDate;
use clap::Args;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run date (YYYY-MM-DD, default: today UTC)
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Output directory (database + snapshots)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: RunArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    config.validate()?;
    let crawl = config.crawl_config();
    let run_date = super::run_date(args.date);

    let mut session = super::open_session(config)?;
    let mut sink = super::open_store(config, args.output.as_deref())?;
    log::info!(
        "Run {run_date}: {} markets, store {}",
        crawl.markets.len(),
        sink.database_path().display()
    );

    let summary = Pipeline::new(&mut session, &mut sink, &crawl, run_date)
        .with_progress(progress.clone())
        .run_all();

    if progress.is_tty() {
        summary.print();
    } else {
        summary.log();
    }

    match summary.failure {
        Some((stage, reason)) => anyhow::bail!("run {run_date} failed at {stage}: {reason}"),
        None => Ok(()),
    }
}
