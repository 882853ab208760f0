//! chartline - daily chart crawler
//!
//! Collects Top 50 playlists, their tracks, artists, audio features and
//! daily stream counts into DuckDB tables and Parquet snapshots.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "chartline")]
#[command(about = "Rate-limited music chart crawler")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./chartline.toml or ~/.config/chartline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run all five stages for one date
    Run(cmd::run::RunArgs),
    /// Run a single stage with a JSON handoff
    Stage(cmd::stage::StageArgs),
    /// Show stored row counts per table and snapshot
    Status(cmd::status::StatusArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(chartline_core::ProgressContext::new());

    // Logging:
    //   TTY:     warn unless --debug  - spinners show activity
    //   non-TTY: info unless --debug  - logs are the only progress indicator
    let multi = if progress.is_tty() {
        Some(progress.multi())
    } else {
        None
    };
    chartline_core::init_logging(cli.debug, multi);

    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Run(args) => cmd::run::run(args, &config, &progress),
        Command::Stage(args) => cmd::stage::run(args, &config, &progress),
        Command::Status(args) => cmd::status::run(args, &config),
        Command::Config => {
            use comfy_table::{
                Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
            };

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    Cell::new("Setting").fg(Color::Cyan),
                    Cell::new("Value").fg(Color::Cyan),
                ]);

            table.add_row(vec![
                "Output directory",
                &config.output.dir.display().to_string(),
            ]);
            table.add_row(vec![
                "Database",
                &config
                    .database_path(&config.output.dir)
                    .display()
                    .to_string(),
            ]);
            table.add_row(vec![
                "Credentials",
                &match config.credential_pool() {
                    Ok(pool) => format!("{} pair(s)", pool.len()),
                    Err(_) => "not set".to_string(),
                },
            ]);
            table.add_row(vec!["Token URL", &config.api.token_url]);
            table.add_row(vec!["Catalog API", &config.api.base_url]);
            table.add_row(vec!["Streams API", &config.api.streams_base_url]);
            table.add_row(vec![
                "Catalog rate",
                &format!(
                    "{} calls / {}s",
                    config.rate.catalog.max_calls, config.rate.catalog.window_secs
                ),
            ]);
            table.add_row(vec![
                "Streams rate",
                &format!(
                    "{} calls / {}s",
                    config.rate.streams.max_calls, config.rate.streams.window_secs
                ),
            ]);
            table.add_row(vec![
                "Retry",
                &format!(
                    "{} attempts, backoff auth {}s / 429 {}s / pending {}s",
                    config.retry.max_attempts,
                    config.retry.auth_backoff_secs,
                    config.retry.rate_limit_backoff_secs,
                    config.retry.pending_backoff_secs
                ),
            ]);
            table.add_row(vec![
                "Token",
                &format!(
                    "{} attempts, {}s cooldown",
                    config.token.max_attempts, config.token.cooldown_secs
                ),
            ]);
            table.add_row(vec![
                "Batch sizes",
                &format!(
                    "artists {}, audio features {}",
                    config.batch.artists, config.batch.audio_features
                ),
            ]);
            table.add_row(vec![
                "Stream window",
                &format!(
                    "lookback {}d, window {}d",
                    config.streams.lookback_days, config.streams.window_days
                ),
            ]);
            table.add_row(vec![
                "Markets",
                &config
                    .markets
                    .iter()
                    .map(|m| m.code.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            ]);

            eprintln!("\n{table}");
            Ok(())
        }
    }
}
