//! `chartline status` - row counts per table and snapshot

use std::path::PathBuf;

use anyhow::Result;
use chartline_core::fmt_num;
use chartline_store::StoreStatus;
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output directory to inspect (default: [output] dir from config)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: StatusArgs, config: &Config) -> Result<()> {
    let sink = super::open_store(config, args.output.as_deref())?;
    let status = sink.status()?;
    eprintln!("Database:  {}", sink.database_path().display());
    eprintln!("Snapshots: {}", sink.snapshot_dir().display());
    eprintln!("\n{}", format_status(&status));
    Ok(())
}

fn format_status(status: &StoreStatus) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Table").fg(Color::Cyan),
            Cell::new("Stored rows").fg(Color::Cyan),
            Cell::new("Snapshot files").fg(Color::Cyan),
            Cell::new("Snapshot rows").fg(Color::Cyan),
        ]);

    for t in &status.tables {
        let snapshot = status.snapshots.iter().find(|s| s.table == t.table);
        table.add_row(vec![
            Cell::new(&t.table),
            Cell::new(fmt_num(t.rows as usize)).fg(Color::Green),
            Cell::new(snapshot.map_or_else(|| "-".to_string(), |s| s.files.to_string())),
            Cell::new(snapshot.map_or_else(|| "-".to_string(), |s| fmt_num(s.rows as usize))),
        ]);
    }
    table
}
