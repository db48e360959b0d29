//! Administrative CLI for a Quotebase store.
//!
//! # Responsibility
//! - Expose counter recompute and verification to operators.
//! - Print machine-readable JSON reports on stdout.
//!
//! # Invariants
//! - `verify-counters` never writes and exits with status 1 on drift.

use clap::{Parser, Subcommand};
use log::info;
use quotebase_core::{
    core_version, init_from_config, open_db, recompute_counters, verify_counters, CoreConfig,
};
use serde::Serialize;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "quotebase")]
#[command(about = "Quotebase store administration")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "QUOTEBASE_CONFIG")]
    config: Option<PathBuf>,

    /// Database file; overrides `database_path` from the configuration
    #[arg(long, env = "QUOTEBASE_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recount every quotes_count from live rows and report corrections
    RecomputeCounters,
    /// Report counters that disagree with live rows without changing them
    VerifyCounters,
    /// Print the core version
    Version,
}

#[derive(Serialize)]
struct VerifyOutput<T: Serialize> {
    clean: bool,
    drift: T,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("quotebase: {err}");
            ExitCode::from(2)
        }
    }
}

fn run(args: Args) -> Result<ExitCode, Box<dyn Error>> {
    if let Command::Version = args.command {
        println!("{}", core_version());
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = match &args.config {
        Some(path) => CoreConfig::load(path)?,
        None => CoreConfig::default(),
    };
    if let Some(db) = args.db {
        config.database_path = db;
    }
    init_from_config(&config)?;

    let conn = open_db(&config.database_path, &config)?;
    match args.command {
        Command::RecomputeCounters => {
            let report = recompute_counters(&conn)?;
            info!(
                "event=cli_recompute module=cli status=ok corrected={}",
                report.corrected.len()
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::VerifyCounters => {
            let drift = verify_counters(&conn)?;
            let clean = drift.is_empty();
            info!(
                "event=cli_verify module=cli status=ok drift={}",
                drift.len()
            );
            println!(
                "{}",
                serde_json::to_string_pretty(&VerifyOutput { clean, drift })?
            );
            Ok(if clean {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }
        Command::Version => Ok(ExitCode::SUCCESS),
    }
}
