//! # trainfile CLI
//!
//! A command-line tool for inspecting facility run data.
//!
//! ## Usage
//!
//! ```bash
//! # Summarize a run directory (or a single file)
//! trainfile info /data/raw/r0042
//!
//! # List the sources of a run
//! trainfile sources /data/raw/r0042
//!
//! # List the keys of one source
//! trainfile keys /data/raw/r0042 SA1_XTD2_XGM/XGM/MAIN
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use trainfile::collection::DataCollection;

/// trainfile - inspect train-synchronized facility run data
#[derive(Parser)]
#[command(name = "trainfile")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a run
    Info {
        /// Run directory or single file
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Emit the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the sources of a run
    Sources {
        /// Run directory or single file
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// List the keys of one source
    Keys {
        /// Run directory or single file
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Source name, e.g. SA1_XTD2_XGM/XGM/MAIN
        #[arg(value_name = "SOURCE")]
        source: String,
    },
}

fn open(path: &Path) -> Result<DataCollection> {
    let collection = if path.is_dir() {
        DataCollection::open_run(path)
    } else {
        DataCollection::open_file(path)
    };
    collection.with_context(|| format!("failed to open {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Info { path, json } => {
            let run = open(&path)?;
            let summary = run.summary().context("failed to summarize run")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", summary);
            }
        }

        Commands::Sources { path } => {
            let run = open(&path)?;
            println!("{} control sources:", run.control_sources().len());
            for source in run.control_sources() {
                println!("  - {}", source);
            }
            println!("{} instrument sources:", run.instrument_sources().len());
            for source in run.instrument_sources() {
                println!("  - {}", source);
            }
        }

        Commands::Keys { path, source } => {
            let run = open(&path)?;
            let keys = run
                .keys_for_source(&source)
                .with_context(|| format!("failed to list keys of {}", source))?;
            for key in keys {
                println!("{}", key);
            }
        }
    }

    Ok(())
}
