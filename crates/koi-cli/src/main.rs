//! koi - KOI disposition classifier CLI
//!
//! Usage:
//!   koi train --data koi.csv --out artifacts            # Train and evaluate
//!   koi predict --artifacts artifacts --record '{...}'  # Classify one record
//!   koi predict --artifacts artifacts --record @row.json
//!   koi batch --artifacts artifacts --input rows.csv    # Classify a file
//!   koi inspect --artifacts artifacts                   # Show schema and statistics
//!   koi explain --artifacts artifacts --record @row.json --question "Why?"

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod output;

use commands::{batch, explain, inspect, predict, train};

/// koi - classify Kepler Objects of Interest
///
/// Train the stacking ensemble, then classify single records or whole files
/// from the saved artifacts.
#[derive(Parser)]
#[command(name = "koi")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the ensemble on a labelled KOI table and save artifacts
    Train {
        /// Labelled KOI table (CSV, or JSON array of objects)
        #[arg(long, value_name = "FILE")]
        data: PathBuf,

        /// Directory to write artifacts into
        #[arg(long, value_name = "DIR", default_value = "artifacts")]
        out: PathBuf,

        /// JSON training configuration overriding the defaults
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Random seed for the split and the learners
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Classify one record
    Predict {
        /// Artifact directory
        #[arg(long, value_name = "DIR", default_value = "artifacts")]
        artifacts: PathBuf,

        /// JSON object, or @path to a file holding one
        #[arg(long, value_name = "JSON|@FILE")]
        record: String,
    },

    /// Classify every row of a CSV or JSON file
    Batch {
        /// Artifact directory
        #[arg(long, value_name = "DIR", default_value = "artifacts")]
        artifacts: PathBuf,

        /// Input rows (CSV, or JSON array of objects)
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        /// Also write the JSON report to this file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Show the feature schema and fitted statistics
    Inspect {
        /// Artifact directory
        #[arg(long, value_name = "DIR", default_value = "artifacts")]
        artifacts: PathBuf,
    },

    /// Classify a record and render the explanation prompt for a question
    Explain {
        /// Artifact directory
        #[arg(long, value_name = "DIR", default_value = "artifacts")]
        artifacts: PathBuf,

        /// JSON object, or @path to a file holding one
        #[arg(long, value_name = "JSON|@FILE")]
        record: String,

        /// Question about the prediction
        #[arg(long)]
        question: String,
    },
}

/// Installs the log subscriber on stderr.
///
/// `--verbose` and `--quiet` take precedence over `RUST_LOG`.
fn init_logging(verbose: bool, quiet: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Train {
            data,
            out,
            config,
            seed,
        } => train::run(&data, &out, config.as_deref(), seed, cli.json),

        Commands::Predict { artifacts, record } => predict::run(&artifacts, &record, cli.json),

        Commands::Batch {
            artifacts,
            input,
            output,
        } => batch::run(&artifacts, &input, output.as_deref(), cli.json),

        Commands::Inspect { artifacts } => inspect::run(&artifacts, cli.json),

        Commands::Explain {
            artifacts,
            record,
            question,
        } => explain::run(&artifacts, &record, &question, cli.json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            e.exit_code()
        }
    }
}
