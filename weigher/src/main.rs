//! Weigher CLI
//!
//! # Commands
//!
//! - `weigh`: receiver, source and category weights for every window file of a
//!   path descriptor
//! - `count`: window totals per category, optionally with a default parameter file

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "weigher")]
#[command(version)]
#[command(about = "Hierarchical window weighting for seismic inversion")]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory of the rolling log files
    #[arg(long, global = true, default_value = "logs")]
    log_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute and write window weights
    Weigh(WeighArgs),
    /// Count windows per category over many window files
    Count(CountArgs),
}

#[derive(Args)]
struct WeighArgs {
    /// Path descriptor (JSON)
    #[arg(short = 'f', long)]
    path_file: PathBuf,

    /// Parameter descriptor (YAML)
    #[arg(short = 'p', long)]
    param_file: PathBuf,
}

#[derive(Args)]
struct CountArgs {
    /// Count descriptor (JSON)
    #[arg(short = 'f', long)]
    path_file: PathBuf,

    /// User weight ratios (YAML)
    #[arg(short = 'p', long)]
    param_file: Option<PathBuf>,
}

fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Weigh(args) => {
            weigher::weigh::run(&args.path_file, &args.param_file)?;
        }
        Commands::Count(args) => {
            weigher::count::run(&args.path_file, args.param_file.as_deref())?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = log_level(cli.verbose);
    if let Err(err) = common::log_setup::setup_logging(level, &cli.log_dir, "weigher") {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
