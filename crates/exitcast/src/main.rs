//! Exitcast command line
//!
//! One subcommand per pipeline stage plus `run` for a whole cycle. Stages are
//! meant to be scheduled externally; each invocation is one stage attempt and
//! exits non-zero when the stage fails.

use clap::Parser;
use exitcast_logging::{init_logging, LogConfig};
use std::process::ExitCode;

mod cli;

#[derive(Parser, Debug)]
#[command(
    name = "exitcast",
    version,
    about = "Predict exit destinations for active clients"
)]
struct Cli {
    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print stage summaries as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: cli::Commands,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match init_logging(LogConfig {
        app_name: "exitcast",
        verbose: cli.verbose,
        log_dir: None,
    }) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: failed to initialize logging: {:#}", err);
            None
        }
    };

    match cli::run(cli.command, cli.json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{:#}", err), "Command failed");
            eprint!("{}", cli::error::HelpfulError::from_anyhow(&err));
            ExitCode::from(cli::error::exit_code(&err))
        }
    }
}
