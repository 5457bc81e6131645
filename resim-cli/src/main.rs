//! ReSim command-line client.
//!
//! # Usage
//!
//! ```text
//! resim experiences sync --experience-config <file> [--project <name|id>] [--verbose]
//! resim experiences sync --experience-config <file> --clone [--project <name|id>]
//! ```
//!
//! Exit codes: 0 applied, 1 rejected before any mutation, 2 partially
//! applied, 3 cancelled.

mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;

use commands::experiences::ExperiencesCommand;
use resim_sync::{SyncError, EXIT_REJECTED};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "resim",
    version,
    about = "Manage ReSim experiences from declarative configuration",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Work with experiences, tags, systems and test suites.
    Experiences {
        #[command(subcommand)]
        command: ExperiencesCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Experiences { command } => commands::experiences::run(command),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::from(exit_code(&err))
        }
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<SyncError>()
        .map_or(EXIT_REJECTED, SyncError::exit_code)
}

/// Log to stderr. `RESIM_LOG` takes precedence over `--verbose`.
pub(crate) fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_env("RESIM_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
