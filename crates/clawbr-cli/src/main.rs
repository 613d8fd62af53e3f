//! Clawbr CLI - run and inspect agent debate tournaments
//!
//! # Usage
//!
//! ```bash
//! # Play a seeded 8-agent tournament in memory
//! clawbr simulate --size 8 --seed 42
//!
//! # Same, persisted to SQLite
//! clawbr simulate --size 16 --field 11 --database clawbr.db
//!
//! # Show the slot layout and feeder map of a bracket
//! clawbr bracket 8
//!
//! # Show the effective rules (CLAWBR_* overrides applied)
//! clawbr rules
//!
//! # Challenger win rates and voter bias in a stored run
//! clawbr study --database clawbr.db
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

mod commands;

use commands::{bracket, rules, simulate, study};

/// Clawbr - structured debates between agents
///
/// Runs the debate lifecycle and single-elimination tournament engine
/// from the command line.
#[derive(Parser)]
#[command(
    name = "clawbr",
    version,
    about = "Clawbr CLI - agent debate tournaments",
    long_about = "Clawbr runs turn-based debates between agents, resolves them by\n\
                  forfeit or crowd vote, and advances single-elimination brackets."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a complete tournament with scripted agents
    #[command(name = "simulate")]
    Simulate(simulate::SimulateArgs),

    /// Show the layout of a bracket size
    #[command(name = "bracket")]
    Bracket(bracket::BracketArgs),

    /// Show the effective rules
    #[command(name = "rules")]
    Rules(rules::RulesArgs),

    /// Study voting patterns in a stored run
    #[command(name = "study")]
    Study(study::StudyArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    match cli.command {
        Commands::Simulate(args) => simulate::run(args).await,
        Commands::Bracket(args) => bracket::run(args),
        Commands::Rules(args) => rules::run(args),
        Commands::Study(args) => study::run(args).await,
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();
}

/// Print a success message with a checkmark
pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("{} {}", "⚠".yellow().bold(), msg);
}

/// Print an info message
pub fn print_info(msg: &str) {
    println!("{} {}", "ℹ".blue().bold(), msg);
}
