//! specforge - mine GitHub topics into validated, evidence-grounded app specs
//!
//! Three subcommands:
//! - `run` does the whole job: search a topic, fetch evidence, drive
//!   each repo through synthesis and the gap loop, write artifacts.
//! - `bridge` replays the validation pipeline on a saved response.
//! - `classify` triages a saved bridge report into a failure kind.

use clap::{Parser, Subcommand};
use specforge::config::Config;
use specforge_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

#[derive(Parser, Debug)]
#[command(
    name = "specforge",
    about = "Mine GitHub topics into validated, evidence-grounded app specs",
    version
)]
struct Cli {
    /// Enable verbose logging (debug level to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Path to a config file (default: $SPECFORGE_HOME/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mine a GitHub topic and synthesize one spec per repo
    Run {
        /// GitHub topic to mine (e.g. "note-taking")
        topic: String,

        /// Number of top-starred repos to process
        #[arg(short = 'n', long, default_value = "5")]
        limit: usize,

        /// Output directory (default: run.out_dir from config)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Emit a machine-readable JSON summary
        #[arg(long)]
        json: bool,
    },

    /// Replay the validation pipeline on a saved model response
    Bridge {
        /// File holding the raw model response text
        input: PathBuf,

        /// Evidence pack: a repo card or an evidence array, as JSON
        #[arg(short, long)]
        evidence: PathBuf,

        /// Attempt live citation repair (needs OPENROUTER_API_KEY)
        #[arg(long)]
        repair: bool,

        /// Write the canonical spec here on success
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print the full bridge report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classify a saved bridge report into a failure kind
    Classify {
        /// Path to a report_iter_N.json file written by a run
        report: PathBuf,

        /// Print the classification as JSON
        #[arg(long)]
        json: bool,
    },
}

fn command_wants_json(command: &Commands) -> bool {
    match command {
        Commands::Run { json, .. } => *json,
        Commands::Bridge { json, .. } => *json,
        Commands::Classify { json, .. } => *json,
    }
}

fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    match cli.command {
        Commands::Run { topic, limit, out, json } => {
            cli::run::run(cli::run::RunArgs { topic, limit, out, json }, config)
        }

        Commands::Bridge { input, evidence, repair, out, json } => cli::bridge::run(
            cli::bridge::BridgeArgs { input, evidence, repair, out, json },
            config,
        ),

        Commands::Classify { report, json } => {
            cli::classify::run(cli::classify::ClassifyArgs { report, json })
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let json_mode = command_wants_json(&cli.command);
    if let Err(e) = init_logging(LogConfig {
        app_name: "specforge",
        verbose: cli.verbose,
        quiet: json_mode,
    }) {
        eprintln!("Warning: failed to initialize logging: {}", e);
    }

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if json_mode {
                cli::error::print_json_error(&err);
            } else {
                eprintln!("{:#}", err);
            }
            ExitCode::from(1)
        }
    }
}
