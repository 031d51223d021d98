//! skinctl - Track skin compositing CLI
//!
//! Lists the skins installed for a track, previews the changes a composition
//! pass would make and runs passes on demand.

#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod commands;
mod error;
mod output;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::Selection;
use crate::error::CliError;

#[derive(Parser)]
#[command(name = "skinctl")]
#[command(about = "Track skin compositing - list, plan and compose skin overlays")]
#[command(version)]
#[command(long_about = "
skinctl merges the active skins of a track into the folder the simulator reads.
Skins live in <track>/skins/cm_skins/<id>/ and are composed into
<track>/skins/default/ using hard links where the filesystem allows.

Use --json flag for machine-readable output suitable for scripting.
")]
struct Cli {
    /// Output format (human-readable or JSON)
    #[arg(long, global = true, help = "Output in JSON format for machine parsing")]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Compositor configuration file (JSON)
    #[arg(long, global = true, env = "SKINCTL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct SelectionArgs {
    /// Activate a skin before running (repeatable)
    #[arg(long = "activate", value_name = "SKIN")]
    activate: Vec<String>,

    /// Deactivate a skin before running (repeatable)
    #[arg(long = "deactivate", value_name = "SKIN")]
    deactivate: Vec<String>,
}

impl From<&SelectionArgs> for Selection {
    fn from(args: &SelectionArgs) -> Self {
        Self {
            activate: args.activate.clone(),
            deactivate: args.deactivate.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List installed skins and their state
    List {
        /// Track folder
        track: PathBuf,
    },

    /// Show what a composition pass would change
    Plan {
        /// Track folder
        track: PathBuf,

        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Run a composition pass now
    Compose {
        /// Track folder
        track: PathBuf,

        #[command(flatten)]
        selection: SelectionArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("skinctl={log_level},track_skins={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let result = execute_command(&cli).await;

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            if cli.json {
                output::print_error_json(&e);
            } else {
                output::print_error_human(&e);
            }

            let exit_code = e.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
            std::process::exit(exit_code);
        }
    }
}

async fn execute_command(cli: &Cli) -> Result<()> {
    let config = commands::load_config(cli.config.as_deref())?;
    match &cli.command {
        Commands::List { track } => commands::list(track, &config, cli.json).await,
        Commands::Plan { track, selection } => {
            commands::plan(track, &config, &selection.into(), cli.json).await
        }
        Commands::Compose { track, selection } => {
            commands::compose(track, &config, &selection.into(), cli.json).await
        }
    }
}
