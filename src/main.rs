//! CLI entry point for the DOI manager.

use std::io::{self, IsTerminal};

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod cli;
mod commands;

use cli::{Args, Command, ConfigCommand, SelectionArgs};
use doi_manager_core::Operation;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (warn)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let show_progress = !args.quiet && io::stderr().is_terminal();

    match &args.command {
        Command::Short(selection) => {
            run_operation(&args, Operation::Short, selection, show_progress).await
        }
        Command::Long(selection) => {
            run_operation(&args, Operation::Long, selection, show_progress).await
        }
        Command::Check(selection) => {
            run_operation(&args, Operation::Check, selection, show_progress).await
        }
        Command::Add(add) => {
            let library =
                commands::open_library(args.db.as_deref(), args.config.clone(), show_progress)
                    .await?;
            commands::run_add_command(&library, add).await
        }
        Command::List => {
            let library =
                commands::open_library(args.db.as_deref(), args.config.clone(), false).await?;
            commands::run_list_command(&library).await
        }
        Command::AutoRetrieve { mode } => {
            commands::run_auto_retrieve_command(args.config.clone(), *mode)
        }
        Command::Config {
            action: ConfigCommand::Show,
        } => commands::run_config_show_command(args.config.clone()),
    }
}

async fn run_operation(
    args: &Args,
    operation: Operation,
    selection: &SelectionArgs,
    show_progress: bool,
) -> Result<()> {
    let library =
        commands::open_library(args.db.as_deref(), args.config.clone(), show_progress).await?;
    commands::run_operation_command(&library, operation, selection).await
}
