//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use doi_manager_core::AutoRetrieveMode;

/// Resolve, shorten, lengthen and verify DOIs in a reference library.
///
/// Records live in a local `SQLite` library. Each operation walks the selected
/// records one at a time, asks shortDOI, the DOI handle API or Crossref, and
/// updates or tags the record with the answer.
#[derive(Parser, Debug)]
#[command(name = "doi-manager")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Library database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Config file (defaults to $XDG_CONFIG_HOME/doi-manager/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Replace DOIs with their shortDOI alias
    Short(SelectionArgs),

    /// Replace DOIs with their full form
    Long(SelectionArgs),

    /// Validate DOIs and strip extra text
    Check(SelectionArgs),

    /// Add a record and run the auto-retrieve operation on it
    Add(AddArgs),

    /// List records with their DOI and tags
    List,

    /// Set the operation run on newly added records
    AutoRetrieve {
        /// short, long, check or none
        #[arg(value_parser = parse_mode)]
        mode: AutoRetrieveMode,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
}

/// Which records an operation runs on.
#[derive(Debug, Clone, ClapArgs)]
pub struct SelectionArgs {
    /// Record ids
    #[arg(value_name = "ID", required_unless_present = "all")]
    pub ids: Vec<i64>,

    /// Run on every record in the library
    #[arg(long, conflicts_with = "ids")]
    pub all: bool,
}

/// Arguments for the add command.
#[derive(Debug, Clone, ClapArgs)]
pub struct AddArgs {
    /// Item type, e.g. journalArticle
    pub item_type: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub doi: Option<String>,

    /// Creator as "Last, First"; repeatable
    #[arg(long = "creator", value_name = "NAME")]
    pub creators: Vec<String>,

    /// Extra field as name=value; repeatable
    #[arg(long = "field", value_name = "NAME=VALUE", value_parser = parse_field)]
    pub fields: Vec<(String, String)>,
}

fn parse_mode(raw: &str) -> Result<AutoRetrieveMode, String> {
    raw.parse().map_err(|e: doi_manager_core::ConfigError| e.to_string())
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("field name is empty in '{raw}'"));
    }
    Ok((name.to_string(), value.to_string()))
}
