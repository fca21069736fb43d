//! CLI command handlers.

mod add;
mod config;
mod list;
mod run;

pub use add::run_add_command;
pub use config::{run_auto_retrieve_command, run_config_show_command};
pub use list::run_list_command;
pub use run::run_operation_command;

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use doi_manager_core::{
    BatchCoordinator, Database, FilePreferenceSource, PreferenceCache, ResolverClient,
    SqliteStore, TerminalReporter,
};

const APP_DATA_DIR: &str = "doi-manager";
const DB_FILE_NAME: &str = "library.db";

/// Everything a command needs to touch the library.
pub struct Library {
    pub store: Arc<SqliteStore>,
    pub prefs: Arc<PreferenceCache>,
    pub coordinator: BatchCoordinator,
}

/// Resolves the default library path.
///
/// Priority:
/// 1. `$XDG_DATA_HOME/doi-manager/library.db`
/// 2. `$HOME/.local/share/doi-manager/library.db`
#[must_use]
pub fn resolve_default_db_path() -> Option<PathBuf> {
    if let Some(xdg_data_home) = env_var_non_empty_os("XDG_DATA_HOME") {
        return Some(PathBuf::from(xdg_data_home).join(APP_DATA_DIR).join(DB_FILE_NAME));
    }
    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DATA_DIR)
            .join(DB_FILE_NAME),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Opens the library database, creating its directory if needed.
pub async fn open_store(db_path: Option<&Path>) -> Result<Arc<SqliteStore>> {
    let path = match db_path {
        Some(path) => path.to_path_buf(),
        None => resolve_default_db_path()
            .context("cannot locate the library: set --db, XDG_DATA_HOME or HOME")?,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("cannot create library directory {}", parent.display()))?;
    }
    let db = Database::new(&path)
        .await
        .with_context(|| format!("cannot open library {}", path.display()))?;
    Ok(Arc::new(SqliteStore::new(db)))
}

/// Preference cache over the config file at `config_path` or the default
/// location.
#[must_use]
pub fn preference_cache(config_path: Option<PathBuf>) -> Arc<PreferenceCache> {
    let source = match config_path {
        Some(path) => FilePreferenceSource::new(Some(path)),
        None => FilePreferenceSource::default_location(),
    };
    Arc::new(PreferenceCache::new(Arc::new(source)))
}

/// Wires store, resolver, reporter and preferences into a coordinator.
pub async fn open_library(
    db_path: Option<&Path>,
    config_path: Option<PathBuf>,
    show_progress: bool,
) -> Result<Library> {
    let store = open_store(db_path).await?;
    let prefs = preference_cache(config_path);
    let services = prefs
        .get()
        .context("cannot read configuration")?
        .services
        .clone();
    let lookup = ResolverClient::new(&services).context("cannot set up lookup clients")?;
    let coordinator = BatchCoordinator::new(
        store.clone(),
        Arc::new(lookup),
        Arc::new(TerminalReporter::new(show_progress)),
        prefs.clone(),
    );
    Ok(Library {
        store,
        prefs,
        coordinator,
    })
}
