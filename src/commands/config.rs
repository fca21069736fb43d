//! Config command handlers: show effective configuration, set auto-retrieve.

use std::path::PathBuf;

use anyhow::Result;
use doi_manager_core::config::resolve_default_config_path;
use doi_manager_core::{AutoRetrieveMode, load_config};

use super::preference_cache;

pub fn run_config_show_command(config_path: Option<PathBuf>) -> Result<()> {
    let loaded_config = load_config(config_path.or_else(resolve_default_config_path))?;
    let prefs = &loaded_config.preferences;

    let resolved_path = loaded_config.path.as_ref().map_or_else(
        || "<unresolved>".to_string(),
        |path| path.display().to_string(),
    );
    println!("config_path = {resolved_path}");
    println!(
        "config_file = {}",
        if loaded_config.loaded_from_file {
            "loaded"
        } else {
            "not found (using defaults)"
        }
    );
    println!("tag_invalid = {:?}", prefs.tag_invalid);
    println!("tag_nodoi = {:?}", prefs.tag_nodoi);
    println!("tag_multiple = {:?}", prefs.tag_multiple);
    println!("autoretrieve = {}", prefs.autoretrieve);
    println!("shortdoi_url = {}", prefs.services.shortdoi_url);
    println!("handle_url = {}", prefs.services.handle_url);
    println!("crossref_url = {}", prefs.services.crossref_url);
    println!("crossref_email = {}", prefs.services.crossref_email);
    println!("connect_timeout_secs = {}", prefs.services.connect_timeout_secs);
    println!("read_timeout_secs = {}", prefs.services.read_timeout_secs);

    Ok(())
}

pub fn run_auto_retrieve_command(config_path: Option<PathBuf>, mode: AutoRetrieveMode) -> Result<()> {
    preference_cache(config_path).set_autoretrieve(mode)?;
    println!("autoretrieve = {mode}");
    Ok(())
}
