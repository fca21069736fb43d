//! Preferences for the DOI pipeline: classification tag names, the
//! auto-retrieve mode and the lookup service endpoints.
//!
//! Preferences are read from `$XDG_CONFIG_HOME/doi-manager/config.toml`
//! (falling back to `$HOME/.config/doi-manager/config.toml`). A missing file
//! means defaults. The batch coordinator reads them through a
//! [`PreferenceCache`], which keeps one snapshot until it is invalidated.
//!
//! ```toml
//! tag_invalid = "_Invalid DOI"
//! tag_nodoi = "_No DOI found"
//! tag_multiple = "_Multiple DOIs found"
//! autoretrieve = "short"
//!
//! [services]
//! crossref_email = "me@example.org"
//! read_timeout_secs = 45
//! ```

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::batch::Operation;

/// Directory name under the user config root.
pub const APP_CONFIG_DIR: &str = "doi-manager";

pub const DEFAULT_TAG_INVALID: &str = "_Invalid DOI";
pub const DEFAULT_TAG_NODOI: &str = "_No DOI found";
pub const DEFAULT_TAG_MULTIPLE: &str = "_Multiple DOIs found";

pub const DEFAULT_SHORTDOI_URL: &str = "https://shortdoi.org";
pub const DEFAULT_HANDLE_URL: &str = "https://doi.org/api/handles";
pub const DEFAULT_CROSSREF_URL: &str = "https://www.crossref.org/openurl";
pub const DEFAULT_CROSSREF_EMAIL: &str = "doi-manager@example.org";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;

/// Errors raised while loading, validating or saving preferences.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {source}\n  Suggestion: Check the TOML syntax and key names")]
    Parse {
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config value for `{field}`: {value}. Expected {expected}")]
    Invalid {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("failed to write config file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error(
        "no config location could be determined\n  Suggestion: Set XDG_CONFIG_HOME or HOME"
    )]
    NoConfigPath,
}

/// Operation started automatically when records are added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoRetrieveMode {
    #[default]
    Short,
    Long,
    Check,
    None,
}

impl AutoRetrieveMode {
    /// The batch operation for this mode, or `None` when disabled.
    #[must_use]
    pub fn operation(self) -> Option<Operation> {
        match self {
            Self::Short => Some(Operation::Short),
            Self::Long => Some(Operation::Long),
            Self::Check => Some(Operation::Check),
            Self::None => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Long => "long",
            Self::Check => "check",
            Self::None => "none",
        }
    }
}

impl fmt::Display for AutoRetrieveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutoRetrieveMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" => Ok(Self::Short),
            "long" => Ok(Self::Long),
            "check" => Ok(Self::Check),
            "none" => Ok(Self::None),
            _ => Err(ConfigError::Invalid {
                field: "autoretrieve",
                value: s.to_string(),
                expected: "one of: short, long, check, none",
            }),
        }
    }
}

/// Lookup service endpoints and HTTP timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceSettings {
    pub shortdoi_url: String,
    pub handle_url: String,
    pub crossref_url: String,
    /// Contact address sent as the Crossref `pid`.
    pub crossref_email: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            shortdoi_url: DEFAULT_SHORTDOI_URL.to_string(),
            handle_url: DEFAULT_HANDLE_URL.to_string(),
            crossref_url: DEFAULT_CROSSREF_URL.to_string(),
            crossref_email: DEFAULT_CROSSREF_EMAIL.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
        }
    }
}

/// User preferences. An empty tag name disables tagging for that category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Preferences {
    pub tag_invalid: String,
    pub tag_nodoi: String,
    pub tag_multiple: String,
    pub autoretrieve: AutoRetrieveMode,
    pub services: ServiceSettings,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            tag_invalid: DEFAULT_TAG_INVALID.to_string(),
            tag_nodoi: DEFAULT_TAG_NODOI.to_string(),
            tag_multiple: DEFAULT_TAG_MULTIPLE.to_string(),
            autoretrieve: AutoRetrieveMode::default(),
            services: ServiceSettings::default(),
        }
    }
}

impl Preferences {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on bad syntax or unknown keys and
    /// [`ConfigError::Invalid`] when a value is out of range.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let prefs: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse { source })?;
        prefs.validate()?;
        Ok(prefs)
    }

    /// Checks values against runtime constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_timeout_secs("connect_timeout_secs", self.services.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.services.read_timeout_secs)?;
        validate_base_url("shortdoi_url", &self.services.shortdoi_url)?;
        validate_base_url("handle_url", &self.services.handle_url)?;
        validate_base_url("crossref_url", &self.services.crossref_url)?;
        if self.services.crossref_email.trim().is_empty()
            || self
                .services
                .crossref_email
                .chars()
                .any(|c| c == '\n' || c == '\r' || c == '\0')
        {
            return Err(ConfigError::Invalid {
                field: "crossref_email",
                value: self.services.crossref_email.clone(),
                expected: "a non-empty address without control characters",
            });
        }
        Ok(())
    }

    /// Reads preferences from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, or any
    /// error from [`Preferences::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Writes preferences to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Write`] or [`ConfigError::Serialize`].
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn validate_timeout_secs(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if !(1..=3600).contains(&value) {
        return Err(ConfigError::Invalid {
            field,
            value: value.to_string(),
            expected: "range 1..=3600",
        });
    }
    Ok(())
}

fn validate_base_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(ConfigError::Invalid {
            field,
            value: value.to_string(),
            expected: "an absolute http(s) URL",
        }),
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/doi-manager/config.toml`
/// 2. `$HOME/.config/doi-manager/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(APP_CONFIG_DIR)
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_CONFIG_DIR)
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Preferences together with where they came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    pub preferences: Preferences,
    /// True when the file existed and was parsed.
    pub loaded_from_file: bool,
}

/// Loads preferences from `path`, or defaults when the path is unknown or
/// the file does not exist.
///
/// # Errors
///
/// Returns an error if an existing file cannot be read or is invalid.
pub fn load_config(path: Option<PathBuf>) -> Result<LoadedConfig, ConfigError> {
    match path.as_deref() {
        Some(existing) if existing.exists() => {
            let preferences = Preferences::load(existing)?;
            Ok(LoadedConfig {
                path,
                preferences,
                loaded_from_file: true,
            })
        }
        _ => Ok(LoadedConfig {
            path,
            preferences: Preferences::default(),
            loaded_from_file: false,
        }),
    }
}

/// Where the preference cache reads from and writes to.
pub trait PreferenceSource: Send + Sync {
    /// Reads the current preferences.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the backing store is unreadable.
    fn load(&self) -> Result<Preferences, ConfigError>;

    /// Persists a new auto-retrieve mode.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the backing store cannot be written.
    fn store_autoretrieve(&self, mode: AutoRetrieveMode) -> Result<(), ConfigError>;
}

/// Preferences backed by a TOML file.
#[derive(Debug, Clone)]
pub struct FilePreferenceSource {
    path: Option<PathBuf>,
}

impl FilePreferenceSource {
    #[must_use]
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// Source at [`resolve_default_config_path`].
    #[must_use]
    pub fn default_location() -> Self {
        Self::new(resolve_default_config_path())
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl PreferenceSource for FilePreferenceSource {
    fn load(&self) -> Result<Preferences, ConfigError> {
        load_config(self.path.clone()).map(|loaded| loaded.preferences)
    }

    fn store_autoretrieve(&self, mode: AutoRetrieveMode) -> Result<(), ConfigError> {
        let path = self.path.as_deref().ok_or(ConfigError::NoConfigPath)?;
        let mut prefs = self.load()?;
        prefs.autoretrieve = mode;
        prefs.save(path)
    }
}

/// Preferences held in memory; used by embedders and tests.
#[derive(Debug, Default)]
pub struct InMemoryPreferenceSource {
    prefs: Mutex<Preferences>,
}

impl InMemoryPreferenceSource {
    #[must_use]
    pub fn new(prefs: Preferences) -> Self {
        Self {
            prefs: Mutex::new(prefs),
        }
    }

    /// Replaces the stored preferences. Cached snapshots are not touched.
    pub fn replace(&self, prefs: Preferences) {
        if let Ok(mut guard) = self.prefs.lock() {
            *guard = prefs;
        }
    }
}

impl PreferenceSource for InMemoryPreferenceSource {
    fn load(&self) -> Result<Preferences, ConfigError> {
        Ok(self
            .prefs
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default())
    }

    fn store_autoretrieve(&self, mode: AutoRetrieveMode) -> Result<(), ConfigError> {
        if let Ok(mut guard) = self.prefs.lock() {
            guard.autoretrieve = mode;
        }
        Ok(())
    }
}

/// Caches one preference snapshot until invalidated.
pub struct PreferenceCache {
    source: Arc<dyn PreferenceSource>,
    cached: Mutex<Option<Arc<Preferences>>>,
}

impl PreferenceCache {
    #[must_use]
    pub fn new(source: Arc<dyn PreferenceSource>) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
        }
    }

    /// Returns the cached snapshot, loading it on first use.
    ///
    /// # Errors
    ///
    /// Returns the source's error when nothing is cached and loading fails.
    pub fn get(&self) -> Result<Arc<Preferences>, ConfigError> {
        if let Ok(guard) = self.cached.lock()
            && let Some(prefs) = guard.as_ref()
        {
            return Ok(Arc::clone(prefs));
        }

        let prefs = Arc::new(self.source.load()?);
        if let Ok(mut guard) = self.cached.lock() {
            *guard = Some(Arc::clone(&prefs));
        }
        debug!(autoretrieve = %prefs.autoretrieve, "Loaded preferences");
        Ok(prefs)
    }

    /// Drops the cached snapshot so the next `get` reads the source again.
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.cached.lock() {
            *guard = None;
        }
    }

    /// Persists a new auto-retrieve mode and invalidates the cache.
    ///
    /// # Errors
    ///
    /// Returns the source's write error; the cache is left untouched then.
    pub fn set_autoretrieve(&self, mode: AutoRetrieveMode) -> Result<(), ConfigError> {
        self.source.store_autoretrieve(mode)?;
        self.invalidate();
        Ok(())
    }
}

impl fmt::Debug for PreferenceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreferenceCache").finish_non_exhaustive()
    }
}
