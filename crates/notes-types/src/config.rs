//! Configuration loading for the notes search service.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/notes-search/config.toml.

use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};

use crate::error::NotesError;

const APP_NAME: &str = "notes-search";

/// Background reindex settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReindexSettings {
    /// Force a full scan when the service starts, even if the index has documents.
    #[serde(default)]
    pub on_startup: bool,

    /// Cron expression (6-field: sec min hour day month weekday).
    #[serde(default = "default_reindex_schedule")]
    pub schedule: String,

    /// IANA timezone the schedule is evaluated in.
    #[serde(default = "default_reindex_timezone")]
    pub timezone: String,

    /// Documents queued per writer commit.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// A lock file older than this is considered abandoned.
    #[serde(default = "default_lock_stale_secs")]
    pub lock_stale_secs: u64,
}

fn default_reindex_schedule() -> String {
    "0 0 3 * * *".to_string()
}

fn default_reindex_timezone() -> String {
    "UTC".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_lock_stale_secs() -> u64 {
    6 * 60 * 60
}

impl Default for ReindexSettings {
    fn default() -> Self {
        Self {
            on_startup: false,
            schedule: default_reindex_schedule(),
            timezone: default_reindex_timezone(),
            batch_size: default_batch_size(),
            lock_stale_secs: default_lock_stale_secs(),
        }
    }
}

/// Search request limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

fn default_limit() -> usize {
    100
}

fn default_max_limit() -> usize {
    1000
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Root directory holding one `user_<id>` vault per tenant
    #[serde(default = "default_vaults_root")]
    pub vaults_root: String,

    /// Directory of the shared full-text index
    #[serde(default = "default_index_dir")]
    pub index_dir: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Memory budget of the index writer in MB
    #[serde(default = "default_writer_memory_mb")]
    pub writer_memory_mb: usize,

    /// How long a write waits for another process's index writer, in ms
    #[serde(default = "default_writer_wait_ms")]
    pub writer_wait_ms: u64,

    #[serde(default)]
    pub reindex: ReindexSettings,

    #[serde(default)]
    pub search: SearchSettings,
}

fn default_vaults_root() -> String {
    "data/vaults".to_string()
}

fn default_index_dir() -> String {
    ProjectDirs::from("", "", APP_NAME)
        .map(|p| p.data_local_dir().join("index"))
        .unwrap_or_else(|| PathBuf::from("data/indexes"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_writer_memory_mb() -> usize {
    50
}

fn default_writer_wait_ms() -> u64 {
    5000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            vaults_root: default_vaults_root(),
            index_dir: default_index_dir(),
            log_level: default_log_level(),
            writer_memory_mb: default_writer_memory_mb(),
            writer_wait_ms: default_writer_wait_ms(),
            reindex: ReindexSettings::default(),
            search: SearchSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/notes-search/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (NOTES_*)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, NotesError> {
        let config_dir = ProjectDirs::from("", "", APP_NAME)
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("vaults_root", default_vaults_root())
            .map_err(|e| NotesError::Config(e.to_string()))?
            .set_default("index_dir", default_index_dir())
            .map_err(|e| NotesError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| NotesError::Config(e.to_string()))?
            .set_default("writer_memory_mb", default_writer_memory_mb() as i64)
            .map_err(|e| NotesError::Config(e.to_string()))?
            .set_default("writer_wait_ms", default_writer_wait_ms() as i64)
            .map_err(|e| NotesError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // NOTES_INDEX_DIR, NOTES_REINDEX__BATCH_SIZE, ...
        // Nested keys use a double underscore so snake_case names survive.
        builder = builder.add_source(
            Environment::with_prefix("NOTES")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| NotesError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| NotesError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<(), NotesError> {
        if self.writer_memory_mb == 0 {
            return Err(NotesError::Config("writer_memory_mb must be > 0".into()));
        }
        if self.reindex.batch_size == 0 {
            return Err(NotesError::Config("reindex.batch_size must be > 0".into()));
        }
        if self.search.max_limit == 0 || self.search.default_limit > self.search.max_limit {
            return Err(NotesError::Config(format!(
                "search.default_limit ({}) must be within 1..={}",
                self.search.default_limit, self.search.max_limit
            )));
        }
        Ok(())
    }

    /// Index directory with a leading `~/` expanded.
    pub fn expanded_index_dir(&self) -> PathBuf {
        expand_home(&self.index_dir)
    }

    /// Vaults root with a leading `~/` expanded.
    pub fn expanded_vaults_root(&self) -> PathBuf {
        expand_home(&self.vaults_root)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(dirs) = BaseDirs::new() {
            return dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}
