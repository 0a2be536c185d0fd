//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\music-steward\config.toml
//! - macOS: ~/Library/Application Support/music-steward/config.toml
//! - Linux: ~/.config/music-steward/config.toml
//!
//! The config file is human-readable and editable. Every section is optional;
//! missing keys fall back to their defaults. Command-line flags override the
//! file (see [`crate::cli`]).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::background::DispatcherConfig;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Library location and catalog database
    pub library: LibraryConfig,

    /// External tool locations
    pub tools: ToolsConfig,

    /// Fetch-tool settings for ingest
    pub ingest: IngestConfig,

    /// Edit and delete behaviour
    pub mutation: MutationConfig,

    /// Background job queue
    pub background: DispatcherConfig,
}

/// Library settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Library root; ingest destinations and album folder removal are
    /// confined to it (default: current directory)
    pub root: Option<PathBuf>,

    /// Catalog database file (default: `music_steward.db` in the working
    /// directory)
    pub database: Option<PathBuf>,
}

/// External tool locations. Bare names are looked up on `PATH`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Metadata rewrite tool
    pub ffmpeg: PathBuf,

    /// Fetch tool
    pub fetcher: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            fetcher: PathBuf::from("yt-dlp"),
        }
    }
}

/// Ingest settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Audio format the fetch tool extracts to
    pub audio_format: String,

    /// Output filename template, relative to the destination directory
    pub output_template: String,

    /// Whether the rescan after an ingest re-reads every file
    pub full_rescan: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            audio_format: "mp3".to_string(),
            output_template: "%(artist)s - %(title)s.%(ext)s".to_string(),
            full_rescan: false,
        }
    }
}

/// When albums left without songs are purged from the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Leave it to the next garbage-collection pass
    #[default]
    Deferred,
    /// Queue garbage collection as soon as the last song is deleted
    Immediate,
}

/// Mutation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    pub orphan_policy: OrphanPolicy,

    /// How many songs of an album edit are rewritten at once
    pub edit_concurrency: usize,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            orphan_policy: OrphanPolicy::Deferred,
            edit_concurrency: 4,
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("music-steward"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from the default location.
///
/// Returns default config if the file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };
    load_from(&path)
}

/// Load configuration from an explicit path, with the same fallbacks as
/// [`load`].
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to `path`, creating its directory if needed.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    // Serialize to pretty TOML
    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

/// Write a default config file to `path` (or the default location).
///
/// Refuses to replace an existing file unless `force` is set.
pub fn init(path: Option<&Path>, force: bool) -> crate::error::Result<PathBuf> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config_path().ok_or(ConfigError::NoConfigDir)?,
    };
    if path.exists() && !force {
        return Err(crate::error::Error::invalid(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    save_to(&Config::default(), &path)?;
    Ok(path)
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

impl From<ConfigError> for crate::error::Error {
    fn from(e: ConfigError) -> Self {
        crate::error::Error::config(e.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
