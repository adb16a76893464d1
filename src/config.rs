//! Settings for the catalog tool
//!
//! Loaded from `settings.json` in the user's config directory when present:
//! - Linux: ~/.config/gauge-catalog/settings.json
//! - macOS: ~/Library/Application Support/gauge-catalog/settings.json
//! - Windows: %APPDATA%\gauge-catalog\settings.json
//!
//! Command-line flags and environment variables override individual fields.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::linefind::{LineFinder, DEFAULT_LINE_FINDER};

const APP_DIR: &str = "gauge-catalog";
const SETTINGS_FILE: &str = "settings.json";
const DATABASE_FILE: &str = "catalog.db";

/// Default limit for one line-finder run
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read settings file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Path to the line-finder executable
    pub line_finder_path: PathBuf,
    /// Catalog database file
    pub database_path: PathBuf,
    /// Seconds before a line-finder run is killed (0 = no limit)
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            line_finder_path: PathBuf::from(DEFAULT_LINE_FINDER),
            database_path: Self::default_db_path(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    /// Load settings.
    ///
    /// An explicit `path` must exist and parse. Without one, the per-user
    /// settings file is used if it exists, otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_settings_path() {
                Some(path) if path.is_file() => path,
                _ => {
                    debug!("no settings file, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let json = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        let settings = Self::from_json(&json).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;

        debug!(settings = %path.display(), "settings loaded");
        Ok(settings)
    }

    /// Parse from JSON string; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Get the path where the settings file is looked up
    pub fn default_settings_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push(APP_DIR);
        path.push(SETTINGS_FILE);
        Some(path)
    }

    /// Get the path where the catalog database should be stored
    pub fn default_db_path() -> PathBuf {
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        path.push(APP_DIR);
        path.push(DATABASE_FILE);
        path
    }

    /// Line-finder timeout, None when disabled
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Build a line-finder runner from these settings
    pub fn line_finder(&self) -> LineFinder {
        LineFinder::new(&self.line_finder_path).with_timeout(self.timeout())
    }
}
