//! Configuration file support
//!
//! Reads `civic.toml` from the current directory or the nearest parent, then
//! applies environment overrides (`PORT`, `CIVIC_DB_PATH`, `CIVIC_UPLOAD_DIR`,
//! `CIVIC_STATIC_DIR`). Command-line flags are applied last by the binary.

use crate::db::DEFAULT_DB_FILE;
use crate::upload::DEFAULT_MAX_UPLOAD_BYTES;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const CONFIG_FILE: &str = "civic.toml";

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub upload: UploadConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    /// Interface to bind. Default: "0.0.0.0"
    #[serde(default = "default_host")]
    pub host: String,

    /// Default: 3000
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Where things live on disk. Relative paths resolve against the working
/// directory.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Uploaded photos, served under /uploads
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Citizen portal and admin dashboard assets
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct UploadConfig {
    /// Largest accepted photo in bytes. Default: 5 MiB
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_database() -> PathBuf {
    PathBuf::from(DEFAULT_DB_FILE)
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_max_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            upload_dir: default_upload_dir(),
            static_dir: default_static_dir(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
        }
    }
}

impl Config {
    /// Load config from civic.toml plus environment overrides.
    /// Falls back to defaults if no file is found.
    pub fn load() -> Self {
        let mut config = Self::find_config_path()
            .and_then(|path| match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(config) => {
                        tracing::debug!(path = %path.display(), "loaded config");
                        Some(config)
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "ignoring invalid config file");
                        None
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "could not read config file");
                    None
                }
            })
            .unwrap_or_default();

        config.apply_env(std::env::vars());
        config
    }

    /// Find civic.toml by walking up directory tree
    fn find_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        let mut dir = current_dir.as_path();

        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return Some(config_path);
            }

            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
        None
    }

    /// Apply overrides from environment-style key/value pairs
    pub fn apply_env<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if value.trim().is_empty() {
                continue;
            }
            match key.as_str() {
                "PORT" => match value.trim().parse() {
                    Ok(port) => self.server.port = port,
                    Err(_) => tracing::warn!(%value, "ignoring invalid PORT"),
                },
                "CIVIC_DB_PATH" => self.storage.database = PathBuf::from(value),
                "CIVIC_UPLOAD_DIR" => self.storage.upload_dir = PathBuf::from(value),
                "CIVIC_STATIC_DIR" => self.storage.static_dir = PathBuf::from(value),
                _ => {}
            }
        }
    }
}
