use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ConfigError, Error, Result};

fn default_max_segment_size() -> u64 {
    64 * 1024 * 1024
}

/// `{ blockfilesDir, dbPath, maxSegmentSize }` from spec.md §6.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub blockfiles_dir: PathBuf,
    pub db_path: PathBuf,
    pub max_segment_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            blockfiles_dir: PathBuf::from("blockfiles"),
            db_path: PathBuf::from("index"),
            max_segment_size: default_max_segment_size(),
        }
    }
}

impl Config {
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let load = || -> std::result::Result<Config, ConfigError> {
            let text = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&text)?)
        };
        load().map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }
}
