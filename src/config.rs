//! Server configuration.

use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::name::DateMode;

/// Configuration for one fileserver instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host directory holding the `Passwords` file and the disc trees.
    pub root: PathBuf,
    /// Network number this server answers as.
    pub network: u8,
    /// Station number this server answers as.
    pub station: u8,
    /// Use the extended seven-bit year packing in dates.
    pub extended_dates: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { root: PathBuf::from("."), network: 0, station: 254, extended_dates: false }
    }
}

impl ServerConfig {
    /// Configuration rooted at `root` with defaults for everything else.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), ..Self::default() }
    }

    /// Loads configuration from a TOML file.
    pub async fn from_file(path: &Path) -> io::Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        toml::from_str(&text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// The date packing mode implied by the configuration.
    pub fn date_mode(&self) -> DateMode {
        if self.extended_dates {
            DateMode::Extended
        } else {
            DateMode::Standard
        }
    }
}
