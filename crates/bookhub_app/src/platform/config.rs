use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use bookhub_core::HarvestSettings;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_SOURCE_URL: &str = "https://read.amazon.co.jp/kindle-library";
pub const DEFAULT_DATA_DIR: &str = "bookhub-data";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Library listing the sync surfaces harvest.
    pub source_url: String,
    /// Where snapshots are written.
    pub data_dir: PathBuf,
    /// Volumes endpoint for metadata lookups; `None` keeps enrichment local.
    pub enrichment_endpoint: Option<String>,
    pub log_to_file: bool,
    pub harvest: HarvestSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            enrichment_endpoint: Some(bookhub_engine::DEFAULT_VOLUMES_ENDPOINT.to_string()),
            log_to_file: false,
            harvest: HarvestSettings::default(),
        }
    }
}

/// Where a loaded configuration came from. Reported once logging is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    File(PathBuf),
    Defaults(PathBuf),
}

impl fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigOrigin::File(path) => write!(f, "Loaded config from {:?}", path),
            ConfigOrigin::Defaults(path) => write!(f, "No config at {:?}; using defaults", path),
        }
    }
}

impl AppConfig {
    /// Reads `path`; a missing file yields the defaults. Nothing is logged
    /// here since logging is configured from the result.
    pub fn load(path: &Path) -> anyhow::Result<(Self, ConfigOrigin)> {
        let content = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Ok((Self::default(), ConfigOrigin::Defaults(path.to_path_buf())));
            }
            Err(err) => {
                return Err(err).with_context(|| format!("reading config {}", path.display()))
            }
        };
        let config: Self = ron::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok((config, ConfigOrigin::File(path.to_path_buf())))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::new())
            .context("serializing config")?;
        fs::write(path, content).with_context(|| format!("writing config {}", path.display()))
    }

    pub fn source_url(&self) -> anyhow::Result<Url> {
        Url::parse(&self.source_url)
            .with_context(|| format!("invalid source_url {:?}", self.source_url))
    }
}
