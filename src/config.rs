//! Workload configuration
//!
//! Settings come from an optional TOML file and are overridden by CLI flags.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use logsink_types::Tags;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {message}")]
    Parse { message: String },

    #[error("invalid tag '{0}', expected KEY=VALUE")]
    InvalidTag(String),
}

/// Identity and output settings for one captured workload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Workload guid; empty disables log shipping
    #[serde(default)]
    pub guid: String,

    /// Source name; empty falls back to the default source
    #[serde(default)]
    pub source: String,

    #[serde(default)]
    pub index: i32,

    /// File to append JSON lines to (stdout when unset)
    #[serde(default)]
    pub output: Option<PathBuf>,

    #[serde(default)]
    pub tags: Tags,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    /// Apply CLI overrides; tags are merged over file tags
    pub fn merge(mut self, overrides: Overrides) -> Self {
        if let Some(guid) = overrides.guid {
            self.guid = guid;
        }
        if let Some(source) = overrides.source {
            self.source = source;
        }
        if let Some(index) = overrides.index {
            self.index = index;
        }
        if overrides.output.is_some() {
            self.output = overrides.output;
        }
        self.tags.extend(overrides.tags);
        self
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub guid: Option<String>,
    pub source: Option<String>,
    pub index: Option<i32>,
    pub output: Option<PathBuf>,
    pub tags: Tags,
}

/// Parse a `KEY=VALUE` tag argument
pub fn parse_tag(arg: &str) -> Result<(String, String), ConfigError> {
    match arg.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(ConfigError::InvalidTag(arg.to_string())),
    }
}
