//! Guard configuration

use crate::activation::Activation;
use crate::adapters::FetchBlockMode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use syar_policy::{parse_config, ConfigError, ConfigFormat, PolicyConfig, PolicyError};
use thiserror::Error;
use url::Url;

/// Guard errors
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Invalid base URL {url:?}: {source}")]
    InvalidBase {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Everything needed to build and activate a guard
///
/// ```toml
/// fetch_block_mode = "resolve"
/// base_url = "chrome-extension://syar/newtab.html"
///
/// [activation]
/// path_suffix = "/newtab.html"
///
/// [policy]
/// allow = ["sheets.googleapis.com"]
/// block_hosts = ["api.automa.site"]
/// block_patterns = ["https://www\\.googleapis\\.com/drive/v3/files"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub fetch_block_mode: FetchBlockMode,
    /// Base for relative targets when no location is supplied
    pub base_url: Option<String>,
    pub activation: Activation,
    pub policy: PolicyConfig,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            fetch_block_mode: FetchBlockMode::default(),
            base_url: None,
            activation: Activation::default(),
            policy: PolicyConfig::syar_default(),
        }
    }
}

impl GuardConfig {
    pub fn from_toml(content: &str) -> Result<Self, GuardError> {
        Ok(parse_config(content, ConfigFormat::Toml)?)
    }

    pub fn from_json(content: &str) -> Result<Self, GuardError> {
        Ok(parse_config(content, ConfigFormat::Json)?)
    }

    /// Load from a `.toml` or `.json` file
    pub fn from_file(path: &Path) -> Result<Self, GuardError> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(ConfigError::from)?;
        Ok(parse_config(&content, format)?)
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Parsed `base_url`, if any
    pub fn base(&self) -> Result<Option<Url>, GuardError> {
        self.base_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|source| GuardError::InvalidBase {
                    url: raw.to_string(),
                    source,
                })
            })
            .transpose()
    }
}
