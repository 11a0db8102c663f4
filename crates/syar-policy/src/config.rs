//! Policy Configuration
//!
//! Serde form of a policy, loadable from TOML or JSON. The built-in
//! [`PolicyConfig::syar_default`] carries the dashboard guard's rules.

use crate::policy::{Policy, PolicyError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext.to_ascii_lowercase().as_str() {
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Parse any config document in the given format
pub fn parse_config<T: DeserializeOwned>(content: &str, format: ConfigFormat) -> Result<T, ConfigError> {
    match format {
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string())),
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string())),
    }
}

/// A block pattern: either bare text or text with explicit case handling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternConfig {
    Plain(String),
    Detailed {
        pattern: String,
        #[serde(default)]
        case_sensitive: bool,
    },
}

impl PatternConfig {
    pub fn pattern(&self) -> &str {
        match self {
            Self::Plain(p) | Self::Detailed { pattern: p, .. } => p,
        }
    }

    pub fn case_sensitive(&self) -> bool {
        matches!(self, Self::Detailed { case_sensitive: true, .. })
    }
}

/// Literal policy data as supplied by the policy source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Hosts (and their subdomains) that are never blocked
    pub allow: Vec<String>,
    /// Hosts (and their subdomains) that are always blocked
    pub block_hosts: Vec<String>,
    /// URL patterns, tested in order
    pub block_patterns: Vec<PatternConfig>,
    /// URL substrings
    pub block_keywords: Vec<String>,
}

impl PolicyConfig {
    /// Rules of the dashboard network guard: Automa cloud/telemetry hosts
    /// and the Google Drive backup and OAuth endpoints. Sheets stays reachable.
    pub fn syar_default() -> Self {
        let block_hosts = [
            "automa.site",
            "www.automa.site",
            "api.automa.site",
            "automa.app",
            "www.automa.app",
            "api.automa.app",
            "automa-extension.vercel.app",
            "extension.automa.site",
            "docs.extension.automa.site",
            "blog.automa.site",
            "aipower.automa.site",
        ];

        let block_patterns = [
            r"https://www\.googleapis\.com/drive/v3/files",
            r"https://www\.googleapis\.com/upload/drive/v3/files",
            r"https://accounts\.google\.com/o/oauth2/v2/auth",
            r"https://oauth2\.googleapis\.com/token",
        ];

        Self {
            allow: vec!["sheets.googleapis.com".to_string()],
            block_hosts: block_hosts.iter().map(|h| h.to_string()).collect(),
            block_patterns: block_patterns
                .iter()
                .map(|p| PatternConfig::Plain(p.to_string()))
                .collect(),
            block_keywords: Vec::new(),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        parse_config(content, ConfigFormat::Toml)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        parse_config(content, ConfigFormat::Json)
    }

    /// Load from a `.toml` or `.json` file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        parse_config(&content, format)
    }

    /// Compile into an immutable policy
    pub fn build(&self) -> Result<Policy, PolicyError> {
        self.block_patterns
            .iter()
            .fold(
                Policy::builder()
                    .allow_all(self.allow.iter().cloned())
                    .block_hosts(self.block_hosts.iter().cloned())
                    .block_keywords(self.block_keywords.iter().cloned()),
                |builder, p| builder.block_pattern_with_case(p.pattern(), p.case_sensitive()),
            )
            .build()
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}
