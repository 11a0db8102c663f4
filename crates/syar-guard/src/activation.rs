//! Activation predicate
//!
//! The guard is only installed when the host runs at a matching location.

use crate::config::{GuardConfig, GuardError};
use crate::installer::NetworkGuard;
use serde::{Deserialize, Serialize};
use syar_network::Bindings;
use tracing::debug;
use url::Url;

/// Install only when the location's path ends with `path_suffix`
/// (ASCII case-insensitive). An empty suffix matches everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Activation {
    pub path_suffix: String,
}

impl Default for Activation {
    fn default() -> Self {
        Self {
            path_suffix: "/newtab.html".to_string(),
        }
    }
}

impl Activation {
    pub fn always() -> Self {
        Self {
            path_suffix: String::new(),
        }
    }

    pub fn with_suffix(suffix: impl Into<String>) -> Self {
        Self {
            path_suffix: suffix.into(),
        }
    }

    pub fn matches(&self, location: &Url) -> bool {
        let path = location.path().as_bytes();
        let suffix = self.path_suffix.as_bytes();
        path.len() >= suffix.len() && path[path.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
    }
}

/// Build a guard for `location` and install it into `bindings` if the
/// configured activation predicate accepts the location.
///
/// Relative targets are resolved against `location`. Returns the installed
/// guard, or `None` when the location does not match.
pub fn activate(config: &GuardConfig, location: &Url, bindings: &Bindings) -> Result<Option<NetworkGuard>, GuardError> {
    if !config.activation.matches(location) {
        debug!("Guard not activated at {}", location);
        return Ok(None);
    }

    let guard = NetworkGuard::from_config(config, Some(location))?;
    guard.install(bindings);
    Ok(Some(guard))
}
