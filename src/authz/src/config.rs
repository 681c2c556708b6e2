//! Local connection configuration for the policy rule store
//!
//! The file is JSON with PascalCase keys:
//!
//! ```json
//! {"Driver": "postgres", "Connection": "postgres://$DB_USER:$DB_PASS@db/authz",
//!  "Enforcer": "config/model.conf", "DBSpecified": true}
//! ```

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::error::{AuthzError, Result};

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "CONNECTION_CONFIG_PATH";

/// Config file location when the environment variable is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config/connection_config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(rename = "Driver", default = "default_driver")]
    pub driver: String,
    #[serde(rename = "Connection", default)]
    pub connection: String,
    /// Path of the model file used when an enforcer is created without model text.
    #[serde(rename = "Enforcer", default)]
    pub enforcer: String,
    #[serde(rename = "DBSpecified", default)]
    pub db_specified: bool,
}

fn default_driver() -> String {
    "file".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            connection: String::new(),
            enforcer: String::new(),
            db_specified: false,
        }
    }
}

impl ConnectionConfig {
    /// Load from `CONNECTION_CONFIG_PATH` or the default location.
    ///
    /// A missing or unreadable file yields the default config.
    pub fn from_env() -> Self {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path, error = %e, "connection config unavailable, using defaults");
                Self::default()
            }
        }
    }

    /// Load and expand `$VAR` tokens in the connection string.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&contents)
            .map_err(|e| AuthzError::InvalidInput(format!("parse {}: {e}", path.display())))?;
        config.connection = expand_env(&config.connection);
        debug!(path = %path.display(), driver = %config.driver, "loaded connection config");
        Ok(config)
    }

    /// Model text from the configured enforcer file.
    pub fn read_model(&self) -> Result<String> {
        if self.enforcer.is_empty() {
            return Err(AuthzError::InvalidModel(
                "no model text given and no enforcer file configured".to_string(),
            ));
        }
        Ok(std::fs::read_to_string(PathBuf::from(&self.enforcer))?)
    }
}

/// Replace every `$NAME` with the value of environment variable `NAME`
/// (empty when unset).
pub fn expand_env(input: &str) -> String {
    static VAR: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = VAR.get_or_init(|| Regex::new(r"\$\b(\w*)\b").ok()) else {
        return input.to_string();
    };
    re.replace_all(input, |caps: &Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_default()
    })
    .into_owned()
}
