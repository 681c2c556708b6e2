//! Pipeline configuration
//!
//! | Variable | Default |
//! |----------|---------|
//! | `KRATOS_SCHEME` | `http` |
//! | `KRATOS_ADDR` | `localhost:4433` |
//! | `AUTH_TIMEOUT_SECS` | `10` |
//! | `AUTH_EXCLUDE_RPC_METHODS` | empty, comma-separated |
//! | `AUTH_EXCLUDE_AUTHZ_METHODS` | empty, comma-separated |
//! | `AUTH_EXCLUDE_URLS` | empty, comma-separated regular expressions |

use regex::Regex;
use std::time::Duration;
use tracing::debug;

use crate::error::{AuthError, Result};

pub const DEFAULT_KRATOS_SCHEME: &str = "http";
pub const DEFAULT_KRATOS_ADDR: &str = "localhost:4433";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Exclusion lists and limits applied by the pipeline and middleware.
#[derive(Debug, Clone)]
pub struct AuthOptions {
    /// Fully-qualified methods that skip authentication and authorization.
    pub exclude_rpc_methods: Vec<String>,
    /// Fully-qualified methods that are authenticated but never authorized.
    pub exclude_authz_methods: Vec<String>,
    /// URL path patterns the HTTP middleware passes through untouched.
    pub exclude_urls: Vec<Regex>,
    /// Bound on every identity-provider, key-store and policy call.
    pub timeout: Duration,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            exclude_rpc_methods: Vec::new(),
            exclude_authz_methods: Vec::new(),
            exclude_urls: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl AuthOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exclude_rpc_method(mut self, method: impl Into<String>) -> Self {
        self.exclude_rpc_methods.push(method.into());
        self
    }

    pub fn exclude_authz_method(mut self, method: impl Into<String>) -> Self {
        self.exclude_authz_methods.push(method.into());
        self
    }

    pub fn exclude_url(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| AuthError::InvalidRequest(format!("exclude url {pattern:?}: {e}")))?;
        self.exclude_urls.push(regex);
        Ok(self)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn skips_auth(&self, full_method: &str) -> bool {
        !full_method.is_empty() && self.exclude_rpc_methods.iter().any(|m| m == full_method)
    }

    pub fn skips_authz(&self, full_method: &str) -> bool {
        !full_method.is_empty() && self.exclude_authz_methods.iter().any(|m| m == full_method)
    }

    pub fn url_excluded(&self, path: &str) -> bool {
        self.exclude_urls.iter().any(|re| re.is_match(path))
    }
}

/// Full pipeline configuration: identity provider location plus options.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub kratos_scheme: String,
    pub kratos_addr: String,
    pub options: AuthOptions,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            kratos_scheme: DEFAULT_KRATOS_SCHEME.to_string(),
            kratos_addr: DEFAULT_KRATOS_ADDR.to_string(),
            options: AuthOptions::default(),
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source; unset or empty values take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let timeout = match get("AUTH_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| AuthError::InvalidRequest(format!("AUTH_TIMEOUT_SECS {raw:?}: {e}")))?,
            None => DEFAULT_TIMEOUT,
        };

        let mut options = AuthOptions::new().timeout(timeout);
        options.exclude_rpc_methods = split_list(get("AUTH_EXCLUDE_RPC_METHODS"));
        options.exclude_authz_methods = split_list(get("AUTH_EXCLUDE_AUTHZ_METHODS"));
        for pattern in split_list(get("AUTH_EXCLUDE_URLS")) {
            options = options.exclude_url(&pattern)?;
        }

        let config = Self {
            kratos_scheme: get("KRATOS_SCHEME").unwrap_or_else(|| DEFAULT_KRATOS_SCHEME.to_string()),
            kratos_addr: get("KRATOS_ADDR").unwrap_or_else(|| DEFAULT_KRATOS_ADDR.to_string()),
            options,
        };
        debug!(
            kratos = %config.kratos_url(),
            excluded_methods = config.options.exclude_rpc_methods.len(),
            excluded_authz = config.options.exclude_authz_methods.len(),
            "loaded auth config"
        );
        Ok(config)
    }

    pub fn kratos_url(&self) -> String {
        format!("{}://{}", self.kratos_scheme, self.kratos_addr)
    }
}

fn split_list(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}
