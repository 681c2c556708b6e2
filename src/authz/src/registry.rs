//! Handle-indexed registry of adapters and enforcers
//!
//! One process can host many independent enforcers (distinct models and
//! rule stores). Each is addressed by a dense integer handle assigned at
//! creation; handles live as long as the registry and are never reused.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

use crate::adapter::{self, Adapter, Driver};
use crate::config::ConnectionConfig;
use crate::enforcer::Enforcer;
use crate::error::{AuthzError, Result};
use crate::model::{glob_match, key_match_cu, Model, DOMAIN_MODEL};
use crate::types::{AdapterHandle, EnforcementTuple, EnforcerHandle};

/// An enforcer shared between concurrent requests.
///
/// Decisions and queries take the read lock; rule mutations take the write lock.
pub type SharedEnforcer = Arc<tokio::sync::RwLock<Enforcer>>;

pub struct PolicyRegistry {
    config: ConnectionConfig,
    adapters: RwLock<Vec<Arc<dyn Adapter>>>,
    enforcers: RwLock<Vec<SharedEnforcer>>,
}

impl PolicyRegistry {
    /// `config` supplies the driver, connection and model path used when a
    /// caller leaves them empty.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            adapters: RwLock::new(Vec::new()),
            enforcers: RwLock::new(Vec::new()),
        }
    }

    /// Registry whose fallback config comes from `CONNECTION_CONFIG_PATH`.
    pub fn from_env() -> Self {
        Self::new(ConnectionConfig::from_env())
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Open a rule store and register it.
    ///
    /// An empty `driver` or `connection` selects the local config instead.
    pub async fn create_adapter(&self, driver: &str, connection: &str, db_specified: bool) -> Result<AdapterHandle> {
        let adapter = self.open_adapter(driver, connection, db_specified).await?;
        let mut adapters = self.adapters.write();
        let handle = AdapterHandle(next_handle(adapters.len())?);
        adapters.push(adapter);
        info!(%handle, "created adapter");
        Ok(handle)
    }

    async fn open_adapter(&self, driver: &str, connection: &str, db_specified: bool) -> Result<Arc<dyn Adapter>> {
        let (driver, connection, db_specified) = if driver.is_empty() || connection.is_empty() {
            (
                self.config.driver.as_str(),
                self.config.connection.as_str(),
                self.config.db_specified,
            )
        } else {
            (driver, connection, db_specified)
        };
        let driver: Driver = driver.parse()?;
        adapter::open(driver, connection, db_specified).await
    }

    /// Parse `model_text` (or the configured model file when empty), bind it to
    /// the given adapter (or a fresh default one) and register the enforcer.
    pub async fn create_enforcer(&self, model_text: &str, adapter: Option<AdapterHandle>) -> Result<EnforcerHandle> {
        let enforcer = self.build_enforcer(model_text, adapter).await?;
        Ok(self.register(enforcer))
    }

    /// Enforcer for the fleet domain model with its name matching installed:
    /// `g` uses `keyMatchCu`, `g2` uses glob matching.
    pub async fn create_domain_enforcer(&self, adapter: Option<AdapterHandle>) -> Result<EnforcerHandle> {
        let mut enforcer = self.build_enforcer(DOMAIN_MODEL, adapter).await?;
        enforcer.add_named_matching_fn("g", key_match_cu)?;
        enforcer.add_named_matching_fn("g2", glob_match)?;
        Ok(self.register(enforcer))
    }

    async fn build_enforcer(&self, model_text: &str, adapter: Option<AdapterHandle>) -> Result<Enforcer> {
        let adapter = match adapter {
            Some(handle) => self.lookup_adapter(handle)?,
            None => self.open_adapter("", "", false).await?,
        };
        let model_text = if model_text.is_empty() {
            self.config.read_model()?
        } else {
            model_text.to_string()
        };
        let model = Model::from_text(&model_text)?;
        Enforcer::new(model, adapter).await
    }

    fn register(&self, enforcer: Enforcer) -> EnforcerHandle {
        let mut enforcers = self.enforcers.write();
        let handle = EnforcerHandle(enforcers.len() as i32);
        enforcers.push(Arc::new(tokio::sync::RwLock::new(enforcer)));
        info!(%handle, "created enforcer");
        handle
    }

    pub fn lookup(&self, handle: EnforcerHandle) -> Result<SharedEnforcer> {
        usize::try_from(handle.0)
            .ok()
            .and_then(|i| self.enforcers.read().get(i).cloned())
            .ok_or(AuthzError::EnforcerNotFound(handle.0))
    }

    pub fn lookup_adapter(&self, handle: AdapterHandle) -> Result<Arc<dyn Adapter>> {
        usize::try_from(handle.0)
            .ok()
            .and_then(|i| self.adapters.read().get(i).cloned())
            .ok_or(AuthzError::AdapterNotFound(handle.0))
    }

    pub fn enforcer_count(&self) -> usize {
        self.enforcers.read().len()
    }

    pub fn adapter_count(&self) -> usize {
        self.adapters.read().len()
    }

    /// Decide a request; parameters may be plain strings or ABAC tokens.
    pub async fn enforce<S: AsRef<str>>(&self, handle: EnforcerHandle, params: &[S]) -> Result<bool> {
        let enforcer = self.lookup(handle)?;
        let guard = enforcer.read().await;
        let allowed = guard.enforce(params)?;
        debug!(%handle, allowed, "enforce");
        Ok(allowed)
    }

    /// Decide a domain-model request.
    pub async fn enforce_tuple(&self, handle: EnforcerHandle, tuple: &EnforcementTuple) -> Result<bool> {
        self.enforce(handle, &tuple.to_params()).await
    }

    /// Reload the enforcer's rules from its adapter.
    pub async fn load_policy(&self, handle: EnforcerHandle) -> Result<()> {
        let enforcer = self.lookup(handle)?;
        let mut guard = enforcer.write().await;
        guard.load_policy().await
    }

    /// Persist the enforcer's rules through its adapter.
    pub async fn save_policy(&self, handle: EnforcerHandle) -> Result<()> {
        let enforcer = self.lookup(handle)?;
        let guard = enforcer.read().await;
        guard.save_policy().await
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new(ConnectionConfig::default())
    }
}

fn next_handle(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| AuthzError::InvalidInput("handle space exhausted".to_string()))
}
