//! Collaborator traits the pipeline depends on
//!
//! The identity provider, group lookup, API-key store and policy decision
//! point are all injected, so the pipeline can run against Kratos and the
//! policy engine in production and against in-memory fakes in tests.

use async_trait::async_trait;
use kubefleet_authz::{EnforcementTuple, EnforcerHandle, PolicyRegistry};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;

/// Identity behind an active session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub organization: Option<String>,
    pub partner: Option<String>,
}

/// Result of exchanging a session token or cookie with the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLookup {
    Active(Identity),
    /// The provider knows the session but it is no longer active.
    Inactive,
    /// No or invalid credentials.
    Unauthenticated,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn validate_session(&self, token: &str, cookie: &str) -> Result<SessionLookup>;
}

#[async_trait]
pub trait GroupLookup: Send + Sync {
    async fn groups_for_identity(&self, identity_id: &str) -> Result<Vec<String>>;
}

/// A stored API key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiKey {
    pub id: String,
    /// Name of the owning user; becomes the session username.
    pub name: String,
    pub secret: String,
    pub account: String,
    pub organization: String,
    pub partner: String,
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    /// `Ok(None)` when no key has this id.
    async fn get_key_by_id(&self, id: &str) -> Result<Option<ApiKey>>;
}

/// Policy decision point used by the authorize stage.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn enforce(&self, tuple: &EnforcementTuple) -> Result<bool>;
}

/// Authorizer backed by an enforcer in a [`PolicyRegistry`].
pub struct RegistryAuthorizer {
    registry: Arc<PolicyRegistry>,
    handle: EnforcerHandle,
}

impl RegistryAuthorizer {
    pub fn new(registry: Arc<PolicyRegistry>, handle: EnforcerHandle) -> Self {
        Self { registry, handle }
    }
}

#[async_trait]
impl Authorizer for RegistryAuthorizer {
    async fn enforce(&self, tuple: &EnforcementTuple) -> Result<bool> {
        Ok(self.registry.enforce_tuple(self.handle, tuple).await?)
    }
}

/// Identity provider holding a fixed token table.
#[derive(Default)]
pub struct StaticIdentityProvider {
    sessions: RwLock<HashMap<String, Option<Identity>>>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(self, token: impl Into<String>, identity: Identity) -> Self {
        self.sessions.write().insert(token.into(), Some(identity));
        self
    }

    /// A known but expired session.
    pub fn with_inactive_session(self, token: impl Into<String>) -> Self {
        self.sessions.write().insert(token.into(), None);
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn validate_session(&self, token: &str, _cookie: &str) -> Result<SessionLookup> {
        Ok(match self.sessions.read().get(token) {
            Some(Some(identity)) => SessionLookup::Active(identity.clone()),
            Some(None) => SessionLookup::Inactive,
            None => SessionLookup::Unauthenticated,
        })
    }
}

/// Group memberships keyed by identity id.
#[derive(Default)]
pub struct StaticGroups {
    groups: RwLock<HashMap<String, Vec<String>>>,
}

impl StaticGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_groups<I, S>(self, identity_id: impl Into<String>, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .write()
            .insert(identity_id.into(), groups.into_iter().map(Into::into).collect());
        self
    }
}

#[async_trait]
impl GroupLookup for StaticGroups {
    async fn groups_for_identity(&self, identity_id: &str) -> Result<Vec<String>> {
        Ok(self.groups.read().get(identity_id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MemoryApiKeyStore {
    keys: RwLock<HashMap<String, ApiKey>>,
}

impl MemoryApiKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: ApiKey) {
        self.keys.write().insert(key.id.clone(), key);
    }

    pub fn revoke(&self, id: &str) -> bool {
        self.keys.write().remove(id).is_some()
    }
}

#[async_trait]
impl ApiKeyStore for MemoryApiKeyStore {
    async fn get_key_by_id(&self, id: &str) -> Result<Option<ApiKey>> {
        Ok(self.keys.read().get(id).cloned())
    }
}
