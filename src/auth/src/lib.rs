//! Request authentication and authorization for fleet APIs
//!
//! Every inbound call is authenticated with either an API key or an identity
//! provider session, then authorized against the domain policy model.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kubefleet_auth::{
//!     AuthConfig, AuthContext, KratosIdentityProvider, MemoryApiKeyStore, RegistryAuthorizer,
//!     StaticGroups,
//! };
//! use kubefleet_authz::PolicyRegistry;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::from_env()?;
//! let registry = Arc::new(PolicyRegistry::from_env());
//! let enforcer = registry.create_domain_enforcer(None).await?;
//!
//! let auth = AuthContext::new(
//!     Arc::new(KratosIdentityProvider::from_config(&config)),
//!     Arc::new(StaticGroups::new()),
//!     Arc::new(MemoryApiKeyStore::new()),
//!     Arc::new(RegistryAuthorizer::new(registry, enforcer)),
//!     config.options,
//! );
//! # let _ = auth;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod kratos;
pub mod middleware;
pub mod pipeline;
pub mod provider;
pub mod service;
pub mod types;

pub use config::{AuthConfig, AuthOptions};
pub use error::{AuthError, Result};
pub use kratos::KratosIdentityProvider;
pub use middleware::{require_auth, AuthState};
pub use pipeline::{AuthContext, Decision, PipelineState};
pub use provider::{
    ApiKey, ApiKeyStore, Authorizer, GroupLookup, Identity, IdentityProvider, MemoryApiKeyStore,
    RegistryAuthorizer, SessionLookup, StaticGroups, StaticIdentityProvider,
};
pub use service::{routes, AuthService, RemoteAuthService};
pub use types::{ClientInfo, IsRequestAllowedRequest, IsRequestAllowedResponse, RequestStatus, SessionData};
