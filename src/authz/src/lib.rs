//! # KubeFleet Authorization
//!
//! Casbin-style policy enforcement for the fleet control plane.
//!
//! ## Features
//!
//! - **Model text** with request, policy, role, effect and matcher sections
//! - **Matchers** evaluated as CEL expressions, with `keyMatch`-style built-ins
//! - **ABAC** request parameters carried as `ABAC::{json}` tokens
//! - **Role graphs** with pattern-aware name and domain matching
//! - **Rule stores** backed by a CSV file, memory, PostgreSQL or MySQL
//! - **Registry** of independent enforcers addressed by integer handles
//!
//! ## Example
//!
//! ```rust,no_run
//! use kubefleet_authz::{EnforcementTuple, PolicyRegistry};
//!
//! #[tokio::main]
//! async fn main() -> kubefleet_authz::Result<()> {
//!     let registry = PolicyRegistry::from_env();
//!     let adapter = registry.create_adapter("file", "policy.csv", false).await?;
//!     let enforcer = registry.create_domain_enforcer(Some(adapter)).await?;
//!
//!     let tuple = EnforcementTuple::new("alice", "/v3/clusters/c1", "GET")
//!         .with_organization("acme");
//!     if registry.enforce_tuple(enforcer, &tuple).await? {
//!         println!("allowed");
//!     }
//!     Ok(())
//! }
//! ```

pub mod abac;
pub mod adapter;
pub mod cel;
pub mod config;
pub mod enforcer;
pub mod error;
pub mod management;
pub mod model;
pub mod rbac_api;
pub mod registry;
pub mod role_manager;
pub mod types;

pub use abac::{AttributeList, Param};
pub use adapter::{Adapter, Driver, FileAdapter, MemoryAdapter};
pub use config::ConnectionConfig;
pub use enforcer::Enforcer;
pub use error::{AuthzError, Result};
pub use model::{Effect, Model, DOMAIN_MODEL};
pub use registry::{PolicyRegistry, SharedEnforcer};
pub use role_manager::RoleManager;
pub use types::{AdapterHandle, EnforcementTuple, EnforcerHandle, PolicyRule, Rule};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
