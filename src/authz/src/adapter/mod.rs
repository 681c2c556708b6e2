//! Policy rule adapters
//!
//! An adapter persists rule rows for one enforcer. The backing store is
//! picked from a closed set of drivers:
//!
//! | Driver     | Adapter            | Notes                                   |
//! |------------|--------------------|-----------------------------------------|
//! | `file`     | [`FileAdapter`]    | CSV-like rows, persisted on save        |
//! | `postgres` | `SqlAdapter`       | `postgres` cargo feature                |
//! | `mysql`    | `SqlAdapter`       | `mysql` cargo feature                   |
//! | `mssql`    | none               | recognised, reported as unavailable     |

pub mod file;
pub mod memory;
#[cfg(feature = "sqlx")]
pub mod sql;

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{AuthzError, Result};
use crate::types::PolicyRule;

pub use file::FileAdapter;
pub use memory::MemoryAdapter;
#[cfg(feature = "sqlx")]
pub use sql::SqlAdapter;

/// Supported rule store drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    File,
    Mysql,
    Postgres,
    Mssql,
}

impl FromStr for Driver {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "file" => Ok(Self::File),
            "mysql" => Ok(Self::Mysql),
            "postgres" => Ok(Self::Postgres),
            "mssql" => Ok(Self::Mssql),
            other => Err(AuthzError::UnsupportedDriver(other.to_string())),
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::File => "file",
            Self::Mysql => "mysql",
            Self::Postgres => "postgres",
            Self::Mssql => "mssql",
        })
    }
}

/// Persistence capability for rule rows.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Every stored rule, in storage order.
    async fn load_rules(&self) -> Result<Vec<PolicyRule>>;

    /// Replace the stored rule set.
    async fn save_policy(&self, rules: &[PolicyRule]) -> Result<()>;

    async fn add_rule(&self, rule: &PolicyRule) -> Result<()>;

    async fn remove_rule(&self, rule: &PolicyRule) -> Result<()>;

    /// Remove rows of `ptype` matching the filter (empty values match anything).
    async fn remove_filtered(&self, ptype: &str, field_index: usize, values: &[String]) -> Result<()>;
}

/// Open an adapter for `driver`.
pub async fn open(driver: Driver, connection: &str, db_specified: bool) -> Result<Arc<dyn Adapter>> {
    match driver {
        Driver::File => Ok(Arc::new(FileAdapter::new(connection))),
        Driver::Mssql => Err(AuthzError::DriverUnavailable(driver.to_string())),
        #[cfg(feature = "postgres")]
        Driver::Postgres => Ok(Arc::new(SqlAdapter::connect(driver, connection, db_specified).await?)),
        #[cfg(feature = "mysql")]
        Driver::Mysql => Ok(Arc::new(SqlAdapter::connect(driver, connection, db_specified).await?)),
        #[allow(unreachable_patterns)]
        _ => {
            let _ = db_specified;
            Err(AuthzError::DriverUnavailable(driver.to_string()))
        }
    }
}
