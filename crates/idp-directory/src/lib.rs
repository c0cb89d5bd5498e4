//! # idp-directory
//!
//! Bounded directory connection pooling for the identity service.
//!
//! The crate provides three layers:
//! - [`connector`]: capability traits over the directory protocol,
//!   with an `ldap3` production implementation.
//! - [`pool`] / [`registry`]: bounded per-(endpoint, mode) pools with
//!   scoped RAII leases, retry policy, and lifetime management.
//! - [`backend`]: the thin identity backend consuming the pools for
//!   authentication and lookup.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod backend;
pub mod config;
pub mod connector;
pub mod error;
pub mod pool;
pub mod registry;

pub use backend::DirectoryIdentityBackend;
pub use config::{DirectoryConfig, DirectoryConfigBuilder};
pub use connector::{
    BindOutcome, DirectoryConnector, DirectorySession, LdapConnector, SearchEntry, SearchScope,
};
pub use error::{DirectoryError, DirectoryResult};
pub use pool::{BindCredentials, DirectoryLease, DirectoryPool};
pub use registry::{AuthMode, PoolKey, PoolRegistry};
