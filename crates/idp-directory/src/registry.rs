//! Process-wide registry of directory pools.
//!
//! Pools are keyed by (endpoint, auth mode). The mode split keeps
//! administrative service-account connections and end-user
//! authentication connections in disjoint pools: a failed end-user bind
//! must never poison the admin pool, and exhausting one pool must never
//! block the other.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::DirectoryConfig;
use crate::connector::DirectoryConnector;
use crate::pool::DirectoryPool;

/// Which kind of credentials a pool's sessions bind with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Service-account connections for lookups and administration.
    Admin,
    /// Connections used to verify end-user credentials.
    EndUser,
}

impl AuthMode {
    /// Short label for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::EndUser => "end_user",
        }
    }
}

/// Composite pool identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    /// Directory endpoint URL.
    pub endpoint: String,
    /// Credential mode.
    pub mode: AuthMode,
}

/// Registry mapping [`PoolKey`] to its pool.
///
/// The registry is injected into callers rather than accessed as global
/// state; its full lifecycle is `new` / `get_pool` / `reset`.
pub struct PoolRegistry {
    config: Arc<DirectoryConfig>,
    connector: Arc<dyn DirectoryConnector>,
    pools: DashMap<PoolKey, Arc<DirectoryPool>>,
}

impl PoolRegistry {
    /// Creates a registry that sizes new pools from `config`.
    #[must_use]
    pub fn new(config: DirectoryConfig, connector: Arc<dyn DirectoryConnector>) -> Self {
        Self {
            config: Arc::new(config),
            connector,
            pools: DashMap::new(),
        }
    }

    /// Returns the pool for the configured endpoint in the given mode.
    #[must_use]
    pub fn get_pool(&self, mode: AuthMode) -> Arc<DirectoryPool> {
        self.get_pool_for(self.config.url.as_str(), mode)
    }

    /// Returns the pool for (endpoint, mode), creating it on first use.
    ///
    /// Construction happens under the map entry lock, so concurrent
    /// first accesses for the same key observe exactly one pool.
    /// Sizing parameters are read from the configuration once, here.
    #[must_use]
    pub fn get_pool_for(&self, endpoint: &str, mode: AuthMode) -> Arc<DirectoryPool> {
        let key = PoolKey {
            endpoint: endpoint.to_string(),
            mode,
        };
        self.pools
            .entry(key)
            .or_insert_with(|| {
                tracing::info!(endpoint, mode = mode.as_str(), "creating directory pool");
                Arc::new(DirectoryPool::new(
                    endpoint,
                    Arc::clone(&self.config),
                    Arc::clone(&self.connector),
                ))
            })
            .clone()
    }

    /// Closes all pools and discards them.
    ///
    /// Subsequent [`Self::get_pool`] calls rebuild pools from scratch,
    /// re-reading the configuration held by the registry.
    pub fn reset(&self) {
        for entry in self.pools.iter() {
            entry.value().clear();
        }
        self.pools.clear();
        tracing::info!("directory pool registry reset");
    }

    /// Number of pools currently registered.
    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Shared configuration the registry sizes pools from.
    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Connector used to open new sessions.
    pub(crate) fn connector(&self) -> Arc<dyn DirectoryConnector> {
        Arc::clone(&self.connector)
    }
}
