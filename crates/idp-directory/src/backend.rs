//! Directory identity backend.
//!
//! Thin consumer of the pool registry: resolves usernames through the
//! admin pool and verifies end-user credentials through the end-user
//! pool. Schema mapping beyond the username attribute is out of scope.

use std::sync::Arc;

use crate::config::DirectoryConfig;
use crate::connector::{BindOutcome, SearchEntry, SearchScope};
use crate::error::{DirectoryError, DirectoryResult};
use crate::pool::{open_session, BindCredentials, DirectoryLease, PoolSettings};
use crate::registry::{AuthMode, PoolRegistry};

/// Attributes fetched for user entries.
const USER_ATTRS: &[&str] = &["*"];

/// Authenticates and looks up users against a directory endpoint.
pub struct DirectoryIdentityBackend {
    registry: Arc<PoolRegistry>,
}

impl DirectoryIdentityBackend {
    /// Creates a backend over an existing registry.
    #[must_use]
    pub fn new(registry: Arc<PoolRegistry>) -> Self {
        Self { registry }
    }

    fn config(&self) -> &DirectoryConfig {
        self.registry.config()
    }

    /// Whether the given mode uses pooled connections.
    fn pooled(&self, mode: AuthMode) -> bool {
        let config = self.config();
        match mode {
            AuthMode::Admin => config.use_pool,
            // The auth pool flag only matters when pooling is on at all.
            AuthMode::EndUser => config.use_pool && config.use_auth_pool,
        }
    }

    /// Acquires a scoped directory connection in the given mode.
    ///
    /// `bind` defaults to the configured service account. When pooling
    /// is disabled for the mode, a dedicated session is opened instead
    /// and destroyed when the lease drops.
    pub async fn acquire_connection(
        &self,
        mode: AuthMode,
        bind: Option<&BindCredentials>,
    ) -> DirectoryResult<DirectoryLease> {
        let config = self.config();
        let service_bind;
        let bind = match bind {
            Some(b) => b,
            None => {
                service_bind =
                    BindCredentials::new(&config.bind_dn, &config.bind_credential);
                &service_bind
            }
        };

        if self.pooled(mode) {
            self.registry.get_pool(mode).acquire(bind).await
        } else {
            let settings = PoolSettings::from_config(config);
            let session = open_session(
                self.registry.connector().as_ref(),
                &config.url,
                config,
                &settings,
                bind,
            )
            .await?;
            Ok(DirectoryLease::dedicated(session))
        }
    }

    /// Looks up a user entry by username through the admin pool.
    pub async fn get_user(&self, username: &str) -> DirectoryResult<Option<SearchEntry>> {
        let config = self.config();
        let filter = config.user_by_username_filter(username);
        let mut lease = self.acquire_connection(AuthMode::Admin, None).await?;
        let mut entries = lease
            .search(&config.users_dn, SearchScope::Subtree, &filter, USER_ATTRS)
            .await?;
        if entries.len() > 1 {
            return Err(DirectoryError::search(format!(
                "username lookup matched {} entries",
                entries.len()
            )));
        }
        Ok(entries.pop())
    }

    /// Verifies a username/password pair.
    ///
    /// The user's DN is resolved through the admin pool, then the
    /// password is checked with a bind on an end-user-pool lease.
    ///
    /// ## Errors
    ///
    /// - [`DirectoryError::UserNotFound`] when the username does not
    ///   resolve to an entry.
    /// - [`DirectoryError::InvalidCredentials`] when the password is
    ///   rejected.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> DirectoryResult<SearchEntry> {
        let entry = self
            .get_user(username)
            .await?
            .ok_or_else(|| DirectoryError::UserNotFound(username.to_string()))?;

        let user_bind = BindCredentials::new(&entry.dn, password);
        match self
            .acquire_connection(AuthMode::EndUser, Some(&user_bind))
            .await
        {
            Ok(lease) => {
                // Pool acquire already bound as the user; nothing else to
                // verify. Dropping the lease recycles the session within
                // the end-user pool only.
                drop(lease);
                tracing::debug!(username, "directory authentication succeeded");
                Ok(entry)
            }
            Err(DirectoryError::InvalidCredentials) => {
                tracing::debug!(username, "directory authentication rejected");
                Err(DirectoryError::InvalidCredentials)
            }
            Err(e) => Err(e),
        }
    }

    /// Verifies a password on an already-leased end-user session.
    ///
    /// Exposed for callers that batch several checks over one lease.
    pub async fn check_password(
        lease: &mut DirectoryLease,
        dn: &str,
        password: &str,
    ) -> DirectoryResult<bool> {
        let outcome = lease
            .rebind(&BindCredentials::new(dn, password))
            .await?;
        Ok(outcome == BindOutcome::Success)
    }
}
