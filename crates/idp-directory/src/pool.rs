//! Bounded directory connection pool.
//!
//! A pool owns every idle session for one (endpoint, mode) pair and
//! bounds the total number of live sessions. Admission is controlled by
//! a semaphore sized at construction; a lease holds its permit until the
//! session has been returned to the idle list or destroyed, so
//! `leased + idle <= size` holds at every instant.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use crate::config::DirectoryConfig;
use crate::connector::{
    BindOutcome, DirectoryConnector, DirectorySession, SearchEntry, SearchScope,
};
use crate::error::{DirectoryError, DirectoryResult};

/// Identity a session is bound as.
#[derive(Clone, PartialEq, Eq)]
pub struct BindCredentials {
    /// Distinguished name to bind with.
    pub dn: String,
    /// Password for the bind.
    pub secret: String,
}

impl BindCredentials {
    /// Creates bind credentials.
    #[must_use]
    pub fn new(dn: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for BindCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindCredentials")
            .field("dn", &self.dn)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Sizing and retry parameters, fixed per pool at creation.
#[derive(Debug, Clone)]
pub(crate) struct PoolSettings {
    pub size: usize,
    pub retry_max: u32,
    pub retry_delay: Duration,
    pub acquire_timeout: Duration,
    pub max_lifetime: Duration,
}

impl PoolSettings {
    pub(crate) fn from_config(config: &DirectoryConfig) -> Self {
        Self {
            size: config.pool_size,
            retry_max: config.pool_retry_max,
            retry_delay: config.pool_retry_delay,
            acquire_timeout: config.pool_connection_timeout,
            max_lifetime: config.pool_connection_lifetime,
        }
    }
}

/// A directory session owned by a pool or leased to one caller.
pub(crate) struct PooledSession {
    id: Uuid,
    session: Box<dyn DirectorySession>,
    bound: BindCredentials,
    alive: bool,
    created_at: Instant,
}

impl PooledSession {
    fn new(session: Box<dyn DirectorySession>, bound: BindCredentials) -> Self {
        Self {
            id: Uuid::new_v4(),
            session,
            bound,
            alive: true,
            created_at: Instant::now(),
        }
    }

    fn expired(&self, max_lifetime: Duration) -> bool {
        self.created_at.elapsed() >= max_lifetime
    }

    /// Closes the transport in the background and drops the session.
    fn destroy(mut self) {
        tracing::debug!(session_id = %self.id, "destroying directory session");
        self.alive = false;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let mut session = self.session;
            handle.spawn(async move {
                let _ = session.unbind().await;
            });
        }
    }
}

/// Bounded pool of directory sessions for one (endpoint, mode) pair.
pub struct DirectoryPool {
    endpoint: String,
    settings: PoolSettings,
    config: Arc<DirectoryConfig>,
    connector: Arc<dyn DirectoryConnector>,
    semaphore: Arc<Semaphore>,
    idle: Arc<Mutex<Vec<PooledSession>>>,
}

impl DirectoryPool {
    /// Creates a pool for `endpoint`, reading sizing from `config` once.
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        config: Arc<DirectoryConfig>,
        connector: Arc<dyn DirectoryConnector>,
    ) -> Self {
        let settings = PoolSettings::from_config(&config);
        tracing::debug!(
            size = settings.size,
            retry_max = settings.retry_max,
            "creating directory pool"
        );
        Self {
            endpoint: endpoint.into(),
            semaphore: Arc::new(Semaphore::new(settings.size)),
            settings,
            config,
            connector,
            idle: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Acquires a leased session bound as `bind`, waiting up to the
    /// configured acquire timeout for a free slot.
    ///
    /// ## Errors
    ///
    /// - [`DirectoryError::CapacityExhausted`] when the pool stays full
    ///   past the wait window.
    /// - [`DirectoryError::ConnectFailure`] when a fresh connection
    ///   cannot be established within the retry policy.
    /// - [`DirectoryError::InvalidCredentials`] when the server rejects
    ///   the bind; never retried.
    pub async fn acquire(&self, bind: &BindCredentials) -> DirectoryResult<DirectoryLease> {
        self.acquire_timeout(bind, self.settings.acquire_timeout).await
    }

    /// Acquires with an explicit wait window instead of the configured one.
    pub async fn acquire_timeout(
        &self,
        bind: &BindCredentials,
        wait: Duration,
    ) -> DirectoryResult<DirectoryLease> {
        let permit = tokio::time::timeout(wait, Arc::clone(&self.semaphore).acquire_owned())
            .await
            .map_err(|_| DirectoryError::CapacityExhausted {
                endpoint: self.endpoint.clone(),
                waited_ms: wait.as_millis() as u64,
            })?
            .map_err(|_| DirectoryError::Internal("pool semaphore closed".to_string()))?;

        // Under the permit: reuse an idle session or open a fresh one.
        if let Some(session) = self.checkout_idle(bind).await? {
            return Ok(self.lease(session, permit));
        }

        let session = open_session(
            self.connector.as_ref(),
            &self.endpoint,
            &self.config,
            &self.settings,
            bind,
        )
        .await?;
        Ok(self.lease(session, permit))
    }

    /// Pops idle sessions until one is healthy and freshly bound.
    ///
    /// Sessions past their lifetime or with a cleared liveness flag are
    /// destroyed. A surviving session is always rebound before being
    /// handed out, so a credential change in the directory invalidates
    /// pooled sessions eagerly; a rebind rejection destroys the session
    /// and surfaces immediately.
    async fn checkout_idle(
        &self,
        bind: &BindCredentials,
    ) -> DirectoryResult<Option<PooledSession>> {
        loop {
            let candidate = self.idle.lock().pop();
            let Some(mut session) = candidate else {
                return Ok(None);
            };

            if !session.alive
                || !session.session.is_alive()
                || session.expired(self.settings.max_lifetime)
            {
                session.destroy();
                continue;
            }

            match session.session.bind(&bind.dn, &bind.secret).await {
                Ok(BindOutcome::Success) => session.bound = bind.clone(),
                Ok(BindOutcome::InvalidCredentials) => {
                    session.destroy();
                    return Err(DirectoryError::InvalidCredentials);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "idle session failed rebind; discarding");
                    session.destroy();
                    continue;
                }
            }

            return Ok(Some(session));
        }
    }

    fn lease(&self, session: PooledSession, permit: OwnedSemaphorePermit) -> DirectoryLease {
        DirectoryLease {
            session: Some(session),
            idle: Some(Arc::clone(&self.idle)),
            max_lifetime: self.settings.max_lifetime,
            _permit: Some(permit),
        }
    }

    /// Destroys every idle session (administrative reset).
    ///
    /// Leased sessions are unaffected; they are destroyed on release if
    /// their lifetime has elapsed by then.
    pub fn clear(&self) {
        let drained: Vec<PooledSession> = {
            let mut idle = self.idle.lock();
            idle.drain(..).collect()
        };
        let count = drained.len();
        for session in drained {
            session.destroy();
        }
        tracing::debug!(endpoint = %self.endpoint, count, "cleared directory pool");
    }

    /// Configured maximum size.
    #[must_use]
    pub fn size(&self) -> usize {
        self.settings.size
    }

    /// Number of idle sessions currently held by the pool.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Number of sessions currently leased out.
    #[must_use]
    pub fn leased_count(&self) -> usize {
        self.settings.size - self.semaphore.available_permits()
    }

    /// Endpoint this pool serves.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Opens and binds a fresh session, retrying transport failures.
///
/// Retries are internal: callers only observe added latency, then a
/// single [`DirectoryError::ConnectFailure`] if the policy is exhausted.
pub(crate) async fn open_session(
    connector: &dyn DirectoryConnector,
    endpoint: &str,
    config: &DirectoryConfig,
    settings: &PoolSettings,
    bind: &BindCredentials,
) -> DirectoryResult<PooledSession> {
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        match try_open(connector, endpoint, config, bind).await {
            Ok(session) => {
                tracing::debug!(endpoint, attempts, "opened directory session");
                return Ok(session);
            }
            Err(e @ DirectoryError::InvalidCredentials) => return Err(e),
            Err(e) if attempts <= settings.retry_max => {
                tracing::warn!(endpoint, attempts, error = %e, "directory connect failed; retrying");
                tokio::time::sleep(settings.retry_delay).await;
            }
            Err(e) => {
                return Err(DirectoryError::ConnectFailure {
                    endpoint: endpoint.to_string(),
                    attempts,
                    reason: e.to_string(),
                });
            }
        }
    }
}

async fn try_open(
    connector: &dyn DirectoryConnector,
    endpoint: &str,
    config: &DirectoryConfig,
    bind: &BindCredentials,
) -> DirectoryResult<PooledSession> {
    let mut session = connector.open(endpoint, config).await?;
    match session.bind(&bind.dn, &bind.secret).await? {
        BindOutcome::Success => Ok(PooledSession::new(session, bind.clone())),
        BindOutcome::InvalidCredentials => Err(DirectoryError::InvalidCredentials),
    }
}

/// Scoped, exclusive ownership of a pooled session.
///
/// Dropping the lease returns the session to the pool, or destroys it if
/// it is broken or past its lifetime. The admission permit is released
/// only after the session has been handed back, so the pool size
/// invariant cannot be violated by a release/acquire race.
pub struct DirectoryLease {
    session: Option<PooledSession>,
    /// `None` for dedicated (unpooled) leases, which always destroy on drop.
    idle: Option<Arc<Mutex<Vec<PooledSession>>>>,
    max_lifetime: Duration,
    _permit: Option<OwnedSemaphorePermit>,
}

impl std::fmt::Debug for DirectoryLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryLease")
            .field("pooled", &self.idle.is_some())
            .field("max_lifetime", &self.max_lifetime)
            .finish_non_exhaustive()
    }
}

impl DirectoryLease {
    /// Wraps a session that is not owned by any pool.
    ///
    /// Used when pooling is disabled for a mode; the session is
    /// destroyed on drop instead of being recycled.
    pub(crate) fn dedicated(session: PooledSession) -> Self {
        Self {
            session: Some(session),
            idle: None,
            max_lifetime: Duration::ZERO,
            _permit: None,
        }
    }

    fn session_mut(&mut self) -> DirectoryResult<&mut PooledSession> {
        self.session
            .as_mut()
            .ok_or_else(|| DirectoryError::Internal("lease already discarded".to_string()))
    }

    /// Identity the session is currently bound as.
    #[must_use]
    pub fn bound_dn(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.bound.dn.as_str())
    }

    /// Performs a search on the leased session.
    ///
    /// A transport failure clears the liveness flag so the session is
    /// destroyed on release rather than recycled.
    pub async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attrs: &[&str],
    ) -> DirectoryResult<Vec<SearchEntry>> {
        let session = self.session_mut()?;
        match session.session.search(base, scope, filter, attrs).await {
            Ok(entries) => Ok(entries),
            Err(e) => {
                session.alive = false;
                Err(e)
            }
        }
    }

    /// Rebinds the leased session as another identity.
    ///
    /// On success the recorded bound identity is updated so the session
    /// can be recycled for that identity. A transport failure marks the
    /// session broken.
    pub async fn rebind(&mut self, bind: &BindCredentials) -> DirectoryResult<BindOutcome> {
        let session = self.session_mut()?;
        match session.session.bind(&bind.dn, &bind.secret).await {
            Ok(BindOutcome::Success) => {
                session.bound = bind.clone();
                Ok(BindOutcome::Success)
            }
            Ok(BindOutcome::InvalidCredentials) => Ok(BindOutcome::InvalidCredentials),
            Err(e) => {
                session.alive = false;
                Err(e)
            }
        }
    }

    /// Marks the session broken so it is destroyed on release.
    pub fn mark_broken(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.alive = false;
        }
    }

    /// Unbinds gracefully and destroys the session without recycling.
    pub async fn discard(mut self) {
        if let Some(mut session) = self.session.take() {
            let _ = session.session.unbind().await;
        }
    }
}

impl Drop for DirectoryLease {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            let recyclable = self.idle.is_some()
                && session.alive
                && session.session.is_alive()
                && !session.expired(self.max_lifetime);
            if recyclable {
                if let Some(idle) = &self.idle {
                    idle.lock().push(session);
                }
            } else {
                session.destroy();
            }
        }
        // The permit field drops after this body, releasing capacity only
        // once the session is back in the idle list or gone.
    }
}
