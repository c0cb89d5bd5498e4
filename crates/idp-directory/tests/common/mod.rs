//! In-memory fake directory used by the integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use idp_directory::{
    BindOutcome, DirectoryConfig, DirectoryConnector, DirectoryError, DirectoryResult,
    DirectorySession, SearchEntry, SearchScope,
};

pub const SERVICE_DN: &str = "cn=service,dc=example,dc=com";
pub const SERVICE_PW: &str = "service-secret";
pub const ENDPOINT: &str = "ldaps://fake.example.com:636";

#[derive(Clone)]
struct FakeUser {
    uid: String,
    password: String,
}

/// Shared state behind every fake session.
pub struct FakeDirectory {
    users: Mutex<HashMap<String, FakeUser>>,
    /// Total sessions ever opened.
    pub opened: AtomicUsize,
    /// Sessions currently alive (not yet dropped).
    pub live: Arc<AtomicUsize>,
    fail_next_opens: AtomicUsize,
}

impl FakeDirectory {
    pub fn new() -> Arc<Self> {
        let dir = Arc::new(Self {
            users: Mutex::new(HashMap::new()),
            opened: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
            fail_next_opens: AtomicUsize::new(0),
        });
        dir.users.lock().insert(
            SERVICE_DN.to_string(),
            FakeUser {
                uid: "service".to_string(),
                password: SERVICE_PW.to_string(),
            },
        );
        dir
    }

    pub fn add_user(&self, uid: &str, password: &str) -> String {
        let dn = format!("uid={uid},ou=users,dc=example,dc=com");
        self.users.lock().insert(
            dn.clone(),
            FakeUser {
                uid: uid.to_string(),
                password: password.to_string(),
            },
        );
        dn
    }

    pub fn set_password(&self, dn: &str, password: &str) {
        if let Some(user) = self.users.lock().get_mut(dn) {
            user.password = password.to_string();
        }
    }

    /// Makes the next `n` connect attempts fail at the transport level.
    pub fn fail_opens(&self, n: usize) {
        self.fail_next_opens.store(n, Ordering::SeqCst);
    }

    pub fn opened_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// Connector producing sessions against a [`FakeDirectory`].
pub struct FakeConnector {
    pub dir: Arc<FakeDirectory>,
}

#[async_trait]
impl DirectoryConnector for FakeConnector {
    async fn open(
        &self,
        _endpoint: &str,
        _config: &DirectoryConfig,
    ) -> DirectoryResult<Box<dyn DirectorySession>> {
        let remaining = self.dir.fail_next_opens.load(Ordering::SeqCst);
        if remaining > 0 {
            self.dir.fail_next_opens.store(remaining - 1, Ordering::SeqCst);
            return Err(DirectoryError::Protocol(
                "simulated connect failure".to_string(),
            ));
        }
        self.dir.opened.fetch_add(1, Ordering::SeqCst);
        self.dir.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            dir: Arc::clone(&self.dir),
            live: Arc::clone(&self.dir.live),
            alive: true,
        }))
    }
}

struct FakeSession {
    dir: Arc<FakeDirectory>,
    live: Arc<AtomicUsize>,
    alive: bool,
}

#[async_trait]
impl DirectorySession for FakeSession {
    async fn bind(&mut self, dn: &str, secret: &str) -> DirectoryResult<BindOutcome> {
        let users = self.dir.users.lock();
        match users.get(dn) {
            Some(user) if user.password == secret => Ok(BindOutcome::Success),
            _ => Ok(BindOutcome::InvalidCredentials),
        }
    }

    async fn search(
        &mut self,
        _base: &str,
        _scope: SearchScope,
        filter: &str,
        _attrs: &[&str],
    ) -> DirectoryResult<Vec<SearchEntry>> {
        // Supports exactly the username filter shape built by
        // DirectoryConfig::user_by_username_filter.
        let uid = filter
            .split("(uid=")
            .nth(1)
            .and_then(|rest| rest.split(')').next())
            .ok_or_else(|| DirectoryError::Search(format!("unsupported filter: {filter}")))?;

        let users = self.dir.users.lock();
        Ok(users
            .iter()
            .filter(|(_, user)| user.uid == uid)
            .map(|(dn, user)| {
                let mut attrs = HashMap::new();
                attrs.insert("uid".to_string(), vec![user.uid.clone()]);
                SearchEntry {
                    dn: dn.clone(),
                    attrs,
                }
            })
            .collect())
    }

    async fn unbind(&mut self) -> DirectoryResult<()> {
        self.alive = false;
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Config tuned for fast tests.
pub fn test_config(pool_size: usize) -> DirectoryConfig {
    DirectoryConfig::builder()
        .url(ENDPOINT)
        .bind_dn(SERVICE_DN)
        .bind_credential(SERVICE_PW)
        .users_dn("ou=users,dc=example,dc=com")
        .pool_size(pool_size)
        .pool_retry_max(2)
        .pool_retry_delay(Duration::from_millis(10))
        .pool_connection_timeout(Duration::from_millis(200))
        .pool_connection_lifetime(Duration::from_secs(60))
        .build()
        .unwrap()
}
