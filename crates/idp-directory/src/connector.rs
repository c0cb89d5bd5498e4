//! Directory protocol capability seam.
//!
//! The pool never talks to `ldap3` directly; it consumes the
//! [`DirectoryConnector`] / [`DirectorySession`] traits so that tests can
//! substitute an in-memory directory and the protocol library stays
//! swappable.

use std::collections::HashMap;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings};
use serde::{Deserialize, Serialize};

use crate::config::DirectoryConfig;
use crate::error::{DirectoryError, DirectoryResult};

/// LDAP result code for invalid credentials (RFC 4511).
const RC_INVALID_CREDENTIALS: u32 = 49;

/// Outcome of a bind attempt.
///
/// A rejected credential is a result, not a transport error: the
/// connection stays usable and the pool must not retry the bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// The server accepted the credentials.
    Success,
    /// The server rejected the DN/password pair.
    InvalidCredentials,
}

/// Search scope relative to the base DN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchScope {
    /// Search only the base DN.
    Base,
    /// Search one level below the base DN.
    OneLevel,
    /// Search the entire subtree.
    #[default]
    Subtree,
}

impl SearchScope {
    fn to_ldap3(self) -> ldap3::Scope {
        match self {
            Self::Base => ldap3::Scope::Base,
            Self::OneLevel => ldap3::Scope::OneLevel,
            Self::Subtree => ldap3::Scope::Subtree,
        }
    }
}

/// A single directory entry returned by a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// String-valued attributes.
    pub attrs: HashMap<String, Vec<String>>,
}

impl SearchEntry {
    /// Returns the first value of an attribute, if present.
    #[must_use]
    pub fn first(&self, attr: &str) -> Option<&str> {
        self.attrs.get(attr).and_then(|v| v.first()).map(String::as_str)
    }
}

/// A live session with a directory endpoint.
#[async_trait]
pub trait DirectorySession: Send {
    /// Rebinds the session as the given identity.
    async fn bind(&mut self, dn: &str, secret: &str) -> DirectoryResult<BindOutcome>;

    /// Performs a search under `base`.
    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attrs: &[&str],
    ) -> DirectoryResult<Vec<SearchEntry>>;

    /// Gracefully closes the session.
    async fn unbind(&mut self) -> DirectoryResult<()>;

    /// Whether the transport is still believed healthy.
    fn is_alive(&self) -> bool;
}

/// Opens sessions to a directory endpoint.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Opens a new unauthenticated session to `endpoint`.
    async fn open(
        &self,
        endpoint: &str,
        config: &DirectoryConfig,
    ) -> DirectoryResult<Box<dyn DirectorySession>>;
}

/// Production connector over `ldap3`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LdapConnector;

#[async_trait]
impl DirectoryConnector for LdapConnector {
    async fn open(
        &self,
        endpoint: &str,
        config: &DirectoryConfig,
    ) -> DirectoryResult<Box<dyn DirectorySession>> {
        let settings = LdapConnSettings::new().set_conn_timeout(config.connection_timeout);

        let (conn, ldap) = LdapConnAsync::with_settings(settings, endpoint)
            .await
            .map_err(|e| DirectoryError::protocol(format!("connect failed: {e}")))?;

        // Drive the connection in the background; the session handle is
        // unusable once the driver exits.
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                tracing::warn!(error = %e, "directory connection driver terminated");
            }
        });

        Ok(Box::new(LdapSession { ldap, alive: true }))
    }
}

/// [`DirectorySession`] backed by an `ldap3` connection.
struct LdapSession {
    ldap: Ldap,
    alive: bool,
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn bind(&mut self, dn: &str, secret: &str) -> DirectoryResult<BindOutcome> {
        let result = self.ldap.simple_bind(dn, secret).await.map_err(|e| {
            self.alive = false;
            DirectoryError::protocol(format!("bind transport failure: {e}"))
        })?;

        match result.success() {
            Ok(_) => Ok(BindOutcome::Success),
            Err(ldap3::LdapError::LdapResult { result }) if result.rc == RC_INVALID_CREDENTIALS => {
                Ok(BindOutcome::InvalidCredentials)
            }
            Err(e) => {
                self.alive = false;
                Err(DirectoryError::protocol(format!("bind failed: {e}")))
            }
        }
    }

    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attrs: &[&str],
    ) -> DirectoryResult<Vec<SearchEntry>> {
        let attrs: Vec<String> = attrs.iter().map(ToString::to_string).collect();
        let (entries, _res) = self
            .ldap
            .search(base, scope.to_ldap3(), filter, attrs)
            .await
            .map_err(|e| {
                self.alive = false;
                DirectoryError::search(e.to_string())
            })?
            .success()
            .map_err(|e| DirectoryError::search(e.to_string()))?;

        Ok(entries
            .into_iter()
            .map(|entry| {
                let entry = ldap3::SearchEntry::construct(entry);
                SearchEntry {
                    dn: entry.dn,
                    attrs: entry.attrs,
                }
            })
            .collect())
    }

    async fn unbind(&mut self) -> DirectoryResult<()> {
        self.alive = false;
        self.ldap
            .unbind()
            .await
            .map_err(|e| DirectoryError::protocol(format!("unbind failed: {e}")))
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_maps_to_ldap3() {
        assert!(matches!(SearchScope::Base.to_ldap3(), ldap3::Scope::Base));
        assert!(matches!(
            SearchScope::Subtree.to_ldap3(),
            ldap3::Scope::Subtree
        ));
    }

    #[test]
    fn search_entry_first_value() {
        let mut attrs = HashMap::new();
        attrs.insert("mail".to_string(), vec!["a@example.com".to_string()]);
        let entry = SearchEntry {
            dn: "uid=a,ou=users,dc=example,dc=com".to_string(),
            attrs,
        };
        assert_eq!(entry.first("mail"), Some("a@example.com"));
        assert_eq!(entry.first("cn"), None);
    }
}
