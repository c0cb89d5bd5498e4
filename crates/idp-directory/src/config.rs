//! Directory connection and pool configuration.
//!
//! All sizing parameters are read exactly once, when a pool is
//! constructed. Changing them requires recreating the pool through
//! [`crate::registry::PoolRegistry::reset`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DirectoryError, DirectoryResult};

/// Directory provider configuration.
///
/// ## Security Requirements
///
/// When `use_tls` is set, the `url` must use the `ldaps://` scheme.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    // === Connection ===
    /// Directory server URL (`ldap://` or `ldaps://`).
    pub url: String,

    /// Bind DN for the service account.
    pub bind_dn: String,

    /// Service account credential.
    #[serde(skip_serializing)]
    pub bind_credential: String,

    /// Whether connections must use TLS from the start.
    pub use_tls: bool,

    /// Transport connect timeout for a single attempt.
    pub connection_timeout: Duration,

    // === Directory structure ===
    /// Base DN for user searches.
    pub users_dn: String,

    /// User object class used in search filters.
    pub user_object_class: String,

    /// Attribute used for username lookup.
    pub username_attribute: String,

    // === Connection pool ===
    /// Maximum connections per pool.
    pub pool_size: usize,

    /// Connect retries after the initial failed attempt.
    pub pool_retry_max: u32,

    /// Delay between connect retries.
    pub pool_retry_delay: Duration,

    /// How long an acquire call waits for a free slot before failing
    /// with a capacity error.
    pub pool_connection_timeout: Duration,

    /// Maximum lifetime of a pooled connection before it is destroyed
    /// instead of recycled.
    pub pool_connection_lifetime: Duration,

    /// Whether administrative connections are pooled at all.
    pub use_pool: bool,

    /// Whether end-user authentication binds use a (separate) pool.
    ///
    /// End-user and administrative connections never share a pool: a
    /// failed end-user bind must not poison the admin pool.
    pub use_auth_pool: bool,
}

impl DirectoryConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> DirectoryConfigBuilder {
        DirectoryConfigBuilder::new()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DirectoryResult<()> {
        if !self.url.starts_with("ldap://") && !self.url.starts_with("ldaps://") {
            return Err(DirectoryError::config(format!(
                "unsupported directory URL scheme: {}",
                self.url
            )));
        }
        if self.use_tls && !self.url.starts_with("ldaps://") {
            return Err(DirectoryError::config(
                "use_tls requires an ldaps:// URL",
            ));
        }
        if self.bind_dn.is_empty() {
            return Err(DirectoryError::config("bind_dn cannot be empty"));
        }
        if self.users_dn.is_empty() {
            return Err(DirectoryError::config("users_dn cannot be empty"));
        }
        if self.pool_size == 0 {
            return Err(DirectoryError::config("pool_size must be at least 1"));
        }
        Ok(())
    }

    /// Builds the search filter matching a single user by username.
    #[must_use]
    pub fn user_by_username_filter(&self, username: &str) -> String {
        let escaped = filter_escape(username);
        format!(
            "(&(objectClass={})({}={escaped}))",
            self.user_object_class, self.username_attribute
        )
    }
}

/// Escapes special characters in LDAP filter values (RFC 4515).
#[must_use]
pub fn filter_escape(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\5c"),
            '*' => result.push_str("\\2a"),
            '(' => result.push_str("\\28"),
            ')' => result.push_str("\\29"),
            '\0' => result.push_str("\\00"),
            _ => result.push(c),
        }
    }
    result
}

/// Builder for [`DirectoryConfig`].
#[derive(Debug)]
pub struct DirectoryConfigBuilder {
    url: Option<String>,
    bind_dn: Option<String>,
    bind_credential: Option<String>,
    use_tls: bool,
    connection_timeout: Duration,
    users_dn: Option<String>,
    user_object_class: String,
    username_attribute: String,
    pool_size: usize,
    pool_retry_max: u32,
    pool_retry_delay: Duration,
    pool_connection_timeout: Duration,
    pool_connection_lifetime: Duration,
    use_pool: bool,
    use_auth_pool: bool,
}

impl Default for DirectoryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryConfigBuilder {
    /// Creates a new builder with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            url: None,
            bind_dn: None,
            bind_credential: None,
            use_tls: true,
            connection_timeout: Duration::from_secs(5),
            users_dn: None,
            user_object_class: "inetOrgPerson".to_string(),
            username_attribute: "uid".to_string(),
            pool_size: 10,
            pool_retry_max: 3,
            pool_retry_delay: Duration::from_millis(100),
            pool_connection_timeout: Duration::from_secs(5),
            pool_connection_lifetime: Duration::from_secs(600),
            use_pool: true,
            use_auth_pool: true,
        }
    }

    /// Sets the directory URL.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the service account bind DN.
    #[must_use]
    pub fn bind_dn(mut self, dn: impl Into<String>) -> Self {
        self.bind_dn = Some(dn.into());
        self
    }

    /// Sets the service account credential.
    #[must_use]
    pub fn bind_credential(mut self, credential: impl Into<String>) -> Self {
        self.bind_credential = Some(credential.into());
        self
    }

    /// Sets whether TLS is required.
    #[must_use]
    pub const fn use_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Sets the transport connect timeout.
    #[must_use]
    pub const fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Sets the base DN for user searches.
    #[must_use]
    pub fn users_dn(mut self, dn: impl Into<String>) -> Self {
        self.users_dn = Some(dn.into());
        self
    }

    /// Sets the user object class.
    #[must_use]
    pub fn user_object_class(mut self, class: impl Into<String>) -> Self {
        self.user_object_class = class.into();
        self
    }

    /// Sets the username lookup attribute.
    #[must_use]
    pub fn username_attribute(mut self, attr: impl Into<String>) -> Self {
        self.username_attribute = attr.into();
        self
    }

    /// Sets the maximum pool size.
    #[must_use]
    pub const fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Sets the connect retry count.
    #[must_use]
    pub const fn pool_retry_max(mut self, retries: u32) -> Self {
        self.pool_retry_max = retries;
        self
    }

    /// Sets the delay between connect retries.
    #[must_use]
    pub const fn pool_retry_delay(mut self, delay: Duration) -> Self {
        self.pool_retry_delay = delay;
        self
    }

    /// Sets how long acquire waits for a free slot.
    #[must_use]
    pub const fn pool_connection_timeout(mut self, timeout: Duration) -> Self {
        self.pool_connection_timeout = timeout;
        self
    }

    /// Sets the maximum lifetime of a pooled connection.
    #[must_use]
    pub const fn pool_connection_lifetime(mut self, lifetime: Duration) -> Self {
        self.pool_connection_lifetime = lifetime;
        self
    }

    /// Enables or disables pooling for administrative connections.
    #[must_use]
    pub const fn use_pool(mut self, enabled: bool) -> Self {
        self.use_pool = enabled;
        self
    }

    /// Enables or disables pooling for end-user authentication binds.
    #[must_use]
    pub const fn use_auth_pool(mut self, enabled: bool) -> Self {
        self.use_auth_pool = enabled;
        self
    }

    /// Builds and validates the configuration.
    ///
    /// ## Errors
    ///
    /// Returns an error if required fields are missing or validation
    /// fails.
    pub fn build(self) -> DirectoryResult<DirectoryConfig> {
        let config = DirectoryConfig {
            url: self
                .url
                .ok_or_else(|| DirectoryError::config("url is required"))?,
            bind_dn: self
                .bind_dn
                .ok_or_else(|| DirectoryError::config("bind_dn is required"))?,
            bind_credential: self
                .bind_credential
                .ok_or_else(|| DirectoryError::config("bind_credential is required"))?,
            use_tls: self.use_tls,
            connection_timeout: self.connection_timeout,
            users_dn: self
                .users_dn
                .ok_or_else(|| DirectoryError::config("users_dn is required"))?,
            user_object_class: self.user_object_class,
            username_attribute: self.username_attribute,
            pool_size: self.pool_size,
            pool_retry_max: self.pool_retry_max,
            pool_retry_delay: self.pool_retry_delay,
            pool_connection_timeout: self.pool_connection_timeout,
            pool_connection_lifetime: self.pool_connection_lifetime,
            use_pool: self.use_pool,
            use_auth_pool: self.use_auth_pool,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_builder() -> DirectoryConfigBuilder {
        DirectoryConfig::builder()
            .url("ldaps://ldap.example.com:636")
            .bind_dn("cn=admin,dc=example,dc=com")
            .bind_credential("password")
            .users_dn("ou=users,dc=example,dc=com")
    }

    #[test]
    fn accepts_ldaps_url() {
        assert!(base_builder().build().is_ok());
    }

    #[test]
    fn rejects_plain_url_with_tls_required() {
        let result = base_builder()
            .url("ldap://ldap.example.com:389")
            .use_tls(true)
            .build();
        assert!(matches!(result, Err(DirectoryError::Configuration(_))));
    }

    #[test]
    fn accepts_plain_url_when_tls_disabled() {
        let result = base_builder()
            .url("ldap://ldap.example.com:389")
            .use_tls(false)
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_zero_pool_size() {
        let result = base_builder().pool_size(0).build();
        assert!(matches!(result, Err(DirectoryError::Configuration(_))));
    }

    #[test]
    fn filter_escape_special_chars() {
        assert_eq!(filter_escape("john*"), "john\\2a");
        assert_eq!(filter_escape("(admin)"), "\\28admin\\29");
        assert_eq!(filter_escape("user\\name"), "user\\5cname");
        assert_eq!(filter_escape("normal"), "normal");
    }

    #[test]
    fn username_filter_contains_object_class() {
        let config = base_builder().build().unwrap();
        let filter = config.user_by_username_filter("jdoe");
        assert!(filter.contains("(uid=jdoe)"));
        assert!(filter.contains("objectClass=inetOrgPerson"));
    }
}
