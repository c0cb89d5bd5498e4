//! Directory-specific error types.
//!
//! ## Security Note
//!
//! Error messages must not leak sensitive information like
//! passwords, bind credentials, or internal directory structure.

use thiserror::Error;

/// Errors produced by the directory connection layer.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Invalid configuration.
    #[error("directory configuration error: {0}")]
    Configuration(String),

    /// Pool at maximum size and no slot became free within the wait window.
    ///
    /// Callers should retry the whole logical operation later, not the
    /// lease itself.
    #[error("directory pool for {endpoint} exhausted after {waited_ms}ms")]
    CapacityExhausted {
        /// Endpoint whose pool was exhausted.
        endpoint: String,
        /// How long the caller waited for a slot, in milliseconds.
        waited_ms: u64,
    },

    /// Connect or service bind failed after exhausting the retry policy.
    #[error("directory connection to {endpoint} failed after {attempts} attempts: {reason}")]
    ConnectFailure {
        /// Endpoint that could not be reached.
        endpoint: String,
        /// Total connect attempts made (initial try plus retries).
        attempts: u32,
        /// Last underlying failure.
        reason: String,
    },

    /// Bind rejected by the server: wrong DN or password.
    ///
    /// ## Security
    ///
    /// The message is deliberately generic to prevent user enumeration.
    #[error("invalid directory credentials")]
    InvalidCredentials,

    /// Search returned no entry for the given username.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// Search operation failed.
    #[error("directory search failed: {0}")]
    Search(String),

    /// Protocol-level error from the directory server.
    #[error("directory protocol error: {0}")]
    Protocol(String),

    /// Internal error in the pooling layer.
    #[error("internal directory error: {0}")]
    Internal(String),
}

impl DirectoryError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a search error.
    #[must_use]
    pub fn search(msg: impl Into<String>) -> Self {
        Self::Search(msg.into())
    }

    /// Creates a protocol error.
    #[must_use]
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Whether the pool may retry the failed connect attempt.
    ///
    /// Invalid credentials are never retried: repeating a rejected bind
    /// cannot succeed and hammers the directory's lockout counters.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Search(_) | Self::Internal(_))
    }
}

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

impl From<ldap3::LdapError> for DirectoryError {
    fn from(err: ldap3::LdapError) -> Self {
        Self::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_credentials_not_retryable() {
        assert!(!DirectoryError::InvalidCredentials.is_retryable());
        assert!(!DirectoryError::CapacityExhausted {
            endpoint: "ldaps://x".into(),
            waited_ms: 10,
        }
        .is_retryable());
    }

    #[test]
    fn protocol_errors_retryable() {
        assert!(DirectoryError::protocol("connection reset").is_retryable());
    }

    #[test]
    fn credential_message_is_generic() {
        let msg = DirectoryError::InvalidCredentials.to_string();
        assert!(!msg.contains("password"));
        assert!(!msg.contains("dn"));
    }
}
