//! Token provider error types.
//!
//! The taxonomy separates bad input from broken environment: anything an
//! attacker can cause by supplying a foreign or corrupted token is
//! [`TokenError::InvalidToken`]; a failing crypto or compression
//! primitive is [`TokenError::UnexpectedProvider`] and indicates a
//! provider misconfiguration, not a bad credential.

use thiserror::Error;

/// Errors produced by token issuance and validation.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Signature, decryption, or format check failed.
    ///
    /// Always attributable to bad or foreign input; never retried.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Structurally valid token past its validity window.
    #[error("token has expired")]
    ExpiredToken,

    /// An underlying crypto or compression primitive failed for reasons
    /// unrelated to the token's validity.
    #[error("token provider failure: {0}")]
    UnexpectedProvider(String),

    /// Key repository I/O or layout failure.
    #[error("key repository error: {0}")]
    KeyRepository(String),

    /// Invalid provider configuration.
    #[error("token configuration error: {0}")]
    Configuration(String),
}

impl TokenError {
    /// Creates an invalid-token error.
    #[must_use]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidToken(msg.into())
    }

    /// Creates an unexpected-provider error.
    #[must_use]
    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::UnexpectedProvider(msg.into())
    }

    /// Creates a key repository error.
    #[must_use]
    pub fn key_repository(msg: impl Into<String>) -> Self {
        Self::KeyRepository(msg.into())
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether the failure is attributable to the presented token.
    #[must_use]
    pub const fn is_token_fault(&self) -> bool {
        matches!(self, Self::InvalidToken(_) | Self::ExpiredToken)
    }
}

/// Result type for token operations.
pub type TokenResult<T> = Result<T, TokenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_attribution() {
        assert!(TokenError::invalid("garbage").is_token_fault());
        assert!(TokenError::ExpiredToken.is_token_fault());
        assert!(!TokenError::unexpected("no key material").is_token_fault());
        assert!(!TokenError::key_repository("io").is_token_fault());
    }
}
