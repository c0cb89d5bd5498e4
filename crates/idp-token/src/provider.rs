//! Token provider abstraction.
//!
//! A provider turns a claims mapping into an opaque, verifiable
//! credential and back. Variants differ in the transform (signed,
//! compressed-signed, symmetric-encrypted) and in whether the issued
//! credential must additionally be persisted server-side.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::compressed::CompressedSignedTokenProvider;
use crate::config::{TokenProviderConfig, TokenVariant};
use crate::encrypted::EncryptedTokenProvider;
use crate::error::{TokenError, TokenResult};
use crate::keys::KeyRepository;
use crate::signed::SignedTokenProvider;

/// Claim name carrying the expiry timestamp (unix seconds).
pub const EXP_CLAIM: &str = "exp";

/// Token claims.
///
/// A `BTreeMap` keeps serialization deterministic: the same claims
/// always produce the same payload bytes.
pub type Claims = BTreeMap<String, serde_json::Value>;

/// An issued opaque credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Opaque token payload.
    pub token: String,
    /// Whether a server-side record is required to validate
    /// revocation/expiry for this token.
    pub needs_persistence: bool,
}

/// Issues and validates opaque credentials.
pub trait TokenProvider: std::fmt::Debug + Send + Sync {
    /// Serializes `claims` deterministically, applies the variant's
    /// transform, and returns the opaque token.
    ///
    /// Claims are never mutated: `validate(issue(claims))` returns the
    /// claims exactly as given.
    fn issue(&self, claims: &Claims) -> TokenResult<IssuedToken>;

    /// Reverses the transform and returns the embedded claims.
    ///
    /// ## Errors
    ///
    /// - [`TokenError::InvalidToken`] for bad or foreign input.
    /// - [`TokenError::ExpiredToken`] for a structurally valid token
    ///   past its `exp` claim.
    /// - [`TokenError::UnexpectedProvider`] when the underlying
    ///   primitive fails for environment reasons.
    fn validate(&self, token: &str) -> TokenResult<Claims>;

    /// Fixed persistence requirement of this variant.
    fn needs_persistence(&self) -> bool;
}

/// Stamps an expiry claim `lifespan` from now.
///
/// Providers never inject expiry themselves; callers that want expiring
/// tokens stamp the claims before issuance.
pub fn stamp_expiry(claims: &mut Claims, lifespan: Duration) {
    let exp = Utc::now().timestamp() + lifespan.as_secs() as i64;
    claims.insert(EXP_CLAIM.to_string(), serde_json::json!(exp));
}

/// Rejects claims whose `exp` lies in the past.
///
/// A missing `exp` is allowed (non-expiring token); a malformed one is
/// a payload problem, so it surfaces as an invalid token.
pub(crate) fn check_expiry(claims: &Claims) -> TokenResult<()> {
    let Some(value) = claims.get(EXP_CLAIM) else {
        return Ok(());
    };
    let exp = value
        .as_i64()
        .ok_or_else(|| TokenError::invalid("exp claim is not an integer"))?;
    if exp < Utc::now().timestamp() {
        return Err(TokenError::ExpiredToken);
    }
    Ok(())
}

/// Builds the provider selected by `config`.
///
/// The encrypted variant initializes its key repository here; signed
/// variants load their PEM key material from the configured paths.
/// All configuration is read once, at construction.
pub fn create_provider(config: &TokenProviderConfig) -> TokenResult<Box<dyn TokenProvider>> {
    match config.variant {
        TokenVariant::Signed => {
            let provider = SignedTokenProvider::from_config(config)?;
            Ok(Box::new(provider))
        }
        TokenVariant::CompressedSigned => {
            let inner = SignedTokenProvider::from_config(config)?;
            Ok(Box::new(CompressedSignedTokenProvider::new(inner)))
        }
        TokenVariant::Encrypted => {
            let dir = config.key_repository.as_ref().ok_or_else(|| {
                TokenError::config("encrypted variant requires key_repository path")
            })?;
            let repository = KeyRepository::new(dir, config.max_active_keys);
            repository.initialize()?;
            Ok(Box::new(EncryptedTokenProvider::new(Arc::new(repository))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_then_check_accepts_future_expiry() {
        let mut claims = Claims::new();
        claims.insert("sub".to_string(), serde_json::json!("u1"));
        stamp_expiry(&mut claims, Duration::from_secs(300));
        assert!(check_expiry(&claims).is_ok());
    }

    #[test]
    fn past_expiry_rejected() {
        let mut claims = Claims::new();
        claims.insert(EXP_CLAIM.to_string(), serde_json::json!(1_000));
        assert!(matches!(check_expiry(&claims), Err(TokenError::ExpiredToken)));
    }

    #[test]
    fn missing_expiry_allowed() {
        let claims = Claims::new();
        assert!(check_expiry(&claims).is_ok());
    }

    #[test]
    fn malformed_expiry_is_invalid_token() {
        let mut claims = Claims::new();
        claims.insert(EXP_CLAIM.to_string(), serde_json::json!("tomorrow"));
        assert!(matches!(
            check_expiry(&claims),
            Err(TokenError::InvalidToken(_))
        ));
    }
}
