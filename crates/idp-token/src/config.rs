//! Token provider configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::signed::SignatureAlg;

/// Which issuance transform a provider applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenVariant {
    /// Plain signed token; self-contained.
    #[default]
    Signed,
    /// Signed then deflate-compressed; self-contained.
    CompressedSigned,
    /// Symmetrically encrypted under the rotating key repository.
    Encrypted,
}

/// Token provider configuration, read once at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenProviderConfig {
    /// Selected variant.
    pub variant: TokenVariant,

    /// Signature algorithm for the signed variants.
    pub algorithm: SignatureAlg,

    /// Path to the PEM-encoded signing (private) key.
    pub signing_key_path: Option<PathBuf>,

    /// Path to the PEM-encoded verification (public) key.
    pub verifying_key_path: Option<PathBuf>,

    /// Key repository directory for the encrypted variant.
    pub key_repository: Option<PathBuf>,

    /// Maximum keys retained by the repository across rotations.
    pub max_active_keys: usize,

    /// Default token lifespan; callers use it to stamp the expiry claim.
    pub token_lifespan: Duration,
}

impl Default for TokenProviderConfig {
    fn default() -> Self {
        Self {
            variant: TokenVariant::Signed,
            algorithm: SignatureAlg::Es384,
            signing_key_path: None,
            verifying_key_path: None,
            key_repository: None,
            max_active_keys: 3,
            token_lifespan: Duration::from_secs(3600),
        }
    }
}

impl TokenProviderConfig {
    /// Configuration for a signed provider with the given PEM paths.
    #[must_use]
    pub fn signed(
        algorithm: SignatureAlg,
        signing_key_path: impl Into<PathBuf>,
        verifying_key_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            variant: TokenVariant::Signed,
            algorithm,
            signing_key_path: Some(signing_key_path.into()),
            verifying_key_path: Some(verifying_key_path.into()),
            ..Self::default()
        }
    }

    /// Configuration for a compressed-signed provider.
    #[must_use]
    pub fn compressed_signed(
        algorithm: SignatureAlg,
        signing_key_path: impl Into<PathBuf>,
        verifying_key_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            variant: TokenVariant::CompressedSigned,
            ..Self::signed(algorithm, signing_key_path, verifying_key_path)
        }
    }

    /// Configuration for an encrypted provider over `key_repository`.
    #[must_use]
    pub fn encrypted(key_repository: impl Into<PathBuf>, max_active_keys: usize) -> Self {
        Self {
            variant: TokenVariant::Encrypted,
            key_repository: Some(key_repository.into()),
            max_active_keys,
            ..Self::default()
        }
    }
}
