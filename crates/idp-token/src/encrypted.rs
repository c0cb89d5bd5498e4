//! Symmetric-encrypted token provider.
//!
//! Claims are AES-256-GCM encrypted under the key repository's primary
//! key. Validation tries every currently held key, primary first, so
//! tokens issued before a rotation keep validating against the demoted
//! secondary. Tokens of this variant are not self-contained: they
//! require the repository state, so a server-side record is kept.

use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{TokenError, TokenResult};
use crate::keys::{KeyMaterial, KeyRepository};
use crate::provider::{check_expiry, Claims, IssuedToken, TokenProvider};

/// GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Key-rotating encrypted token provider.
pub struct EncryptedTokenProvider {
    keys: Arc<KeyRepository>,
}

impl EncryptedTokenProvider {
    /// Creates a provider over an initialized key repository.
    #[must_use]
    pub fn new(keys: Arc<KeyRepository>) -> Self {
        Self { keys }
    }

    /// The repository backing this provider.
    #[must_use]
    pub fn repository(&self) -> &Arc<KeyRepository> {
        &self.keys
    }

    fn cipher(key: &KeyMaterial) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key))
    }
}

impl std::fmt::Debug for EncryptedTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedTokenProvider")
            .field("keys", &"[REDACTED]")
            .finish()
    }
}

impl TokenProvider for EncryptedTokenProvider {
    fn issue(&self, claims: &Claims) -> TokenResult<IssuedToken> {
        let plaintext = serde_json::to_vec(claims)
            .map_err(|e| TokenError::unexpected(format!("claims serialization failed: {e}")))?;

        // Missing key material is a provider misconfiguration, not a
        // token problem.
        let primary = self
            .keys
            .primary()
            .ok_or_else(|| TokenError::unexpected("key repository holds no keys".to_string()))?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = Self::cipher(&primary)
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|e| TokenError::unexpected(format!("encryption failed: {e}")))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);

        Ok(IssuedToken {
            token: URL_SAFE_NO_PAD.encode(payload),
            needs_persistence: self.needs_persistence(),
        })
    }

    fn validate(&self, token: &str) -> TokenResult<Claims> {
        let payload = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| TokenError::invalid(format!("base64 decode failed: {e}")))?;
        if payload.len() <= NONCE_LEN {
            return Err(TokenError::invalid("token payload too short"));
        }
        let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce);

        // Primary first, then secondaries and the staged key. A
        // per-key decryption failure is the expected try-next signal.
        let keys = self.keys.current_keys();
        for key in keys.iter() {
            if let Ok(plaintext) = Self::cipher(key).decrypt(nonce, ciphertext) {
                let claims: Claims = serde_json::from_slice(&plaintext)
                    .map_err(|e| TokenError::invalid(format!("claims decode failed: {e}")))?;
                check_expiry(&claims)?;
                return Ok(claims);
            }
        }

        tracing::debug!(keys = keys.len(), "token did not decrypt under any active key");
        Err(TokenError::invalid(
            "token did not decrypt under any active key",
        ))
    }

    fn needs_persistence(&self) -> bool {
        true
    }
}
