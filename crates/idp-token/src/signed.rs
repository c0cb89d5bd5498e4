//! Plain signed token provider.
//!
//! Claims are serialized deterministically and signed as a compact JWS.
//! The token is self-contained: validation needs only the configured
//! verification key, so no server-side record is required.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::TokenProviderConfig;
use crate::error::{TokenError, TokenResult};
use crate::provider::{Claims, IssuedToken, TokenProvider};

/// Supported signature algorithms.
///
/// SHA-384 minimum; no 256-bit variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureAlg {
    /// ECDSA with P-384 and SHA-384.
    #[default]
    Es384,
    /// RSA PKCS#1 v1.5 with SHA-384.
    Rs384,
}

impl SignatureAlg {
    /// JWA registry name.
    #[must_use]
    pub const fn jwa_name(self) -> &'static str {
        match self {
            Self::Es384 => "ES384",
            Self::Rs384 => "RS384",
        }
    }

    fn to_jwt(self) -> Algorithm {
        match self {
            Self::Es384 => Algorithm::ES384,
            Self::Rs384 => Algorithm::RS384,
        }
    }
}

/// Signed token provider over asymmetric PEM key material.
pub struct SignedTokenProvider {
    algorithm: SignatureAlg,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for SignedTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedTokenProvider")
            .field("algorithm", &self.algorithm)
            .field("encoding_key", &"[REDACTED]")
            .field("decoding_key", &"[REDACTED]")
            .finish()
    }
}

impl SignedTokenProvider {
    /// Creates a provider from PEM-encoded key material.
    ///
    /// ## Errors
    ///
    /// Returns a configuration error if either key fails to parse.
    pub fn from_pem(
        algorithm: SignatureAlg,
        private_key_pem: &[u8],
        public_key_pem: &[u8],
    ) -> TokenResult<Self> {
        let encoding_key = match algorithm {
            SignatureAlg::Es384 => EncodingKey::from_ec_pem(private_key_pem),
            SignatureAlg::Rs384 => EncodingKey::from_rsa_pem(private_key_pem),
        }
        .map_err(|e| TokenError::config(format!("invalid signing key: {e}")))?;

        let decoding_key = match algorithm {
            SignatureAlg::Es384 => DecodingKey::from_ec_pem(public_key_pem),
            SignatureAlg::Rs384 => DecodingKey::from_rsa_pem(public_key_pem),
        }
        .map_err(|e| TokenError::config(format!("invalid verification key: {e}")))?;

        Ok(Self {
            algorithm,
            encoding_key,
            decoding_key,
        })
    }

    /// Creates a provider from the key paths in `config`.
    pub fn from_config(config: &TokenProviderConfig) -> TokenResult<Self> {
        let private_path = config
            .signing_key_path
            .as_ref()
            .ok_or_else(|| TokenError::config("signing_key_path is required"))?;
        let public_path = config
            .verifying_key_path
            .as_ref()
            .ok_or_else(|| TokenError::config("verifying_key_path is required"))?;

        let private_pem = std::fs::read(private_path).map_err(|e| {
            TokenError::config(format!("cannot read {}: {e}", private_path.display()))
        })?;
        let public_pem = std::fs::read(public_path).map_err(|e| {
            TokenError::config(format!("cannot read {}: {e}", public_path.display()))
        })?;

        Self::from_pem(config.algorithm, &private_pem, &public_pem)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(self.algorithm.to_jwt());
        // exp is optional (non-expiring tokens), but enforced when present.
        let none: &[&str] = &[];
        validation.set_required_spec_claims(none);
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation
    }
}

impl TokenProvider for SignedTokenProvider {
    fn issue(&self, claims: &Claims) -> TokenResult<IssuedToken> {
        let header = Header::new(self.algorithm.to_jwt());
        // A signing failure here is a provider problem (bad key
        // material), never a bad credential.
        let token = encode(&header, claims, &self.encoding_key)
            .map_err(|e| TokenError::unexpected(format!("signing failed: {e}")))?;
        Ok(IssuedToken {
            token,
            needs_persistence: self.needs_persistence(),
        })
    }

    fn validate(&self, token: &str) -> TokenResult<Claims> {
        match decode::<Claims>(token, &self.decoding_key, &self.validation()) {
            Ok(data) => Ok(data.claims),
            Err(e) => Err(match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::ExpiredToken,
                ErrorKind::InvalidKeyFormat
                | ErrorKind::InvalidEcdsaKey
                | ErrorKind::InvalidRsaKey(_) => {
                    TokenError::unexpected(format!("verification key failure: {e}"))
                }
                _ => TokenError::invalid(e.to_string()),
            }),
        }
    }

    fn needs_persistence(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_garbage_key_material() {
        let result = SignedTokenProvider::from_pem(SignatureAlg::Es384, b"nonsense", b"nonsense");
        assert!(matches!(result, Err(TokenError::Configuration(_))));
    }

    #[test]
    fn jwa_names() {
        assert_eq!(SignatureAlg::Es384.jwa_name(), "ES384");
        assert_eq!(SignatureAlg::Rs384.jwa_name(), "RS384");
    }
}
