//! # idp-token
//!
//! Pluggable token issuance for the identity service.
//!
//! Three provider variants share the [`TokenProvider`] contract:
//! - [`signed::SignedTokenProvider`]: asymmetric signature, self-contained.
//! - [`compressed::CompressedSignedTokenProvider`]: signed plus a
//!   deterministic compression pass.
//! - [`encrypted::EncryptedTokenProvider`]: AES-256-GCM under the
//!   rotating [`keys::KeyRepository`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod compressed;
pub mod config;
pub mod encrypted;
pub mod error;
pub mod keys;
pub mod provider;
pub mod signed;

pub use compressed::CompressedSignedTokenProvider;
pub use config::{TokenProviderConfig, TokenVariant};
pub use encrypted::EncryptedTokenProvider;
pub use error::{TokenError, TokenResult};
pub use keys::{KeyMaterial, KeyRepository, KEY_LEN};
pub use provider::{create_provider, stamp_expiry, Claims, IssuedToken, TokenProvider, EXP_CLAIM};
pub use signed::{SignatureAlg, SignedTokenProvider};
