//! Compressed-signed token provider.
//!
//! Wraps the plain signed provider and zlib-compresses the signed
//! compact form, trading CPU for shorter credentials. Decompression is
//! size-capped so foreign input cannot inflate into a memory bomb.

use std::io::{Read, Write};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{TokenError, TokenResult};
use crate::provider::{Claims, IssuedToken, TokenProvider};
use crate::signed::SignedTokenProvider;

/// Maximum decompressed size (64 KB).
const MAX_DECOMPRESSED_SIZE: u64 = 64 * 1024;

/// Signed provider with a deterministic compression pass.
#[derive(Debug)]
pub struct CompressedSignedTokenProvider {
    inner: SignedTokenProvider,
}

impl CompressedSignedTokenProvider {
    /// Wraps a signed provider.
    #[must_use]
    pub fn new(inner: SignedTokenProvider) -> Self {
        Self { inner }
    }
}

impl TokenProvider for CompressedSignedTokenProvider {
    fn issue(&self, claims: &Claims) -> TokenResult<IssuedToken> {
        let signed = self.inner.issue(claims)?;

        // A compression failure is an environment problem, not a bad
        // credential.
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(signed.token.as_bytes())
            .and_then(|()| encoder.finish())
            .map(|compressed| IssuedToken {
                token: URL_SAFE_NO_PAD.encode(compressed),
                needs_persistence: self.needs_persistence(),
            })
            .map_err(|e| TokenError::unexpected(format!("compression failed: {e}")))
    }

    fn validate(&self, token: &str) -> TokenResult<Claims> {
        let compressed = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| TokenError::invalid(format!("base64 decode failed: {e}")))?;

        let mut signed = String::new();
        ZlibDecoder::new(compressed.as_slice())
            .take(MAX_DECOMPRESSED_SIZE)
            .read_to_string(&mut signed)
            .map_err(|e| TokenError::invalid(format!("decompression failed: {e}")))?;

        self.inner.validate(&signed)
    }

    fn needs_persistence(&self) -> bool {
        false
    }
}
