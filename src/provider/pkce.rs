// PKCE verifier and S256 challenge generation

use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of random bytes behind a code verifier (43 base64url characters)
pub const VERIFIER_BYTES: usize = 32;

/// A code verifier and the challenge derived from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    /// Generate a fresh verifier from the thread RNG
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; VERIFIER_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self::from_verifier(general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Rebuild the pair from a stored verifier
    #[must_use]
    pub fn from_verifier(verifier: String) -> Self {
        let challenge = s256_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }

    /// Challenge method sent alongside the challenge
    #[must_use]
    pub const fn method() -> &'static str {
        "s256"
    }
}

/// `BASE64URL(SHA256(verifier))` without padding, per RFC 7636
#[must_use]
pub fn s256_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(digest)
}
