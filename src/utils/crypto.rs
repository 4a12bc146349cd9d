// Sealed cookie values and access-token inspection

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};

/// AES-GCM nonce length in bytes
pub const NONCE_LEN: usize = 12;

/// AES-256-GCM sealing for values stored in browser cookies.
///
/// Sealed form is Base64URL(nonce || ciphertext) of the value's JSON.
pub struct CookieCipher {
    cipher: Aes256Gcm,
}

impl CookieCipher {
    /// Key the cipher from a configured secret of any length (SHA-256 of the secret)
    #[must_use]
    pub fn from_secret(secret: &[u8]) -> Self {
        let digest = Sha256::digest(secret);
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&digest)),
        }
    }

    /// Serialize and encrypt `value` under a fresh random nonce
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or encryption fails.
    pub fn seal<T: Serialize>(&self, value: &T) -> Result<String> {
        let plaintext = serde_json::to_vec(value).context("Failed to serialize cookie value")?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|e| anyhow!("Cookie encryption failed: {e}"))?;

        let mut sealed = nonce.to_vec();
        sealed.extend(ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    /// Decrypt and deserialize a value produced by [`CookieCipher::seal`]
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid Base64URL, is too short,
    /// was sealed under another key or was tampered with, or does not
    /// deserialize into `T`.
    pub fn open<T: DeserializeOwned>(&self, sealed: &str) -> Result<T> {
        let raw = URL_SAFE_NO_PAD
            .decode(sealed)
            .context("Cookie value is not Base64URL")?;
        if raw.len() <= NONCE_LEN {
            bail!("Cookie value too short");
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| anyhow!("Cookie value failed authentication"))?;
        serde_json::from_slice(&plaintext).context("Cookie value has an unexpected shape")
    }
}

/// Claims of a JWT access token, read without verifying the signature.
///
/// Only used to learn the `exp` of tokens the provider issued; never for
/// trust decisions.
#[must_use]
pub fn unverified_jwt_claims(token: &str) -> Option<serde_json::Value> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}
