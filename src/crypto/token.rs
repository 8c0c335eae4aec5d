use argon2::Argon2;
use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::crypto::aes::{self, KEY_SIZE, NONCE_SIZE, SecureKey};
use crate::error::{AppError, Result};

/// Static application salt for deriving the token-encryption key from the
/// operator secret. Fixed on purpose: every instance sharing the secret
/// must derive the same key.
const KEY_DERIVATION_SALT: &[u8] = b"creatorhub-token-encryption-v1";

/// The size of an OAuth state token in bytes.
const OAUTH_STATE_SIZE: usize = 32;

/// Delimiter between the base64 blob segments. Colon is outside both the
/// standard and URL-safe base64 alphabets.
const BLOB_DELIMITER: char = ':';

/// Authenticated encryption for third-party OAuth credentials at rest.
///
/// Output format: `base64(nonce):base64(tag):base64(ciphertext)`. The
/// nonce is randomized per call, so two encryptions of the same plaintext
/// never compare equal.
pub struct TokenCrypto {
    key: SecureKey,
}

impl TokenCrypto {
    /// Derives the encryption key from an operator secret with Argon2 and
    /// the static application salt.
    pub fn from_secret(secret: &str) -> Result<Self> {
        let mut key = [0u8; KEY_SIZE];
        Argon2::default()
            .hash_password_into(secret.as_bytes(), KEY_DERIVATION_SALT, &mut key)
            .map_err(|e| AppError::Encryption(format!("Argon2 key derivation error: {}", e)))?;
        Ok(Self {
            key: SecureKey::new(key),
        })
    }

    /// Generates an ephemeral random key.
    ///
    /// Credentials encrypted with it are unreadable after a restart and by
    /// other instances. Acceptable for single-node development only, hence
    /// the loud warning.
    pub fn ephemeral() -> Self {
        tracing::warn!(
            "⚠️  TOKEN_ENCRYPTION_SECRET is not set - using an EPHEMERAL key. \
             Encrypted credentials will NOT survive a restart and CANNOT be \
             shared across instances."
        );
        Self {
            key: aes::generate_key(),
        }
    }

    /// Builds the service from an optional operator secret.
    pub fn from_config(secret: Option<&str>) -> Result<Self> {
        match secret {
            Some(secret) => {
                let crypto = Self::from_secret(secret)?;
                tracing::info!("✅ Token encryption key derived from configured secret");
                Ok(crypto)
            }
            None => Ok(Self::ephemeral()),
        }
    }

    /// Encrypts a plaintext into the three-segment blob format.
    ///
    /// The empty string round-trips as itself without touching the cipher.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let (nonce, tag, ciphertext) = aes::encrypt(self.key.as_bytes(), plaintext.as_bytes())?;

        Ok(format!(
            "{}{}{}{}{}",
            general_purpose::STANDARD.encode(nonce),
            BLOB_DELIMITER,
            general_purpose::STANDARD.encode(tag),
            BLOB_DELIMITER,
            general_purpose::STANDARD.encode(ciphertext),
        ))
    }

    /// Decrypts a three-segment blob.
    ///
    /// Fails closed: malformed framing, undecodable segments, and tag
    /// mismatches all error; corrupted plaintext is never returned.
    pub fn decrypt(&self, blob: &str) -> Result<String> {
        if blob.is_empty() {
            return Ok(String::new());
        }

        let segments: Vec<&str> = blob.split(BLOB_DELIMITER).collect();
        if segments.len() != 3 {
            return Err(AppError::Encryption(format!(
                "Malformed credential blob: expected 3 segments, found {}",
                segments.len()
            )));
        }

        let nonce_bytes = general_purpose::STANDARD
            .decode(segments[0])
            .map_err(|e| AppError::Encryption(format!("Invalid nonce encoding: {}", e)))?;
        let nonce: [u8; NONCE_SIZE] = nonce_bytes
            .try_into()
            .map_err(|_| AppError::Encryption("Invalid nonce size".to_string()))?;

        let tag = general_purpose::STANDARD
            .decode(segments[1])
            .map_err(|e| AppError::Encryption(format!("Invalid tag encoding: {}", e)))?;

        let ciphertext = general_purpose::STANDARD
            .decode(segments[2])
            .map_err(|e| AppError::Encryption(format!("Invalid ciphertext encoding: {}", e)))?;

        let plaintext = aes::decrypt(self.key.as_bytes(), &nonce, &tag, &ciphertext)?;

        String::from_utf8(plaintext)
            .map_err(|e| AppError::Encryption(format!("Decrypted data is not UTF-8: {}", e)))
    }
}

/// Generates a high-entropy state token for CSRF-protected OAuth redirects.
pub fn generate_oauth_state() -> String {
    let mut state = [0u8; OAUTH_STATE_SIZE];
    OsRng.fill_bytes(&mut state);
    general_purpose::URL_SAFE_NO_PAD.encode(state)
}

/// One-way digest of a state token, for comparison without storing the raw
/// value.
pub fn hash_state(state: &str) -> String {
    let digest = Sha256::digest(state.as_bytes());
    hex::encode(digest)
}

/// Compares a state token against a stored digest in constant time.
pub fn verify_state(state: &str, expected_hash: &str) -> bool {
    hash_state(state)
        .as_bytes()
        .ct_eq(expected_hash.as_bytes())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crypto() -> TokenCrypto {
        TokenCrypto::from_secret("unit-test-secret").unwrap()
    }

    #[test]
    fn round_trips_utf8() {
        let crypto = crypto();
        for plaintext in [
            "ya29.a0AfH6SMBx",
            "token:with:delimiters",
            "emoji 🚀 and ünïcode",
            ":",
            " ",
        ] {
            let blob = crypto.encrypt(plaintext).unwrap();
            assert_eq!(crypto.decrypt(&blob).unwrap(), plaintext);
        }
    }

    #[test]
    fn empty_string_round_trips_without_cipher() {
        let crypto = crypto();
        assert_eq!(crypto.encrypt("").unwrap(), "");
        assert_eq!(crypto.decrypt("").unwrap(), "");
    }

    #[test]
    fn blob_has_three_base64_segments() {
        let blob = crypto().encrypt("access-token").unwrap();
        let segments: Vec<&str> = blob.split(':').collect();
        assert_eq!(segments.len(), 3);
        for segment in segments {
            assert!(general_purpose::STANDARD.decode(segment).is_ok());
        }
    }

    #[test]
    fn encryption_is_randomized() {
        let crypto = crypto();
        let a = crypto.encrypt("same plaintext").unwrap();
        let b = crypto.encrypt("same plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn same_secret_derives_interoperable_keys() {
        let a = TokenCrypto::from_secret("shared").unwrap();
        let b = TokenCrypto::from_secret("shared").unwrap();
        let blob = a.encrypt("cross-instance").unwrap();
        assert_eq!(b.decrypt(&blob).unwrap(), "cross-instance");
    }

    #[test]
    fn tampered_ciphertext_fails_closed() {
        let crypto = crypto();
        let blob = crypto.encrypt("oauth-refresh-token").unwrap();

        let segments: Vec<&str> = blob.split(':').collect();
        let mut ciphertext = general_purpose::STANDARD.decode(segments[2]).unwrap();
        ciphertext[0] ^= 0x01;
        let tampered = format!(
            "{}:{}:{}",
            segments[0],
            segments[1],
            general_purpose::STANDARD.encode(ciphertext)
        );

        assert!(crypto.decrypt(&tampered).is_err());
    }

    #[test]
    fn malformed_blobs_are_rejected() {
        let crypto = crypto();
        for blob in [
            "no-delimiters",
            "only:two",
            "one:too:many:segments",
            "!!!:???:***",
        ] {
            assert!(crypto.decrypt(blob).is_err(), "accepted {:?}", blob);
        }
    }

    #[test]
    fn wrong_key_fails_closed() {
        let blob = TokenCrypto::from_secret("key-a")
            .unwrap()
            .encrypt("secret")
            .unwrap();
        assert!(TokenCrypto::from_secret("key-b").unwrap().decrypt(&blob).is_err());
    }

    #[test]
    fn oauth_state_is_unique_and_verifiable() {
        let a = generate_oauth_state();
        let b = generate_oauth_state();
        assert_ne!(a, b);
        // 32 bytes of entropy, URL-safe without padding.
        assert_eq!(a.len(), 43);

        let hash = hash_state(&a);
        assert!(verify_state(&a, &hash));
        assert!(!verify_state(&b, &hash));
        assert!(!verify_state(&a, "not-a-hash"));
    }
}
