use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, OsRng},
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{AppError, Result};

/// The size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// The size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// The size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// A secure key wrapper that ensures the key is zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecureKey([u8; KEY_SIZE]);

impl SecureKey {
    /// Creates a new `SecureKey` from a byte array.
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self(key)
    }

    /// Returns a reference to the key as a byte slice.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

/// Generates a new random AES-256 key.
pub fn generate_key() -> SecureKey {
    let mut key = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    SecureKey::new(key)
}

/// Generates a new random AES-GCM nonce.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypts a plaintext using AES-256-GCM with a fresh random nonce.
///
/// Returns the nonce, the detached authentication tag, and the ciphertext
/// as separate buffers so callers control how the three are framed.
pub fn encrypt(
    key: &[u8; KEY_SIZE],
    plaintext: &[u8],
) -> Result<([u8; NONCE_SIZE], Vec<u8>, Vec<u8>)> {
    let cipher = Aes256Gcm::new(key.into());

    let nonce_bytes = generate_nonce();
    let nonce = Nonce::from(nonce_bytes);

    let mut ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| AppError::Encryption(format!("Encryption failed: {}", e)))?;

    // aes-gcm appends the tag to the ciphertext; detach it.
    let tag = ciphertext.split_off(ciphertext.len() - TAG_SIZE);

    Ok((nonce_bytes, tag, ciphertext))
}

/// Decrypts a ciphertext using AES-256-GCM.
///
/// Fails whenever the authentication tag does not verify; no partially
/// decrypted data is ever returned.
pub fn decrypt(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    tag: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    if tag.len() != TAG_SIZE {
        return Err(AppError::Encryption(format!(
            "Invalid authentication tag length: {}",
            tag.len()
        )));
    }

    let cipher = Aes256Gcm::new(key.into());
    let nonce = Nonce::from(*nonce);

    let mut combined = Vec::with_capacity(ciphertext.len() + TAG_SIZE);
    combined.extend_from_slice(ciphertext);
    combined.extend_from_slice(tag);

    cipher
        .decrypt(&nonce, combined.as_slice())
        .map_err(|e| AppError::Encryption(format!("Decryption failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = generate_key();
        let (nonce, tag, ciphertext) = encrypt(key.as_bytes(), b"creator token").unwrap();
        assert_eq!(tag.len(), TAG_SIZE);

        let plaintext = decrypt(key.as_bytes(), &nonce, &tag, &ciphertext).unwrap();
        assert_eq!(plaintext, b"creator token");
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let key = generate_key();
        let (nonce, tag, mut ciphertext) = encrypt(key.as_bytes(), b"creator token").unwrap();
        ciphertext[0] ^= 0x01;

        assert!(decrypt(key.as_bytes(), &nonce, &tag, &ciphertext).is_err());
    }

    #[test]
    fn tampered_tag_is_rejected() {
        let key = generate_key();
        let (nonce, mut tag, ciphertext) = encrypt(key.as_bytes(), b"creator token").unwrap();
        tag[0] ^= 0x01;

        assert!(decrypt(key.as_bytes(), &nonce, &tag, &ciphertext).is_err());
    }

    #[test]
    fn wrong_key_is_rejected() {
        let key = generate_key();
        let other = generate_key();
        let (nonce, tag, ciphertext) = encrypt(key.as_bytes(), b"creator token").unwrap();

        assert!(decrypt(other.as_bytes(), &nonce, &tag, &ciphertext).is_err());
    }

    #[test]
    fn nonces_are_randomized_per_call() {
        let key = generate_key();
        let (nonce_a, _, ct_a) = encrypt(key.as_bytes(), b"same input").unwrap();
        let (nonce_b, _, ct_b) = encrypt(key.as_bytes(), b"same input").unwrap();

        assert_ne!(nonce_a, nonce_b);
        assert_ne!(ct_a, ct_b);
    }
}
