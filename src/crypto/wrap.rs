use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use rand::RngCore;
use zeroize::Zeroizing;

use super::CryptoError;

pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;

/// Authenticated wrapping of key-handle payloads under the authenticator's
/// fixed AES-256 key. Handle layout: nonce(12) || ciphertext || tag(16), so
/// a wrapped handle is exactly 28 bytes longer than its plaintext.
pub struct KeyWrap {
    cipher: Aes256Gcm,
}

impl KeyWrap {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    pub fn wrap(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| CryptoError::Wrap)?;

        let mut handle = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        handle.extend_from_slice(&nonce_bytes);
        handle.extend_from_slice(&ciphertext);
        Ok(handle)
    }

    /// The GCM tag authenticates the handle: tampered or foreign handles
    /// fail here rather than yielding garbage plaintext.
    pub fn unwrap(&self, handle: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        if handle.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Unwrap);
        }
        let (nonce_bytes, ciphertext) = handle.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::Unwrap)
    }
}
