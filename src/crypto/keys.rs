use p256::ecdsa::signature::DigestSigner;
use p256::ecdsa::{Signature, SigningKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::CryptoError;

pub const SCALAR_SIZE: usize = 32;
pub const PUBKEY_SIZE: usize = 65;

/// Mint a fresh P-256 keypair: 32-byte scalar plus the uncompressed SEC1
/// point (0x04 || x || y).
pub fn generate() -> (Zeroizing<[u8; SCALAR_SIZE]>, [u8; PUBKEY_SIZE]) {
    let key = SigningKey::random(&mut OsRng);
    let scalar = Zeroizing::new(key.to_bytes().into());
    let point = key.verifying_key().to_encoded_point(false);
    let pubkey: [u8; PUBKEY_SIZE] = point
        .as_bytes()
        .try_into()
        .expect("uncompressed P-256 point is 65 bytes");
    (scalar, pubkey)
}

/// Reconstruct a signing key from a 32-byte scalar (the key-handle payload).
pub fn import(scalar: &[u8]) -> Result<SigningKey, CryptoError> {
    SigningKey::from_slice(scalar).map_err(|_| CryptoError::InvalidScalar)
}

/// ECDSA over the SHA-256 digest of `msg`, DER-encoded.
pub fn sign(key: &SigningKey, msg: &[u8]) -> Vec<u8> {
    let signature: Signature = key.sign_digest(Sha256::new_with_prefix(msg));
    signature.to_der().as_bytes().to_vec()
}
