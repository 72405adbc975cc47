//! AEAD primitives shared by the session and group ciphers.
//!
//! Message bodies are sealed with ChaCha20-Poly1305; the serialized message
//! header rides along as associated data, so header tampering fails
//! authentication exactly like ciphertext tampering.

use chacha20poly1305::{
    aead::{Aead, Payload},
    ChaCha20Poly1305, Key, KeyInit, Nonce,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, SignalError};

/// AEAD nonce length (96 bits)
pub const NONCE_LEN: usize = 12;

/// Poly1305 authentication tag length appended to every ciphertext
pub const TAG_LEN: usize = 16;

/// 256-bit symmetric key with automatic zeroization on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; 32]);

impl SymmetricKey {
    /// Creates a symmetric key from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the key as a byte array reference.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymmetricKey([REDACTED])")
    }
}

/// Encrypts and authenticates `plaintext`, binding `associated_data`.
///
/// Returns ciphertext with the 16-byte tag appended. Each message key is
/// used for exactly one message, so the derived nonce cannot repeat under
/// the same key.
pub fn seal(
    key: &SymmetricKey,
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
    associated_data: &[u8],
) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad: associated_data,
            },
        )
        .map_err(|_| SignalError::InvalidMessage("encryption failed"))
}

/// Verifies the tag (in constant time) and decrypts.
///
/// Fails when the key or nonce is wrong, the ciphertext was modified, or
/// `associated_data` differs from what was bound at seal time.
pub fn open(
    key: &SymmetricKey,
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    associated_data: &[u8],
) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: associated_data,
            },
        )
        .map_err(|_| SignalError::InvalidMessage("authentication failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = SymmetricKey::from_bytes([1u8; 32]);
        let nonce = [2u8; NONCE_LEN];

        let ciphertext = seal(&key, &nonce, b"Hello, World!", b"header").unwrap();
        assert_eq!(ciphertext.len(), 13 + TAG_LEN);

        let plaintext = open(&key, &nonce, &ciphertext, b"header").unwrap();
        assert_eq!(&plaintext, b"Hello, World!");
    }

    #[test]
    fn open_rejects_wrong_key() {
        let key = SymmetricKey::from_bytes([1u8; 32]);
        let other = SymmetricKey::from_bytes([2u8; 32]);
        let nonce = [3u8; NONCE_LEN];

        let ciphertext = seal(&key, &nonce, b"secret", b"").unwrap();
        assert!(open(&other, &nonce, &ciphertext, b"").is_err());
    }

    #[test]
    fn open_rejects_tampered_ciphertext() {
        let key = SymmetricKey::from_bytes([1u8; 32]);
        let nonce = [3u8; NONCE_LEN];

        let mut ciphertext = seal(&key, &nonce, b"secret", b"").unwrap();
        ciphertext[0] ^= 0x01;
        assert!(open(&key, &nonce, &ciphertext, b"").is_err());
    }

    #[test]
    fn open_rejects_wrong_associated_data() {
        let key = SymmetricKey::from_bytes([1u8; 32]);
        let nonce = [3u8; NONCE_LEN];

        let ciphertext = seal(&key, &nonce, b"secret", b"header v1").unwrap();
        assert!(open(&key, &nonce, &ciphertext, b"header v2").is_err());
    }
}
