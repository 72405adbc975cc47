//! Root-key and chain-key derivation for the ratchet engine.
//!
//! Two constructions, per the Double Ratchet design:
//!
//! - **DH ratchet**: [`RootKey::create_chain`] folds a fresh DH output into
//!   the root key via HKDF-SHA256, yielding the next root key and a new
//!   chain key.
//! - **Symmetric ratchet**: [`ChainKey`] steps forward with
//!   `CK' = HMAC(CK, 0x02)` and derives per-message key material from
//!   `HMAC(CK, 0x01)`. There is no backward step.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{SymmetricKey, NONCE_LEN};
use crate::keys::{DhOutput, KeyPair, PublicKey};

const ROOT_INFO: &[u8] = b"Signal_DoubleRatchet_Root";
const MESSAGE_KEYS_INFO: &[u8] = b"Signal_DoubleRatchet_MessageKeys";

const MESSAGE_KEY_SEED: &[u8] = &[0x01];
const CHAIN_KEY_SEED: &[u8] = &[0x02];

type HmacSha256 = Hmac<Sha256>;

/// `HMAC-SHA256(key, data)` as a 32-byte array.
///
/// # Panics
///
/// Never panics in practice. HMAC-SHA256 accepts keys of any size,
/// so the internal `expect()` is only a defensive safeguard.
#[must_use]
pub(crate) fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac =
        HmacSha256::new_from_slice(key).expect("HMAC-SHA256 accepts any key size");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Root key driving DH-ratchet steps.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RootKey {
    key: SymmetricKey,
}

impl RootKey {
    /// Wraps a 32-byte secret as a root key.
    #[must_use]
    pub fn new(key: SymmetricKey) -> Self {
        Self { key }
    }

    /// Raw root key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.key.as_bytes()
    }

    /// Performs one DH-ratchet step.
    ///
    /// Computes `(RK', CK) = HKDF(salt = RK, ikm = DH(our, their))` and
    /// returns the successor root key plus a fresh chain key at index 0.
    ///
    /// # Panics
    ///
    /// Never panics in practice. The internal `expect()` is only a safeguard
    /// for the HKDF expand operation with a fixed 64-byte output length,
    /// which is always valid.
    #[must_use]
    pub fn create_chain(&self, their_ratchet_key: &PublicKey, our_ratchet_key: &KeyPair) -> (RootKey, ChainKey) {
        let dh_output: DhOutput = our_ratchet_key.secret_key().diffie_hellman(their_ratchet_key);

        let hkdf = Hkdf::<Sha256>::new(Some(self.key.as_bytes()), dh_output.as_bytes());
        let mut output = [0u8; 64];
        // SAFETY: 64-byte output is always valid for HKDF-SHA256
        hkdf.expand(ROOT_INFO, &mut output)
            .expect("64-byte HKDF output is always valid");

        let mut root_bytes = [0u8; 32];
        root_bytes.copy_from_slice(&output[..32]);
        let mut chain_bytes = [0u8; 32];
        chain_bytes.copy_from_slice(&output[32..]);
        output.zeroize();

        (
            RootKey::new(SymmetricKey::from_bytes(root_bytes)),
            ChainKey::new(SymmetricKey::from_bytes(chain_bytes), 0),
        )
    }
}

impl std::fmt::Debug for RootKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RootKey([REDACTED])")
    }
}

/// Chain key at a specific index of a sending or receiving chain.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ChainKey {
    key: SymmetricKey,
    #[zeroize(skip)]
    index: u32,
}

impl ChainKey {
    /// Wraps a chain-key secret at the given index.
    #[must_use]
    pub fn new(key: SymmetricKey, index: u32) -> Self {
        Self { key, index }
    }

    /// The chain index this key produces message keys for.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Raw chain-key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.key.as_bytes()
    }

    /// Advances the chain one step: `CK' = HMAC(CK, 0x02)`, index + 1.
    #[must_use]
    pub fn next(&self) -> ChainKey {
        ChainKey::new(
            SymmetricKey::from_bytes(hmac_sha256(self.key.as_bytes(), CHAIN_KEY_SEED)),
            self.index + 1,
        )
    }

    /// Derives the message keys for this chain position without advancing.
    #[must_use]
    pub fn message_keys(&self) -> MessageKeys {
        let seed = hmac_sha256(self.key.as_bytes(), MESSAGE_KEY_SEED);
        MessageKeys::derive(&seed, MESSAGE_KEYS_INFO, self.index)
    }
}

impl std::fmt::Debug for ChainKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChainKey(index: {}, [REDACTED])", self.index)
    }
}

/// Single-use per-message key material: cipher key, nonce, and the chain
/// index that produced it.
///
/// Consumed on decryption; callers holding a returned copy may re-decrypt
/// the same ciphertext (see `SessionCipher::decrypt_with_key`) but must
/// never feed it back into an encrypt path.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MessageKeys {
    cipher_key: SymmetricKey,
    #[zeroize(skip)]
    nonce: [u8; NONCE_LEN],
    #[zeroize(skip)]
    index: u32,
}

impl MessageKeys {
    /// Expands a chain-step seed into cipher key and nonce.
    ///
    /// # Panics
    ///
    /// Never panics in practice. The internal `expect()` is only a safeguard
    /// for the HKDF expand operation with a fixed 44-byte output length,
    /// which is always valid.
    #[must_use]
    pub(crate) fn derive(seed: &[u8; 32], info: &[u8], index: u32) -> Self {
        let hkdf = Hkdf::<Sha256>::new(None, seed);
        let mut output = [0u8; 32 + NONCE_LEN];
        // SAFETY: 44-byte output is always valid for HKDF-SHA256
        hkdf.expand(info, &mut output)
            .expect("44-byte HKDF output is always valid");

        let mut cipher_bytes = [0u8; 32];
        cipher_bytes.copy_from_slice(&output[..32]);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&output[32..]);
        output.zeroize();

        Self {
            cipher_key: SymmetricKey::from_bytes(cipher_bytes),
            nonce,
            index,
        }
    }

    /// The AEAD key for this message.
    #[must_use]
    pub fn cipher_key(&self) -> &SymmetricKey {
        &self.cipher_key
    }

    /// The AEAD nonce for this message.
    #[must_use]
    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    /// The chain index that produced this key.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl std::fmt::Debug for MessageKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MessageKeys(index: {}, [REDACTED])", self.index)
    }
}
