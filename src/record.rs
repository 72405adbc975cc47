//! Stored prekey records.
//!
//! What the prekey and signed-prekey stores hold: the local secret halves
//! of published prekeys, addressed by numeric ID.

use crate::keys::KeyPair;
use crate::xeddsa::SIGNATURE_LEN;

/// One-time prekey: consumed (removed from its store) after a single
/// session establishment references it.
#[derive(Clone, Debug)]
pub struct PreKeyRecord {
    id: u32,
    key_pair: KeyPair,
}

impl PreKeyRecord {
    /// Wraps a key pair under a numeric prekey ID.
    #[must_use]
    pub fn new(id: u32, key_pair: KeyPair) -> Self {
        Self { id, key_pair }
    }

    /// The prekey ID referenced by bundles and prekey messages.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The agreement key pair.
    #[must_use]
    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }
}

/// Medium-term signed prekey: reused across establishments until rotated.
///
/// Carries the XEdDSA signature its owner made over the public key with the
/// identity key, plus the creation timestamp rotation policy works from.
#[derive(Clone, Debug)]
pub struct SignedPreKeyRecord {
    id: u32,
    timestamp: u64,
    key_pair: KeyPair,
    signature: [u8; SIGNATURE_LEN],
}

impl SignedPreKeyRecord {
    /// Wraps a signed prekey with its ID, unix-seconds timestamp, and
    /// signature.
    #[must_use]
    pub fn new(id: u32, timestamp: u64, key_pair: KeyPair, signature: [u8; SIGNATURE_LEN]) -> Self {
        Self {
            id,
            timestamp,
            key_pair,
            signature,
        }
    }

    /// The signed prekey ID.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Creation time, unix seconds.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// The agreement key pair.
    #[must_use]
    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// The identity key's signature over the public key.
    #[must_use]
    pub fn signature(&self) -> &[u8; SIGNATURE_LEN] {
        &self.signature
    }
}
