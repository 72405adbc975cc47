//! Key generation utilities for device setup.
//!
//! Pure generation, no policy: when to rotate or replenish is the
//! caller's concern, as is persisting the results into the stores.

use std::time::{SystemTime, UNIX_EPOCH};

use rand_core::CryptoRngCore;

use crate::keys::{IdentityKeyPair, KeyPair};
use crate::record::{PreKeyRecord, SignedPreKeyRecord};
use crate::xeddsa;

/// Largest value prekey IDs wrap around at (2^24 - 1, keeping IDs inside
/// the range directory services conventionally accept).
const MAX_PRE_KEY_ID: u32 = 0x00FF_FFFF;

/// Largest registration ID handed out.
const MAX_REGISTRATION_ID: u32 = 16380;

/// Generates the device's long-term identity key pair.
pub fn generate_identity_key_pair<R: CryptoRngCore>(rng: &mut R) -> IdentityKeyPair {
    IdentityKeyPair::generate(rng)
}

/// Generates a registration ID in `1..=16380`.
pub fn generate_registration_id<R: CryptoRngCore>(rng: &mut R) -> u32 {
    (rng.next_u32() % MAX_REGISTRATION_ID) + 1
}

/// Generates `count` one-time prekey records with IDs starting at `start`,
/// wrapping inside `1..=0xFFFFFF`.
pub fn generate_pre_keys<R: CryptoRngCore>(
    rng: &mut R,
    start: u32,
    count: u32,
) -> Vec<PreKeyRecord> {
    (0..count)
        .map(|offset| {
            let id = ((start.wrapping_add(offset).wrapping_sub(1)) % MAX_PRE_KEY_ID) + 1;
            PreKeyRecord::new(id, KeyPair::generate(rng))
        })
        .collect()
}

/// Generates a signed prekey record, signing its public key with the
/// identity key and stamping the current time.
pub fn generate_signed_pre_key<R: CryptoRngCore>(
    rng: &mut R,
    identity: &IdentityKeyPair,
    id: u32,
) -> SignedPreKeyRecord {
    let key_pair = KeyPair::generate(rng);

    let mut random = [0u8; 64];
    rng.fill_bytes(&mut random);
    let signature = xeddsa::sign(
        identity.secret_key(),
        key_pair.public_key().as_bytes(),
        &random,
    );

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);

    SignedPreKeyRecord::new(id, timestamp, key_pair, signature)
}
