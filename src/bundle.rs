//! Published prekey bundles.

use crate::error::Result;
use crate::keys::{IdentityKey, PublicKey};
use crate::xeddsa::{self, SIGNATURE_LEN};

/// The public material a device publishes so peers can initiate sessions
/// asynchronously.
///
/// Assembled by a directory service from the device's registration data and
/// prekey records; this crate only consumes it.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PreKeyBundle {
    registration_id: u32,
    device_id: u32,
    pre_key: Option<(u32, PublicKey)>,
    signed_pre_key_id: u32,
    signed_pre_key: PublicKey,
    #[cfg_attr(feature = "serde", serde(with = "serde_arrays"))]
    signed_pre_key_signature: [u8; SIGNATURE_LEN],
    identity_key: IdentityKey,
}

impl PreKeyBundle {
    /// Assembles a bundle.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registration_id: u32,
        device_id: u32,
        pre_key: Option<(u32, PublicKey)>,
        signed_pre_key_id: u32,
        signed_pre_key: PublicKey,
        signed_pre_key_signature: [u8; SIGNATURE_LEN],
        identity_key: IdentityKey,
    ) -> Self {
        Self {
            registration_id,
            device_id,
            pre_key,
            signed_pre_key_id,
            signed_pre_key,
            signed_pre_key_signature,
            identity_key,
        }
    }

    /// The publishing device's registration ID.
    #[must_use]
    pub fn registration_id(&self) -> u32 {
        self.registration_id
    }

    /// The publishing device's device ID.
    #[must_use]
    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    /// Optional one-time prekey: ID and public key.
    #[must_use]
    pub fn pre_key(&self) -> Option<(u32, PublicKey)> {
        self.pre_key
    }

    /// The signed prekey ID.
    #[must_use]
    pub fn signed_pre_key_id(&self) -> u32 {
        self.signed_pre_key_id
    }

    /// The signed prekey public key.
    #[must_use]
    pub fn signed_pre_key(&self) -> &PublicKey {
        &self.signed_pre_key
    }

    /// The identity key's XEdDSA signature over the signed prekey.
    #[must_use]
    pub fn signed_pre_key_signature(&self) -> &[u8; SIGNATURE_LEN] {
        &self.signed_pre_key_signature
    }

    /// The publisher's long-term identity key.
    #[must_use]
    pub fn identity_key(&self) -> &IdentityKey {
        &self.identity_key
    }

    /// Verifies the signed-prekey signature against the bundle's identity
    /// key.
    ///
    /// A bundle whose signature does not verify must never seed a session:
    /// an attacker could otherwise substitute their own signed prekey.
    pub fn verify_signature(&self) -> Result<()> {
        xeddsa::verify(
            self.identity_key.public_key(),
            self.signed_pre_key.as_bytes(),
            &self.signed_pre_key_signature,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{IdentityKeyPair, KeyPair};
    use rand_core::{OsRng, RngCore};

    fn signed_bundle() -> PreKeyBundle {
        let identity = IdentityKeyPair::generate(&mut OsRng);
        let signed_pre_key = KeyPair::generate(&mut OsRng);

        let mut random = [0u8; 64];
        OsRng.fill_bytes(&mut random);
        let signature = xeddsa::sign(
            identity.secret_key(),
            signed_pre_key.public_key().as_bytes(),
            &random,
        );

        PreKeyBundle::new(
            1,
            1,
            Some((10, KeyPair::generate(&mut OsRng).public_key())),
            22,
            signed_pre_key.public_key(),
            signature,
            *identity.identity_key(),
        )
    }

    #[test]
    fn valid_signature_verifies() {
        assert!(signed_bundle().verify_signature().is_ok());
    }

    #[test]
    fn corrupted_signature_rejected() {
        let mut bundle = signed_bundle();
        bundle.signed_pre_key_signature[0] ^= 0xFF;
        assert!(bundle.verify_signature().is_err());
    }

    #[test]
    fn substituted_identity_rejected() {
        let mut bundle = signed_bundle();
        let eve = IdentityKeyPair::generate(&mut OsRng);
        bundle.identity_key = *eve.identity_key();
        assert!(bundle.verify_signature().is_err());
    }
}
