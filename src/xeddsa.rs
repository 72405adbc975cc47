//! XEdDSA signatures with Curve25519 agreement keys.
//!
//! Lets the long-term identity key, an X25519 key, produce and verify
//! EdDSA-style signatures without a separate signing key. Used to sign the
//! signed prekey in published bundles.
//!
//! Reference: "The XEdDSA and VXEdDSA Signature Schemes" (Perrin, 2016).

use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::MontgomeryPoint;
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::{Result, SignalError};
use crate::keys::{PublicKey, SecretKey};

/// XEdDSA signature length: R point (32) || s scalar (32)
pub const SIGNATURE_LEN: usize = 64;

/// Signs `message` with an X25519 secret key.
///
/// `random` must be 64 bytes of fresh randomness per signature; it blinds
/// the nonce so the same (key, message) pair never yields the same nonce.
#[must_use]
pub fn sign(signing_key: &SecretKey, message: &[u8], random: &[u8; 64]) -> [u8; SIGNATURE_LEN] {
    let (a, public) = signing_scalar(signing_key);

    // r = hash1(a || M || Z) (mod q), with the 0xFE || 0xFF^31 domain prefix
    let mut hasher = Sha512::new();
    hasher.update([0xFE]);
    hasher.update([0xFF; 31]);
    hasher.update(a.as_bytes());
    hasher.update(message);
    hasher.update(random);
    let r = Scalar::from_bytes_mod_order_wide(&hasher.finalize().into());

    // R = rB
    let r_point = (&r * ED25519_BASEPOINT_TABLE).compress();

    // h = hash(R || A || M) (mod q)
    let h = challenge(&r_point, &public, message);

    // s = r + ha (mod q)
    let s = r + (h * a);

    let mut signature = [0u8; SIGNATURE_LEN];
    signature[..32].copy_from_slice(r_point.as_bytes());
    signature[32..].copy_from_slice(s.as_bytes());
    signature
}

/// Verifies an XEdDSA signature made by the holder of `signer`'s X25519 key.
pub fn verify(signer: &PublicKey, message: &[u8], signature: &[u8; SIGNATURE_LEN]) -> Result<()> {
    let public = edwards_from_montgomery(signer)?;

    let mut r_bytes = [0u8; 32];
    r_bytes.copy_from_slice(&signature[..32]);
    let r_compressed = CompressedEdwardsY(r_bytes);
    if r_compressed.decompress().is_none() {
        return Err(SignalError::InvalidSignature);
    }

    let mut s_bytes = [0u8; 32];
    s_bytes.copy_from_slice(&signature[32..]);
    // s must be fully reduced: for Curve25519, |q| = 253 bits
    if (s_bytes[31] & 0xE0) != 0 {
        return Err(SignalError::InvalidSignature);
    }
    let s = Scalar::from_bytes_mod_order(s_bytes);

    let a_point = public.decompress().ok_or(SignalError::InvalidKey)?;
    if !a_point.is_torsion_free() {
        return Err(SignalError::InvalidKey);
    }

    let h = challenge(&r_compressed, &public, message);

    // Rcheck = sB - hA
    let r_check = EdwardsPoint::vartime_double_scalar_mul_basepoint(&h, &-a_point, &s);

    if r_check.compress().as_bytes().ct_eq(&r_bytes).into() {
        Ok(())
    } else {
        Err(SignalError::InvalidSignature)
    }
}

/// Derives the Ed25519 signing scalar and public point from an X25519 key.
///
/// The scalar is negated when kB has its sign bit set, so that the public
/// point always carries sign bit 0 and matches the point a verifier derives
/// from the Montgomery form alone.
fn signing_scalar(signing_key: &SecretKey) -> (Scalar, CompressedEdwardsY) {
    let mut k_clamped = *signing_key.as_bytes();
    k_clamped[0] &= 248;
    k_clamped[31] &= 127;
    k_clamped[31] |= 64;

    let k = Scalar::from_bytes_mod_order(k_clamped);
    k_clamped.zeroize();

    let e_compressed = (&k * ED25519_BASEPOINT_TABLE).compress();
    let sign_bit = (e_compressed.as_bytes()[31] >> 7) & 1;

    let a = if sign_bit == 1 { -k } else { k };

    let mut a_bytes = *e_compressed.as_bytes();
    a_bytes[31] &= 0x7F;

    (a, CompressedEdwardsY(a_bytes))
}

/// Maps a Montgomery-form public key to its sign-0 Edwards equivalent.
fn edwards_from_montgomery(public: &PublicKey) -> Result<CompressedEdwardsY> {
    let mut u_masked = *public.as_bytes();
    u_masked[31] &= 0x7F;

    let edwards = MontgomeryPoint(u_masked)
        .to_edwards(0)
        .ok_or(SignalError::InvalidKey)?;

    let mut bytes = *edwards.compress().as_bytes();
    bytes[31] &= 0x7F;
    Ok(CompressedEdwardsY(bytes))
}

/// h = hash(R || A || M) (mod q)
fn challenge(r: &CompressedEdwardsY, a: &CompressedEdwardsY, message: &[u8]) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update(r.as_bytes());
    hasher.update(a.as_bytes());
    hasher.update(message);
    Scalar::from_bytes_mod_order_wide(&hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::{OsRng, RngCore};

    fn random_bytes() -> [u8; 64] {
        let mut random = [0u8; 64];
        OsRng.fill_bytes(&mut random);
        random
    }

    #[test]
    fn sign_and_verify() {
        let secret = SecretKey::generate(&mut OsRng);
        let public = secret.public_key();

        let signature = sign(&secret, b"signed prekey material", &random_bytes());
        verify(&public, b"signed prekey material", &signature).unwrap();
    }

    #[test]
    fn rejects_wrong_message() {
        let secret = SecretKey::generate(&mut OsRng);
        let signature = sign(&secret, b"original", &random_bytes());

        assert!(verify(&secret.public_key(), b"altered", &signature).is_err());
    }

    #[test]
    fn rejects_wrong_signer() {
        let secret = SecretKey::generate(&mut OsRng);
        let other = SecretKey::generate(&mut OsRng);
        let signature = sign(&secret, b"message", &random_bytes());

        assert!(verify(&other.public_key(), b"message", &signature).is_err());
    }

    #[test]
    fn rejects_corrupted_signature() {
        let secret = SecretKey::generate(&mut OsRng);
        let mut signature = sign(&secret, b"message", &random_bytes());
        signature[7] ^= 0x01;

        assert!(verify(&secret.public_key(), b"message", &signature).is_err());
    }

    #[test]
    fn rejects_unreduced_scalar() {
        let secret = SecretKey::generate(&mut OsRng);
        let mut signature = sign(&secret, b"message", &random_bytes());
        // force s >= 2^253
        signature[63] |= 0xE0;

        assert_eq!(
            verify(&secret.public_key(), b"message", &signature),
            Err(SignalError::InvalidSignature)
        );
    }

    #[test]
    fn distinct_randomness_distinct_signatures() {
        let secret = SecretKey::generate(&mut OsRng);
        let sig1 = sign(&secret, b"message", &random_bytes());
        let sig2 = sign(&secret, b"message", &random_bytes());

        assert_ne!(sig1, sig2);
        verify(&secret.public_key(), b"message", &sig1).unwrap();
        verify(&secret.public_key(), b"message", &sig2).unwrap();
    }
}
