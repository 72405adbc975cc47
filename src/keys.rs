//! Cryptographic key types with memory safety guarantees.

use crate::error::{Result, SignalError};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::CryptoRngCore;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Key length shared by every 256-bit key in the protocol
pub const KEY_LEN: usize = 32;

/// Curve25519 public key (32 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; KEY_LEN]);

impl PublicKey {
    /// Size in bytes
    pub const SIZE: usize = KEY_LEN;

    /// Create from raw bytes
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Create from a byte slice, rejecting wrong lengths
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| SignalError::InvalidKey)?;
        Ok(Self(bytes))
    }

    /// Get raw bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub(crate) fn to_x25519(self) -> X25519PublicKey {
        X25519PublicKey::from(self.0)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

impl From<X25519PublicKey> for PublicKey {
    fn from(pk: X25519PublicKey) -> Self {
        Self(*pk.as_bytes())
    }
}

impl From<&StaticSecret> for PublicKey {
    fn from(secret: &StaticSecret) -> Self {
        PublicKey::from(X25519PublicKey::from(secret))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = <[u8; 32]>::deserialize(deserializer)?;
        Ok(Self::from_bytes(bytes))
    }
}

/// X25519 secret key with automatic zeroization
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey(StaticSecret);

impl SecretKey {
    /// Generate a new random secret key
    pub fn generate<R: CryptoRngCore>(rng: &mut R) -> Self {
        Self(StaticSecret::random_from_rng(rng))
    }

    /// Create from raw bytes (must be 32 bytes)
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Get raw bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        self.0.as_bytes()
    }

    /// Get the corresponding public key
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(&self.0)
    }

    /// Perform Diffie-Hellman key agreement
    #[must_use]
    pub fn diffie_hellman(&self, public: &PublicKey) -> DhOutput {
        let shared = self.0.diffie_hellman(&public.to_x25519());
        DhOutput(*shared.as_bytes())
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey([REDACTED])")
    }
}

/// Output of Diffie-Hellman operation (32 bytes)
/// Automatically zeroized on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DhOutput(pub(crate) [u8; KEY_LEN]);

impl DhOutput {
    /// Returns a byte slice of the Diffie-Hellman operation output
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for DhOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DhOutput([REDACTED])")
    }
}

/// Curve25519 agreement key pair
#[derive(Clone, Debug)]
pub struct KeyPair {
    public: PublicKey,
    secret: SecretKey,
}

impl KeyPair {
    /// Generate a fresh key pair
    pub fn generate<R: CryptoRngCore>(rng: &mut R) -> Self {
        let secret = SecretKey::generate(rng);
        Self {
            public: secret.public_key(),
            secret,
        }
    }

    /// Assemble a pair from an existing secret key
    #[must_use]
    pub fn from_secret(secret: SecretKey) -> Self {
        Self {
            public: secret.public_key(),
            secret,
        }
    }

    /// The public half
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// The secret half
    #[must_use]
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }
}

/// A remote party's long-term identity public key.
///
/// The identity key is a Curve25519 key used both for X25519 agreement and
/// for XEdDSA signatures over signed prekeys.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IdentityKey(PublicKey);

impl IdentityKey {
    /// Wraps a Curve25519 public key as an identity key
    #[must_use]
    pub fn new(public: PublicKey) -> Self {
        Self(public)
    }

    /// The underlying agreement key
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.0
    }

    /// Raw key bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        self.0.as_bytes()
    }
}

impl From<PublicKey> for IdentityKey {
    fn from(public: PublicKey) -> Self {
        Self(public)
    }
}

/// The local device's long-term identity key pair, immutable once generated.
#[derive(Clone, Debug)]
pub struct IdentityKeyPair {
    identity_key: IdentityKey,
    secret: SecretKey,
}

impl IdentityKeyPair {
    /// Generate a new identity key pair
    pub fn generate<R: CryptoRngCore>(rng: &mut R) -> Self {
        let secret = SecretKey::generate(rng);
        Self {
            identity_key: IdentityKey::new(secret.public_key()),
            secret,
        }
    }

    /// Assemble an identity pair from an existing secret key
    #[must_use]
    pub fn from_secret(secret: SecretKey) -> Self {
        Self {
            identity_key: IdentityKey::new(secret.public_key()),
            secret,
        }
    }

    /// The public identity key
    #[must_use]
    pub fn identity_key(&self) -> &IdentityKey {
        &self.identity_key
    }

    /// The agreement secret
    #[must_use]
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }
}

/// Ed25519 signing key pair authenticating a group sender's messages.
///
/// The verification key travels in the sender key distribution message; the
/// signing half never leaves the originating device.
#[derive(Clone)]
pub struct SigningKeyPair {
    signing: SigningKey,
    verifying: VerifyingKey,
}

impl SigningKeyPair {
    /// Generate a new random signing key pair
    pub fn generate<R: CryptoRngCore>(rng: &mut R) -> Self {
        let signing = SigningKey::generate(rng);
        let verifying = signing.verifying_key();
        Self { signing, verifying }
    }

    /// Rebuild a pair from signing key bytes
    #[must_use]
    pub fn from_bytes(bytes: &[u8; KEY_LEN]) -> Self {
        let signing = SigningKey::from_bytes(bytes);
        let verifying = signing.verifying_key();
        Self { signing, verifying }
    }

    /// Sign a message
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }

    /// Get verifying key as bytes
    #[must_use]
    pub fn verifying_key_bytes(&self) -> [u8; KEY_LEN] {
        self.verifying.to_bytes()
    }

    /// Raw signing key bytes
    #[must_use]
    pub fn to_bytes(&self) -> [u8; KEY_LEN] {
        self.signing.to_bytes()
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKeyPair([REDACTED])")
    }
}

/// Verify an Ed25519 signature
pub fn verify_ed25519(public_key: &[u8; 32], message: &[u8], signature: &[u8; 64]) -> Result<()> {
    let verifying_key =
        VerifyingKey::from_bytes(public_key).map_err(|_| SignalError::InvalidKey)?;
    let sig = Signature::from_bytes(signature);
    verifying_key
        .verify(message, &sig)
        .map_err(|_| SignalError::InvalidSignature)
}
