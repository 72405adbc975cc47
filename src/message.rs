//! Protocol wire messages.
//!
//! Four binary, version-tagged message kinds: the plain ratchet message,
//! its prekey-wrapped variant carrying X3DH bootstrap material, the group
//! sender-key message, and the sender-key distribution message. Layouts are
//! little-endian with strict bounds checks; unknown versions are rejected
//! before any field is interpreted.

use crate::crypto::TAG_LEN;
use crate::error::{Result, SignalError};
use crate::keys::{IdentityKey, PublicKey};

/// Wire version implemented by this crate.
pub const CIPHERTEXT_VERSION: u8 = 3;

/// Version byte: current version in the high nibble, minimum supported in
/// the low nibble.
const VERSION_BYTE: u8 = (CIPHERTEXT_VERSION << 4) | CIPHERTEXT_VERSION;

/// Ed25519 signature length on sender-key messages
pub const SIGNATURE_LEN: usize = 64;

fn check_version(byte: u8) -> Result<()> {
    let version = byte >> 4;
    if version == CIPHERTEXT_VERSION {
        Ok(())
    } else {
        Err(SignalError::LegacyMessage(version))
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    let slice = bytes
        .get(offset..offset + 4)
        .ok_or(SignalError::InvalidMessage("truncated message"))?;
    Ok(u32::from_le_bytes(slice.try_into().map_err(|_| {
        SignalError::InvalidMessage("truncated message")
    })?))
}

fn read_key(bytes: &[u8], offset: usize) -> Result<PublicKey> {
    let slice = bytes
        .get(offset..offset + 32)
        .ok_or(SignalError::InvalidMessage("truncated message"))?;
    PublicKey::try_from_slice(slice)
}

/// Plain Double Ratchet message.
///
/// Header (ratchet key, previous-chain counter, chain index) is carried in
/// the clear and bound into the AEAD tag as associated data.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SignalMessage {
    ratchet_key: PublicKey,
    counter: u32,
    previous_counter: u32,
    ciphertext: Vec<u8>,
}

impl SignalMessage {
    const HEADER_LEN: usize = 1 + 32 + 4 + 4;

    /// Assembles a ratchet message.
    #[must_use]
    pub fn new(
        ratchet_key: PublicKey,
        counter: u32,
        previous_counter: u32,
        ciphertext: Vec<u8>,
    ) -> Self {
        Self {
            ratchet_key,
            counter,
            previous_counter,
            ciphertext,
        }
    }

    /// The sender's current ratchet public key.
    #[must_use]
    pub fn ratchet_key(&self) -> &PublicKey {
        &self.ratchet_key
    }

    /// Index in the sending chain.
    #[must_use]
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Length of the previous sending chain.
    #[must_use]
    pub fn previous_counter(&self) -> u32 {
        self.previous_counter
    }

    /// Ciphertext with appended authentication tag.
    #[must_use]
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// The authenticated header: version, ratchet key, previous-chain
    /// counter, chain index.
    ///
    /// Used as AEAD associated data, so any header modification fails
    /// decryption.
    #[must_use]
    pub fn header_bytes(&self) -> [u8; Self::HEADER_LEN] {
        let mut header = [0u8; Self::HEADER_LEN];
        header[0] = VERSION_BYTE;
        header[1..33].copy_from_slice(self.ratchet_key.as_bytes());
        header[33..37].copy_from_slice(&self.previous_counter.to_le_bytes());
        header[37..41].copy_from_slice(&self.counter.to_le_bytes());
        header
    }

    /// Serializes for transmission.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::HEADER_LEN + self.ciphertext.len());
        bytes.extend_from_slice(&self.header_bytes());
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }

    /// Deserializes, rejecting unknown versions and truncated input.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::HEADER_LEN + TAG_LEN {
            return Err(SignalError::InvalidMessage("message too short"));
        }
        check_version(bytes[0])?;

        Ok(Self {
            ratchet_key: read_key(bytes, 1)?,
            previous_counter: read_u32(bytes, 33)?,
            counter: read_u32(bytes, 37)?,
            ciphertext: bytes[Self::HEADER_LEN..].to_vec(),
        })
    }
}

/// Prekey-wrapped ratchet message.
///
/// Carries the X3DH bootstrap material (registration ID, prekey IDs, base
/// key, identity key) alongside an embedded [`SignalMessage`], so the
/// responder can derive the session from this single message.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PreKeySignalMessage {
    registration_id: u32,
    pre_key_id: Option<u32>,
    signed_pre_key_id: u32,
    base_key: PublicKey,
    identity_key: IdentityKey,
    message: SignalMessage,
}

impl PreKeySignalMessage {
    /// Assembles a prekey message around an already-encrypted ratchet
    /// message.
    #[must_use]
    pub fn new(
        registration_id: u32,
        pre_key_id: Option<u32>,
        signed_pre_key_id: u32,
        base_key: PublicKey,
        identity_key: IdentityKey,
        message: SignalMessage,
    ) -> Self {
        Self {
            registration_id,
            pre_key_id,
            signed_pre_key_id,
            base_key,
            identity_key,
            message,
        }
    }

    /// The sender's registration ID.
    #[must_use]
    pub fn registration_id(&self) -> u32 {
        self.registration_id
    }

    /// ID of the one-time prekey consumed by this exchange, if one was used.
    #[must_use]
    pub fn pre_key_id(&self) -> Option<u32> {
        self.pre_key_id
    }

    /// ID of the signed prekey this exchange was computed against.
    #[must_use]
    pub fn signed_pre_key_id(&self) -> u32 {
        self.signed_pre_key_id
    }

    /// The sender's ephemeral base key from the X3DH agreement.
    #[must_use]
    pub fn base_key(&self) -> &PublicKey {
        &self.base_key
    }

    /// The sender's long-term identity key.
    #[must_use]
    pub fn identity_key(&self) -> &IdentityKey {
        &self.identity_key
    }

    /// The embedded ratchet message.
    #[must_use]
    pub fn message(&self) -> &SignalMessage {
        &self.message
    }

    /// Serializes for transmission.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let message_bytes = self.message.to_bytes();
        let mut bytes = Vec::with_capacity(78 + message_bytes.len());
        bytes.push(VERSION_BYTE);
        bytes.extend_from_slice(&self.registration_id.to_le_bytes());
        match self.pre_key_id {
            Some(id) => {
                bytes.push(1);
                bytes.extend_from_slice(&id.to_le_bytes());
            }
            None => bytes.push(0),
        }
        bytes.extend_from_slice(&self.signed_pre_key_id.to_le_bytes());
        bytes.extend_from_slice(self.base_key.as_bytes());
        bytes.extend_from_slice(self.identity_key.as_bytes());
        bytes.extend_from_slice(&message_bytes);
        bytes
    }

    /// Deserializes, rejecting unknown versions and truncated input.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 6 {
            return Err(SignalError::InvalidMessage("message too short"));
        }
        check_version(bytes[0])?;

        let registration_id = read_u32(bytes, 1)?;
        let (pre_key_id, mut offset) = match bytes[5] {
            0 => (None, 6),
            1 => (Some(read_u32(bytes, 6)?), 10),
            _ => return Err(SignalError::InvalidMessage("malformed prekey marker")),
        };

        let signed_pre_key_id = read_u32(bytes, offset)?;
        offset += 4;
        let base_key = read_key(bytes, offset)?;
        offset += 32;
        let identity_key = IdentityKey::new(read_key(bytes, offset)?);
        offset += 32;

        let message = SignalMessage::from_bytes(&bytes[offset..])?;

        Ok(Self {
            registration_id,
            pre_key_id,
            signed_pre_key_id,
            base_key,
            identity_key,
            message,
        })
    }
}

/// Either of the two one-to-one wire message kinds a `SessionCipher`
/// encrypt can emit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CiphertextMessage {
    /// Plain ratchet message for an established session
    Signal(SignalMessage),
    /// Prekey-wrapped message while awaiting the first reply
    PreKey(PreKeySignalMessage),
}

impl CiphertextMessage {
    /// Serializes whichever variant this is.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            CiphertextMessage::Signal(message) => message.to_bytes(),
            CiphertextMessage::PreKey(message) => message.to_bytes(),
        }
    }
}

/// The authenticated sender-key header for the given chain position; what
/// the group ciphers bind as AEAD associated data.
pub(crate) fn sender_key_header(group_id: &str, chain_id: u32, iteration: u32) -> Vec<u8> {
    let group = group_id.as_bytes();
    let mut header = Vec::with_capacity(11 + group.len());
    header.push(VERSION_BYTE);
    header.extend_from_slice(&(group.len() as u16).to_le_bytes());
    header.extend_from_slice(group);
    header.extend_from_slice(&chain_id.to_le_bytes());
    header.extend_from_slice(&iteration.to_le_bytes());
    header
}

/// Group message encrypted under a sender key chain and signed by the
/// sender's Ed25519 key.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SenderKeyMessage {
    group_id: String,
    chain_id: u32,
    iteration: u32,
    ciphertext: Vec<u8>,
    #[cfg_attr(feature = "serde", serde(with = "serde_arrays"))]
    signature: [u8; SIGNATURE_LEN],
}

impl SenderKeyMessage {
    /// Assembles a signed sender-key message. `sign` receives the exact
    /// bytes the signature must cover.
    #[must_use]
    pub fn new<F>(
        group_id: String,
        chain_id: u32,
        iteration: u32,
        ciphertext: Vec<u8>,
        sign: F,
    ) -> Self
    where
        F: FnOnce(&[u8]) -> [u8; SIGNATURE_LEN],
    {
        let mut message = Self {
            group_id,
            chain_id,
            iteration,
            ciphertext,
            signature: [0u8; SIGNATURE_LEN],
        };
        message.signature = sign(&message.signed_portion());
        message
    }

    /// The group this message belongs to.
    #[must_use]
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// The sender chain this message was encrypted under.
    #[must_use]
    pub fn chain_id(&self) -> u32 {
        self.chain_id
    }

    /// Position in the sender chain.
    #[must_use]
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Ciphertext with appended authentication tag.
    #[must_use]
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// The claimed signature over [`Self::signed_portion`].
    #[must_use]
    pub fn signature(&self) -> &[u8; SIGNATURE_LEN] {
        &self.signature
    }

    /// The authenticated header: version, group, chain ID, iteration.
    #[must_use]
    pub fn header_bytes(&self) -> Vec<u8> {
        sender_key_header(&self.group_id, self.chain_id, self.iteration)
    }

    /// Everything the Ed25519 signature covers: header plus ciphertext.
    #[must_use]
    pub fn signed_portion(&self) -> Vec<u8> {
        let mut bytes = self.header_bytes();
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }

    /// Serializes for transmission.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.signed_portion();
        bytes.extend_from_slice(&self.signature);
        bytes
    }

    /// Deserializes, rejecting unknown versions and truncated input.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 3 {
            return Err(SignalError::InvalidMessage("message too short"));
        }
        check_version(bytes[0])?;

        let group_len = u16::from_le_bytes([bytes[1], bytes[2]]) as usize;
        let header_len = 3 + group_len + 8;
        if bytes.len() < header_len + TAG_LEN + SIGNATURE_LEN {
            return Err(SignalError::InvalidMessage("message too short"));
        }

        let group_id = std::str::from_utf8(&bytes[3..3 + group_len])
            .map_err(|_| SignalError::InvalidMessage("malformed group id"))?
            .to_owned();
        let chain_id = read_u32(bytes, 3 + group_len)?;
        let iteration = read_u32(bytes, 3 + group_len + 4)?;

        let signature_offset = bytes.len() - SIGNATURE_LEN;
        let ciphertext = bytes[header_len..signature_offset].to_vec();
        let mut signature = [0u8; SIGNATURE_LEN];
        signature.copy_from_slice(&bytes[signature_offset..]);

        Ok(Self {
            group_id,
            chain_id,
            iteration,
            ciphertext,
            signature,
        })
    }
}

/// Bootstrap payload a group sender broadcasts so members can initialize a
/// receiving sender-key state for that sender's chain.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SenderKeyDistributionMessage {
    group_id: String,
    chain_id: u32,
    iteration: u32,
    chain_key: [u8; 32],
    signing_key: [u8; 32],
}

impl SenderKeyDistributionMessage {
    /// Assembles a distribution message.
    #[must_use]
    pub fn new(
        group_id: String,
        chain_id: u32,
        iteration: u32,
        chain_key: [u8; 32],
        signing_key: [u8; 32],
    ) -> Self {
        Self {
            group_id,
            chain_id,
            iteration,
            chain_key,
            signing_key,
        }
    }

    /// The group the advertised chain belongs to.
    #[must_use]
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// The advertised chain's ID.
    #[must_use]
    pub fn chain_id(&self) -> u32 {
        self.chain_id
    }

    /// Chain position the receiver should start from.
    #[must_use]
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// The chain key at [`Self::iteration`].
    #[must_use]
    pub fn chain_key(&self) -> &[u8; 32] {
        &self.chain_key
    }

    /// The sender's Ed25519 verification key.
    #[must_use]
    pub fn signing_key(&self) -> &[u8; 32] {
        &self.signing_key
    }

    /// Serializes for transmission.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let group = self.group_id.as_bytes();
        let mut bytes = Vec::with_capacity(75 + group.len());
        bytes.push(VERSION_BYTE);
        bytes.extend_from_slice(&(group.len() as u16).to_le_bytes());
        bytes.extend_from_slice(group);
        bytes.extend_from_slice(&self.chain_id.to_le_bytes());
        bytes.extend_from_slice(&self.iteration.to_le_bytes());
        bytes.extend_from_slice(&self.chain_key);
        bytes.extend_from_slice(&self.signing_key);
        bytes
    }

    /// Deserializes, rejecting unknown versions and truncated input.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 3 {
            return Err(SignalError::InvalidMessage("message too short"));
        }
        check_version(bytes[0])?;

        let group_len = u16::from_le_bytes([bytes[1], bytes[2]]) as usize;
        let expected_len = 3 + group_len + 8 + 64;
        if bytes.len() != expected_len {
            return Err(SignalError::InvalidMessage("malformed distribution message"));
        }

        let group_id = std::str::from_utf8(&bytes[3..3 + group_len])
            .map_err(|_| SignalError::InvalidMessage("malformed group id"))?
            .to_owned();
        let chain_id = read_u32(bytes, 3 + group_len)?;
        let iteration = read_u32(bytes, 3 + group_len + 4)?;

        let mut chain_key = [0u8; 32];
        chain_key.copy_from_slice(&bytes[3 + group_len + 8..3 + group_len + 40]);
        let mut signing_key = [0u8; 32];
        signing_key.copy_from_slice(&bytes[3 + group_len + 40..expected_len]);

        Ok(Self {
            group_id,
            chain_id,
            iteration,
            chain_key,
            signing_key,
        })
    }
}
