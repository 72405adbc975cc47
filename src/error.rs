//! Error types for the Signal protocol implementation.

use thiserror::Error;

/// Result type alias for Signal protocol operations
pub type Result<T> = std::result::Result<T, SignalError>;

/// Errors that can occur during protocol operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    /// Malformed key material
    #[error("invalid key material")]
    InvalidKey,

    /// Signature verification failed
    #[error("invalid signature")]
    InvalidSignature,

    /// Authentication failure, malformed wire data, or otherwise
    /// undecryptable message
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),

    /// Message key already consumed, or chain index regression
    #[error("duplicate message")]
    DuplicateMessage,

    /// Skipped-message window exceeded
    #[error("too many skipped messages")]
    TooManySkippedMessages,

    /// Operation requires an established session that does not exist
    #[error("no session for address")]
    NoSession,

    /// Remote identity key differs from the pinned one without approval
    #[error("untrusted identity")]
    UntrustedIdentity,

    /// Bootstrap material references key material that is no longer held
    /// locally (e.g. a rotated-away signed prekey)
    #[error("stale key exchange")]
    StaleKeyExchange,

    /// Wire version is not supported
    #[error("unsupported message version {0}")]
    LegacyMessage(u8),

    /// Operation was cancelled before completion; no state was persisted
    #[error("operation cancelled")]
    Cancelled,

    /// Store access failed
    #[error("storage error")]
    Storage,
}

impl From<ed25519_dalek::SignatureError> for SignalError {
    fn from(_: ed25519_dalek::SignatureError) -> Self {
        SignalError::InvalidSignature
    }
}
