//! Signal Protocol core: asynchronous session establishment, Double
//! Ratchet messaging, and Sender Key group encryption.
//!
//! This crate implements the cryptographic state machines of the Signal
//! Protocol: X3DH key agreement against published prekey bundles, the
//! Double Ratchet for forward-secret one-to-one sessions, and the Sender
//! Key protocol for efficient group messaging. Persistence lives behind
//! the store traits in [`storage`]; transport, delivery ordering, and
//! rotation policy are caller concerns.
//!
//! # Security Properties
//!
//! ## Forward Secrecy
//! Every message is encrypted under a key derived one way from a chain
//! key and deleted after use; compromising current state does not expose
//! past messages.
//!
//! ## Post-Compromise Security
//! One-to-one sessions re-key on every ratchet turnaround via fresh DH
//! exchanges, restoring security after a state compromise once an honest
//! round trip completes. (Sender key chains have no DH step and regain
//! security only when a new chain is distributed.)
//!
//! ## Deniable Authentication
//! Session messages are authenticated by derived keys rather than
//! long-term signatures, so transcripts prove nothing to third parties.
//! Group messages trade deniability within the group for sender
//! authentication via per-chain Ed25519 keys.
//!
//! ## Asynchronous Operation
//! A session can be established and a first message sent while the peer
//! is offline, using only their published [`bundle::PreKeyBundle`].
//!
//! # Example
//!
//! ```
//! use rand_core::OsRng;
//! use signal_protocol::address::ProtocolAddress;
//! use signal_protocol::bundle::PreKeyBundle;
//! use signal_protocol::context::Context;
//! use signal_protocol::key_helper;
//! use signal_protocol::session_builder::SessionBuilder;
//! use signal_protocol::session_cipher::SessionCipher;
//! use signal_protocol::storage::{
//!     InMemoryIdentityKeyStore, InMemoryPreKeyStore, InMemorySessionStore,
//!     InMemorySignedPreKeyStore,
//! };
//!
//! # fn main() -> signal_protocol::Result<()> {
//! let ctx = Context::background();
//!
//! // Bob registers and publishes a bundle out of band.
//! let bob_identity = key_helper::generate_identity_key_pair(&mut OsRng);
//! let bob_pre_key = key_helper::generate_pre_keys(&mut OsRng, 1, 1).remove(0);
//! let bob_signed_pre_key = key_helper::generate_signed_pre_key(&mut OsRng, &bob_identity, 1);
//! let bundle = PreKeyBundle::new(
//!     key_helper::generate_registration_id(&mut OsRng),
//!     1,
//!     Some((bob_pre_key.id(), bob_pre_key.key_pair().public_key())),
//!     bob_signed_pre_key.id(),
//!     bob_signed_pre_key.key_pair().public_key(),
//!     *bob_signed_pre_key.signature(),
//!     *bob_identity.identity_key(),
//! );
//!
//! // Alice establishes a session from the bundle and encrypts.
//! let alice_identity = key_helper::generate_identity_key_pair(&mut OsRng);
//! let mut builder = SessionBuilder::new(
//!     InMemorySessionStore::new(),
//!     InMemoryPreKeyStore::new(),
//!     InMemorySignedPreKeyStore::new(),
//!     InMemoryIdentityKeyStore::new(alice_identity, 421),
//!     ProtocolAddress::new("bob", 1),
//! );
//! builder.process_bundle(&ctx, &mut OsRng, &bundle)?;
//!
//! let mut cipher = SessionCipher::new(builder);
//! let message = cipher.encrypt(&ctx, b"hello bob")?;
//! // message.to_bytes() goes to the transport; Bob's device feeds it to
//! // its own SessionCipher::decrypt_prekey.
//! # let _ = message.to_bytes();
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! The crate is a synchronous state-transition library with no internal
//! threading. Session and sender-key state are keyed mutable resources:
//! callers must serialize cipher calls per address or sender key name.
//! Every store-touching operation takes a [`context::Context`] and checks
//! it before mutating, so a cancelled call never persists a half-advanced
//! ratchet.
//!
//! # Modules
//!
//! - [`session_builder`] / [`session_cipher`]: one-to-one sessions
//! - [`group_session_builder`] / [`group_cipher`]: sender key groups
//! - [`ratchet`] / [`kdf`]: X3DH agreement and the ratchet engine
//! - [`message`]: the four wire message kinds
//! - [`storage`]: store traits and in-memory implementations
//! - [`keys`] / [`xeddsa`]: key types and identity-key signatures

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unreachable_pub)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![warn(clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    missing_docs,
    clippy::missing_errors_doc,
    clippy::missing_fields_in_debug,
    clippy::module_name_repetitions
)]

pub mod address;
pub mod bundle;
pub mod context;
pub mod crypto;
pub mod error;
pub mod group_cipher;
pub mod group_session_builder;
pub mod kdf;
pub mod key_helper;
pub mod keys;
pub mod message;
pub mod ratchet;
pub mod record;
pub mod sender_key_record;
pub mod sender_key_state;
pub mod session_builder;
pub mod session_cipher;
pub mod session_record;
pub mod session_state;
pub mod storage;
pub mod xeddsa;

// Re-export main types
pub use address::{ProtocolAddress, SenderKeyName};
pub use bundle::PreKeyBundle;
pub use context::{CancelHandle, Context};
pub use error::{Result, SignalError};
pub use group_cipher::GroupCipher;
pub use group_session_builder::GroupSessionBuilder;
pub use keys::{IdentityKey, IdentityKeyPair, KeyPair, PublicKey, SecretKey};
pub use message::{
    CiphertextMessage, PreKeySignalMessage, SenderKeyDistributionMessage, SenderKeyMessage,
    SignalMessage,
};
pub use session_builder::SessionBuilder;
pub use session_cipher::SessionCipher;
pub use session_record::SessionRecord;
pub use storage::{
    IdentityKeyStore, PreKeyStore, SenderKeyStore, SessionStore, SignedPreKeyStore,
};
