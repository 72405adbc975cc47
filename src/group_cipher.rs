//! Group message encryption and decryption over sender key chains.
//!
//! One encryption per message regardless of group size: the sender
//! advances their one-directional chain, seals the payload, and signs the
//! whole message with their Ed25519 key; every member verifies against
//! the verification key installed from the sender's distribution message.
//!
//! As with the one-to-one cipher, callers must serialize calls per sender
//! key name, and all mutation happens on a working copy persisted only
//! after success.

use tracing::debug;

use crate::address::SenderKeyName;
use crate::context::Context;
use crate::crypto::{open, seal};
use crate::error::{Result, SignalError};
use crate::kdf::MessageKeys;
use crate::keys::verify_ed25519;
use crate::message::{sender_key_header, SenderKeyMessage};
use crate::sender_key_state::SenderKeyState;
use crate::session_state::MAX_SKIP;
use crate::storage::SenderKeyStore;

/// Encrypts outgoing and decrypts incoming messages for one (group,
/// sender) chain.
pub struct GroupCipher<SK> {
    sender_key_store: SK,
    sender_key_name: SenderKeyName,
}

impl<SK: SenderKeyStore> GroupCipher<SK> {
    /// Creates a cipher for `sender_key_name`: the local device's own
    /// chain when encrypting, a peer's chain when decrypting.
    pub fn new(sender_key_store: SK, sender_key_name: SenderKeyName) -> Self {
        Self {
            sender_key_store,
            sender_key_name,
        }
    }

    /// The (group, sender) pair this cipher operates on.
    #[must_use]
    pub fn sender_key_name(&self) -> &SenderKeyName {
        &self.sender_key_name
    }

    /// Encrypts `plaintext` under the local sending chain and signs it.
    ///
    /// Fails with [`SignalError::NoSession`] when no sending state exists
    /// for the name (no `create` yet, or this device only holds the
    /// peer-side verification state). A failed call does not advance the
    /// chain.
    pub fn encrypt(&mut self, ctx: &Context, plaintext: &[u8]) -> Result<SenderKeyMessage> {
        ctx.check()?;

        let mut record = self
            .sender_key_store
            .load_sender_key(ctx, &self.sender_key_name)?;
        let state = record
            .sender_key_state_mut()
            .ok_or(SignalError::NoSession)?;
        let signing_key = state
            .signing_key_private()
            .ok_or(SignalError::NoSession)?
            .clone();

        let chain_key = state.chain_key().clone();
        let message_keys = chain_key.message_keys();

        let header = sender_key_header(
            self.sender_key_name.group_id(),
            state.chain_id(),
            message_keys.index(),
        );
        let ciphertext = seal(
            message_keys.cipher_key(),
            message_keys.nonce(),
            plaintext,
            &header,
        )?;

        let message = SenderKeyMessage::new(
            self.sender_key_name.group_id().to_owned(),
            state.chain_id(),
            message_keys.index(),
            ciphertext,
            |bytes| signing_key.sign(bytes),
        );

        state.set_chain_key(chain_key.next());

        ctx.check()?;
        self.sender_key_store
            .store_sender_key(ctx, &self.sender_key_name, record)?;

        Ok(message)
    }

    /// Verifies and decrypts a message from this cipher's sender.
    ///
    /// Signature verification failure and unknown chain IDs are
    /// [`SignalError::InvalidMessage`]; an iteration whose key was
    /// already consumed is [`SignalError::DuplicateMessage`]; jumping
    /// more than the skip window ahead is
    /// [`SignalError::TooManySkippedMessages`]. A failed call leaves the
    /// stored record untouched.
    pub fn decrypt(&mut self, ctx: &Context, message: &SenderKeyMessage) -> Result<Vec<u8>> {
        ctx.check()?;

        if message.group_id() != self.sender_key_name.group_id() {
            return Err(SignalError::InvalidMessage("message for a different group"));
        }

        let mut record = self
            .sender_key_store
            .load_sender_key(ctx, &self.sender_key_name)?;
        if record.is_empty() {
            return Err(SignalError::NoSession);
        }
        let state = record
            .state_for_chain_id_mut(message.chain_id())
            .ok_or(SignalError::InvalidMessage("unknown sender chain id"))?;

        verify_ed25519(
            state.signing_key_public(),
            &message.signed_portion(),
            message.signature(),
        )
        .map_err(|_| SignalError::InvalidMessage("invalid sender signature"))?;

        let message_keys = advance_sender_chain(state, message.iteration())?;

        let plaintext = open(
            message_keys.cipher_key(),
            message_keys.nonce(),
            message.ciphertext(),
            &message.header_bytes(),
        )?;

        debug!(
            sender = %self.sender_key_name,
            iteration = message.iteration(),
            "decrypted group message"
        );

        ctx.check()?;
        self.sender_key_store
            .store_sender_key(ctx, &self.sender_key_name, record)?;

        Ok(plaintext)
    }
}

/// Produces the message keys for `iteration`, deriving and caching any
/// intermediate keys up to the skip window.
fn advance_sender_chain(state: &mut SenderKeyState, iteration: u32) -> Result<MessageKeys> {
    let chain_key = state.chain_key().clone();

    if iteration < chain_key.iteration() {
        return state
            .take_message_keys(iteration)
            .ok_or(SignalError::DuplicateMessage);
    }

    if iteration - chain_key.iteration() > MAX_SKIP {
        return Err(SignalError::TooManySkippedMessages);
    }

    let mut chain_key = chain_key;
    while chain_key.iteration() < iteration {
        state.cache_message_keys(chain_key.message_keys());
        chain_key = chain_key.next();
    }

    let message_keys = chain_key.message_keys();
    state.set_chain_key(chain_key.next());
    Ok(message_keys)
}
