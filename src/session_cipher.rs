//! One-to-one message encryption and decryption.
//!
//! A `SessionCipher` drives the Double Ratchet for one remote device:
//! every encrypt advances the sending chain, every decrypt either walks a
//! receiving chain (caching skipped keys for out-of-order delivery) or
//! performs a DH-ratchet step when the header announces a fresh ratchet
//! key.
//!
//! All mutation happens on a working copy of the session record; the store
//! is written only after the whole operation succeeds, so a failed call
//! leaves persisted state untouched.
//!
//! Callers must serialize `encrypt`/`decrypt` calls per remote address
//! (e.g. a per-address mutex): concurrent interleaved advancement would
//! violate the ratchet's monotonic-index invariant. This is a
//! precondition, not something the cipher enforces.

use rand_core::CryptoRngCore;
use tracing::{debug, warn};

use crate::address::ProtocolAddress;
use crate::context::Context;
use crate::crypto::{open, seal};
use crate::error::{Result, SignalError};
use crate::kdf::MessageKeys;
use crate::keys::{KeyPair, PublicKey};
use crate::message::{CiphertextMessage, PreKeySignalMessage, SignalMessage};
use crate::session_builder::SessionBuilder;
use crate::session_record::SessionRecord;
use crate::session_state::{SessionState, MAX_SKIP};
use crate::storage::{IdentityKeyStore, PreKeyStore, SessionStore, SignedPreKeyStore};

/// Encrypts and decrypts messages for one established (or establishing)
/// session.
pub struct SessionCipher<S, I, P, Q> {
    builder: SessionBuilder<S, I, P, Q>,
}

impl<S, I, P, Q> SessionCipher<S, I, P, Q>
where
    S: SessionStore,
    I: IdentityKeyStore,
    P: PreKeyStore,
    Q: SignedPreKeyStore,
{
    /// Wraps a builder; the cipher operates on the builder's remote
    /// address and stores.
    pub fn new(builder: SessionBuilder<S, I, P, Q>) -> Self {
        Self { builder }
    }

    /// The peer this cipher exchanges messages with.
    #[must_use]
    pub fn remote_address(&self) -> &ProtocolAddress {
        self.builder.remote_address()
    }

    /// Encrypts `plaintext` under the session's sending chain.
    ///
    /// Emits a [`CiphertextMessage::PreKey`] while the session still
    /// carries its bootstrap marker, a plain [`CiphertextMessage::Signal`]
    /// afterwards. Fails with [`SignalError::NoSession`] when no session
    /// was ever established for the address; a failed call does not
    /// advance the chain.
    pub fn encrypt(&mut self, ctx: &Context, plaintext: &[u8]) -> Result<CiphertextMessage> {
        ctx.check()?;

        let remote_address = self.builder.remote_address().clone();
        let mut record = self
            .builder
            .session_store()
            .load_session(ctx, &remote_address)?;
        let state = record.session_state_mut().ok_or(SignalError::NoSession)?;

        if !self.builder.identity_store().is_trusted_identity(
            ctx,
            &remote_address,
            state.remote_identity(),
        )? {
            return Err(SignalError::UntrustedIdentity);
        }

        let chain_key = state.sender_chain().chain_key().clone();
        let message_keys = chain_key.message_keys();
        let ratchet_key = state.sender_chain().ratchet_key_pair().public_key();

        let header_probe = SignalMessage::new(
            ratchet_key,
            message_keys.index(),
            state.previous_counter(),
            Vec::new(),
        );
        let ciphertext = seal(
            message_keys.cipher_key(),
            message_keys.nonce(),
            plaintext,
            &header_probe.header_bytes(),
        )?;
        let message = SignalMessage::new(
            ratchet_key,
            message_keys.index(),
            state.previous_counter(),
            ciphertext,
        );

        let message = match state.pending_pre_key() {
            Some(pending) => {
                let registration_id = self.builder.identity_store().local_registration_id(ctx)?;
                CiphertextMessage::PreKey(PreKeySignalMessage::new(
                    registration_id,
                    pending.pre_key_id(),
                    pending.signed_pre_key_id(),
                    *pending.base_key(),
                    *state.local_identity(),
                    message,
                ))
            }
            None => CiphertextMessage::Signal(message),
        };

        state.set_sender_chain_key(chain_key.next());

        ctx.check()?;
        self.builder
            .session_store_mut()
            .store_session(ctx, &remote_address, record)?;

        Ok(message)
    }

    /// Decrypts a plain ratchet message. See
    /// [`Self::decrypt_returning_key`].
    pub fn decrypt<R: CryptoRngCore>(
        &mut self,
        ctx: &Context,
        rng: &mut R,
        message: &SignalMessage,
    ) -> Result<Vec<u8>> {
        self.decrypt_returning_key(ctx, rng, message)
            .map(|(plaintext, _)| plaintext)
    }

    /// Decrypts a plain ratchet message and also returns the message keys
    /// that were consumed.
    ///
    /// The returned keys support [`Self::decrypt_with_key`] retry flows;
    /// the session itself still treats them as consumed. Fails with
    /// [`SignalError::NoSession`] when no session exists,
    /// [`SignalError::DuplicateMessage`] when the message's key was
    /// already used, and [`SignalError::InvalidMessage`] on
    /// authentication failure.
    pub fn decrypt_returning_key<R: CryptoRngCore>(
        &mut self,
        ctx: &Context,
        rng: &mut R,
        message: &SignalMessage,
    ) -> Result<(Vec<u8>, MessageKeys)> {
        ctx.check()?;

        let remote_address = self.builder.remote_address().clone();
        let mut record = self
            .builder
            .session_store()
            .load_session(ctx, &remote_address)?;
        if record.is_fresh() {
            return Err(SignalError::NoSession);
        }

        let (plaintext, keys) = decrypt_with_record(&mut record, rng, message)?;

        let state = record.session_state().ok_or(SignalError::NoSession)?;
        if !self.builder.identity_store().is_trusted_identity(
            ctx,
            &remote_address,
            state.remote_identity(),
        )? {
            return Err(SignalError::UntrustedIdentity);
        }

        ctx.check()?;
        self.builder
            .session_store_mut()
            .store_session(ctx, &remote_address, record)?;

        Ok((plaintext, keys))
    }

    /// Decrypts a prekey-wrapped message. See
    /// [`Self::decrypt_prekey_returning_key`].
    pub fn decrypt_prekey<R: CryptoRngCore>(
        &mut self,
        ctx: &Context,
        rng: &mut R,
        message: &PreKeySignalMessage,
    ) -> Result<Vec<u8>> {
        self.decrypt_prekey_returning_key(ctx, rng, message)
            .map(|(plaintext, _)| plaintext)
    }

    /// Decrypts a prekey-wrapped message, building the responder session
    /// first when the bootstrap is new, and also returns the consumed
    /// message keys.
    ///
    /// The referenced one-time prekey is removed from the prekey store
    /// only after the embedded message decrypts successfully.
    pub fn decrypt_prekey_returning_key<R: CryptoRngCore>(
        &mut self,
        ctx: &Context,
        rng: &mut R,
        message: &PreKeySignalMessage,
    ) -> Result<(Vec<u8>, MessageKeys)> {
        ctx.check()?;

        let remote_address = self.builder.remote_address().clone();
        let mut record = self
            .builder
            .session_store()
            .load_session(ctx, &remote_address)?;

        let consumed_pre_key_id = self.builder.process(ctx, &mut record, message)?;

        let (plaintext, keys) = decrypt_with_record(&mut record, rng, message.message())?;

        ctx.check()?;
        self.builder
            .session_store_mut()
            .store_session(ctx, &remote_address, record)?;
        if let Some(pre_key_id) = consumed_pre_key_id {
            self.builder
                .pre_key_store_mut()
                .remove_pre_key(ctx, pre_key_id)?;
        }

        Ok((plaintext, keys))
    }

    /// Re-decrypts `message` with previously returned message keys.
    ///
    /// Pure: consults no store and does not advance any session state, so
    /// the same (message, keys) pair decrypts identically any number of
    /// times. This is a retry/diagnostic affordance for callers that held
    /// on to the keys from a `*_returning_key` call — message keys are
    /// single-use for the ratchet itself and must never feed an encrypt
    /// path.
    pub fn decrypt_with_key(
        &self,
        message: &SignalMessage,
        message_keys: &MessageKeys,
    ) -> Result<Vec<u8>> {
        open(
            message_keys.cipher_key(),
            message_keys.nonce(),
            message.ciphertext(),
            &message.header_bytes(),
        )
    }
}

/// Decrypts against the record's states: current first, then archived
/// states, finally a DH-ratchet step for a fresh ratchet key. Mutates only
/// the in-memory record.
fn decrypt_with_record<R: CryptoRngCore>(
    record: &mut SessionRecord,
    rng: &mut R,
    message: &SignalMessage,
) -> Result<(Vec<u8>, MessageKeys)> {
    let ratchet_key = *message.ratchet_key();

    // Current state owns the matching receiving chain: decrypt in place.
    if let Some(state) = record.session_state() {
        if state.has_receiver_chain(&ratchet_key) {
            let mut working = state.clone();
            let result = decrypt_with_state(&mut working, message)?;
            record.set_session_state(working);
            return Ok(result);
        }
    }

    // A superseded state may still own the chain; on success it becomes
    // current again, archiving the state that had replaced it.
    if let Some(position) = record.previous_state_position(&ratchet_key) {
        let mut working = record
            .take_previous_state(position)
            .ok_or(SignalError::InvalidMessage("archived state vanished"))?;
        // On error the caller discards the whole record copy, so the
        // removed state is never persisted as missing.
        let result = decrypt_with_state(&mut working, message)?;
        warn!("decrypted under superseded session state");
        record.promote_state(working);
        return Ok(result);
    }

    // Fresh ratchet key: DH-ratchet a copy of the current state forward,
    // archiving the old current.
    let state = record.session_state().ok_or(SignalError::NoSession)?;
    let mut working = state.clone();
    ratchet_step(&mut working, rng, &ratchet_key);
    let result = decrypt_with_state(&mut working, message)?;
    record.promote_state(working);
    Ok(result)
}

/// One DH-ratchet step: derive the receiving chain under the peer's new
/// ratchet key, then a fresh sending chain under a newly generated key.
fn ratchet_step<R: CryptoRngCore>(
    state: &mut SessionState,
    rng: &mut R,
    their_ratchet_key: &PublicKey,
) {
    debug!("performing DH ratchet step");

    let our_ratchet_key = state.sender_chain().ratchet_key_pair().clone();
    let (receiver_root, receiver_chain) = state
        .root_key()
        .create_chain(their_ratchet_key, &our_ratchet_key);

    let our_new_ratchet_key = KeyPair::generate(rng);
    let (sender_root, sender_chain) =
        receiver_root.create_chain(their_ratchet_key, &our_new_ratchet_key);

    let previous_counter = state.sender_chain().chain_key().index();
    state.set_root_key(sender_root);
    state.add_receiver_chain(*their_ratchet_key, receiver_chain);
    state.set_previous_counter(previous_counter);
    state.set_sender_chain(our_new_ratchet_key, sender_chain);
}

/// Walks the matched receiving chain to the message's counter and opens
/// the ciphertext.
fn decrypt_with_state(
    state: &mut SessionState,
    message: &SignalMessage,
) -> Result<(Vec<u8>, MessageKeys)> {
    let message_keys = advance_receiver_chain(state, message.ratchet_key(), message.counter())?;

    let plaintext = open(
        message_keys.cipher_key(),
        message_keys.nonce(),
        message.ciphertext(),
        &message.header_bytes(),
    )?;

    // First successful decrypt proves the peer completed the exchange.
    state.clear_pending_pre_key();

    Ok((plaintext, message_keys))
}

/// Produces the message keys for `counter` on the chain under
/// `ratchet_key`, deriving and caching any intermediate keys.
fn advance_receiver_chain(
    state: &mut SessionState,
    ratchet_key: &PublicKey,
    counter: u32,
) -> Result<MessageKeys> {
    let chain_key = state
        .receiver_chain_key(ratchet_key)
        .ok_or(SignalError::InvalidMessage("no receiving chain for ratchet key"))?
        .clone();

    if counter < chain_key.index() {
        // The chain already advanced past this index; the key must still
        // be cached from an earlier skip or it was consumed.
        return state
            .take_message_keys(ratchet_key, counter)
            .ok_or(SignalError::DuplicateMessage);
    }

    if counter - chain_key.index() > MAX_SKIP {
        return Err(SignalError::TooManySkippedMessages);
    }

    let mut chain_key = chain_key;
    while chain_key.index() < counter {
        state.cache_message_keys(ratchet_key, chain_key.message_keys());
        chain_key = chain_key.next();
    }

    let message_keys = chain_key.message_keys();
    state.set_receiver_chain_key(ratchet_key, chain_key.next());
    Ok(message_keys)
}
