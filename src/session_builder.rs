//! Session establishment against prekey bundles and inbound bootstraps.

use rand_core::CryptoRngCore;
use tracing::debug;

use crate::address::ProtocolAddress;
use crate::bundle::PreKeyBundle;
use crate::context::Context;
use crate::error::{Result, SignalError};
use crate::keys::KeyPair;
use crate::message::PreKeySignalMessage;
use crate::ratchet::{initialize_alice_session, initialize_bob_session, AliceParameters, BobParameters};
use crate::session_record::SessionRecord;
use crate::session_state::PendingPreKey;
use crate::storage::{IdentityKeyStore, PreKeyStore, SessionStore, SignedPreKeyStore};

/// Builds sessions with one remote device, either by initiating against
/// its published [`PreKeyBundle`] or by responding to a received
/// [`PreKeySignalMessage`].
///
/// Identity handling is trust-on-first-use: the first identity observed
/// for the address is pinned on successful processing, and a later
/// mismatch fails with [`SignalError::UntrustedIdentity`] until the caller
/// explicitly re-pins the new key through the identity store.
pub struct SessionBuilder<S, I, P, Q> {
    session_store: S,
    pre_key_store: P,
    signed_pre_key_store: Q,
    identity_store: I,
    remote_address: ProtocolAddress,
}

impl<S, I, P, Q> SessionBuilder<S, I, P, Q>
where
    S: SessionStore,
    I: IdentityKeyStore,
    P: PreKeyStore,
    Q: SignedPreKeyStore,
{
    /// Creates a builder for sessions with `remote_address`.
    pub fn new(
        session_store: S,
        pre_key_store: P,
        signed_pre_key_store: Q,
        identity_store: I,
        remote_address: ProtocolAddress,
    ) -> Self {
        Self {
            session_store,
            pre_key_store,
            signed_pre_key_store,
            identity_store,
            remote_address,
        }
    }

    /// The peer this builder establishes sessions with.
    #[must_use]
    pub fn remote_address(&self) -> &ProtocolAddress {
        &self.remote_address
    }

    /// Initiates a session from the peer's published bundle.
    ///
    /// Verifies the signed-prekey signature, runs the X3DH agreement with
    /// a fresh ephemeral base key, and persists the derived state as
    /// current (archiving any prior state). The new state carries a
    /// pending-prekey marker so the first outgoing message embeds the
    /// bootstrap material.
    pub fn process_bundle<R: CryptoRngCore>(
        &mut self,
        ctx: &Context,
        rng: &mut R,
        bundle: &PreKeyBundle,
    ) -> Result<()> {
        ctx.check()?;

        if !self
            .identity_store
            .is_trusted_identity(ctx, &self.remote_address, bundle.identity_key())?
        {
            return Err(SignalError::UntrustedIdentity);
        }

        bundle
            .verify_signature()
            .map_err(|_| SignalError::InvalidKey)?;

        debug!(
            remote = %self.remote_address,
            signed_pre_key_id = bundle.signed_pre_key_id(),
            "processing prekey bundle"
        );

        let our_base_key = KeyPair::generate(rng);
        let mut state = initialize_alice_session(
            rng,
            &AliceParameters {
                our_identity: &self.identity_store.identity_key_pair(ctx)?,
                our_base_key: &our_base_key,
                their_identity: *bundle.identity_key(),
                their_signed_pre_key: *bundle.signed_pre_key(),
                their_one_time_pre_key: bundle.pre_key().map(|(_, key)| key),
            },
        );
        state.set_pending_pre_key(PendingPreKey::new(
            bundle.pre_key().map(|(id, _)| id),
            bundle.signed_pre_key_id(),
            our_base_key.public_key(),
        ));
        state.set_remote_registration_id(bundle.registration_id());

        let mut record = self.session_store.load_session(ctx, &self.remote_address)?;
        record.promote_state(state);

        ctx.check()?;
        self.identity_store
            .save_identity(ctx, &self.remote_address, bundle.identity_key())?;
        self.session_store
            .store_session(ctx, &self.remote_address, record)
    }

    /// Responder path: derives the session state a received bootstrap
    /// message was encrypted under, installing it into `record`.
    ///
    /// Consumes the referenced one-time prekey from the store lookup; a
    /// missing prekey means the bootstrap was already processed once and
    /// is a replay. Returns the one-time prekey ID to remove from the
    /// prekey store once the first decrypt under the new state succeeds.
    /// A record that already holds a state for the message's base key is
    /// left untouched (retransmitted bootstrap).
    pub fn process(
        &mut self,
        ctx: &Context,
        record: &mut SessionRecord,
        message: &PreKeySignalMessage,
    ) -> Result<Option<u32>> {
        ctx.check()?;

        if !self
            .identity_store
            .is_trusted_identity(ctx, &self.remote_address, message.identity_key())?
        {
            return Err(SignalError::UntrustedIdentity);
        }

        if record.has_session_state(crate::message::CIPHERTEXT_VERSION, message.base_key()) {
            debug!(remote = %self.remote_address, "bootstrap retransmission, session exists");
            return Ok(None);
        }

        let signed_pre_key = self
            .signed_pre_key_store
            .load_signed_pre_key(ctx, message.signed_pre_key_id())?
            .ok_or(SignalError::StaleKeyExchange)?;

        let one_time_pre_key = match message.pre_key_id() {
            Some(id) => Some(
                self.pre_key_store
                    .load_pre_key(ctx, id)?
                    .ok_or(SignalError::InvalidMessage("one-time prekey already consumed"))?,
            ),
            None => None,
        };

        debug!(
            remote = %self.remote_address,
            pre_key_id = ?message.pre_key_id(),
            "building responder session"
        );

        let mut state = initialize_bob_session(&BobParameters {
            our_identity: &self.identity_store.identity_key_pair(ctx)?,
            our_signed_pre_key: signed_pre_key.key_pair(),
            our_one_time_pre_key: one_time_pre_key.as_ref().map(|pre_key| pre_key.key_pair()),
            their_identity: *message.identity_key(),
            their_base_key: *message.base_key(),
        });
        state.set_remote_registration_id(message.registration_id());

        record.promote_state(state);

        ctx.check()?;
        self.identity_store
            .save_identity(ctx, &self.remote_address, message.identity_key())?;

        Ok(message.pre_key_id())
    }

    pub(crate) fn session_store(&self) -> &S {
        &self.session_store
    }

    pub(crate) fn session_store_mut(&mut self) -> &mut S {
        &mut self.session_store
    }

    pub(crate) fn identity_store(&self) -> &I {
        &self.identity_store
    }

    pub(crate) fn pre_key_store_mut(&mut self) -> &mut P {
        &mut self.pre_key_store
    }
}
