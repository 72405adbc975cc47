//! Sender key creation and distribution-message processing.

use rand_core::CryptoRngCore;
use tracing::debug;

use crate::address::SenderKeyName;
use crate::context::Context;
use crate::error::{Result, SignalError};
use crate::keys::SigningKeyPair;
use crate::message::SenderKeyDistributionMessage;
use crate::sender_key_state::SenderKeyState;
use crate::storage::SenderKeyStore;

/// Builds group sessions: seeds the local sending chain for a group and
/// installs peers' advertised chains from their distribution messages.
pub struct GroupSessionBuilder<SK> {
    sender_key_store: SK,
}

impl<SK: SenderKeyStore> GroupSessionBuilder<SK> {
    /// Creates a builder over the given sender key store.
    pub fn new(sender_key_store: SK) -> Self {
        Self { sender_key_store }
    }

    /// Creates (or re-advertises) the local sending chain for
    /// `sender_key_name`.
    ///
    /// On first use this generates a random chain ID and seed plus a fresh
    /// signing key pair and persists the new state. The returned
    /// distribution message always reflects the chain's *current*
    /// iteration, so a member added later starts reading from that point
    /// and cannot decrypt earlier traffic.
    pub fn create<R: CryptoRngCore>(
        &mut self,
        ctx: &Context,
        rng: &mut R,
        sender_key_name: &SenderKeyName,
    ) -> Result<SenderKeyDistributionMessage> {
        ctx.check()?;

        let mut record = self.sender_key_store.load_sender_key(ctx, sender_key_name)?;

        if record.is_empty() {
            debug!(sender = %sender_key_name, "creating sender key state");

            let mut chain_seed = [0u8; 32];
            rng.fill_bytes(&mut chain_seed);
            let signing_key = SigningKeyPair::generate(rng);

            record.set_sender_key_state(SenderKeyState::new(
                rng.next_u32(),
                0,
                chain_seed,
                signing_key.verifying_key_bytes(),
                Some(signing_key),
            ));

            ctx.check()?;
            self.sender_key_store
                .store_sender_key(ctx, sender_key_name, record.clone())?;
        }

        let state = record.sender_key_state().ok_or(SignalError::NoSession)?;
        Ok(SenderKeyDistributionMessage::new(
            sender_key_name.group_id().to_owned(),
            state.chain_id(),
            state.chain_key().iteration(),
            *state.chain_key().seed(),
            *state.signing_key_public(),
        ))
    }

    /// Installs the chain a peer advertised for `sender_key_name`.
    ///
    /// The new state carries only the verification key, so the local
    /// device can decrypt but never impersonate that sender. The sender's
    /// own chain is unaffected.
    pub fn process(
        &mut self,
        ctx: &Context,
        sender_key_name: &SenderKeyName,
        message: &SenderKeyDistributionMessage,
    ) -> Result<()> {
        ctx.check()?;

        if message.group_id() != sender_key_name.group_id() {
            return Err(SignalError::InvalidMessage(
                "distribution message for a different group",
            ));
        }

        debug!(
            sender = %sender_key_name,
            chain_id = message.chain_id(),
            iteration = message.iteration(),
            "installing sender key state"
        );

        let mut record = self.sender_key_store.load_sender_key(ctx, sender_key_name)?;
        record.add_sender_key_state(SenderKeyState::new(
            message.chain_id(),
            message.iteration(),
            *message.chain_key(),
            *message.signing_key(),
            None,
        ));

        ctx.check()?;
        self.sender_key_store
            .store_sender_key(ctx, sender_key_name, record)
    }
}
