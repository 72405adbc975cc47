//! Per-(group, sender) ratchet state.
//!
//! A sender key chain is one-directional: the same HMAC construction as the
//! one-to-one symmetric ratchet, but with no DH step — every group member
//! replays the sender's chain forward from the distributed seed. Messages
//! are authenticated by a dedicated Ed25519 pair instead; only the
//! originating device holds the signing half.

use std::collections::VecDeque;

use crate::kdf::{hmac_sha256, MessageKeys};
use crate::keys::SigningKeyPair;
use crate::session_state::MAX_MESSAGE_KEYS;

const MESSAGE_KEY_SEED: &[u8] = &[0x01];
const CHAIN_KEY_SEED: &[u8] = &[0x02];
const SENDER_MESSAGE_KEYS_INFO: &[u8] = b"Signal_SenderKey_MessageKeys";

/// Chain key of a sender key chain at a specific iteration.
#[derive(Clone)]
pub struct SenderChainKey {
    iteration: u32,
    seed: [u8; 32],
}

impl SenderChainKey {
    /// Wraps a chain seed at the given iteration.
    #[must_use]
    pub fn new(iteration: u32, seed: [u8; 32]) -> Self {
        Self { iteration, seed }
    }

    /// The iteration this key produces message keys for.
    #[must_use]
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Raw seed bytes.
    #[must_use]
    pub fn seed(&self) -> &[u8; 32] {
        &self.seed
    }

    /// Advances the chain one step.
    #[must_use]
    pub fn next(&self) -> SenderChainKey {
        SenderChainKey::new(
            self.iteration + 1,
            hmac_sha256(&self.seed, CHAIN_KEY_SEED),
        )
    }

    /// Derives the message keys for this iteration without advancing.
    #[must_use]
    pub fn message_keys(&self) -> MessageKeys {
        let seed = hmac_sha256(&self.seed, MESSAGE_KEY_SEED);
        MessageKeys::derive(&seed, SENDER_MESSAGE_KEYS_INFO, self.iteration)
    }
}

impl std::fmt::Debug for SenderChainKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SenderChainKey(iteration: {}, [REDACTED])", self.iteration)
    }
}

/// Ratchet state for one chain of one (group, sender) pair.
#[derive(Clone, Debug)]
pub struct SenderKeyState {
    chain_id: u32,
    chain_key: SenderChainKey,
    signing_key_public: [u8; 32],
    signing_key_private: Option<SigningKeyPair>,
    message_keys: VecDeque<MessageKeys>,
}

impl SenderKeyState {
    /// Builds a state. `signing_key_private` is present only on the
    /// originating device.
    #[must_use]
    pub fn new(
        chain_id: u32,
        iteration: u32,
        chain_seed: [u8; 32],
        signing_key_public: [u8; 32],
        signing_key_private: Option<SigningKeyPair>,
    ) -> Self {
        Self {
            chain_id,
            chain_key: SenderChainKey::new(iteration, chain_seed),
            signing_key_public,
            signing_key_private,
            message_keys: VecDeque::new(),
        }
    }

    /// The chain ID distinguishing concurrent chains in a record.
    #[must_use]
    pub fn chain_id(&self) -> u32 {
        self.chain_id
    }

    /// The current chain key.
    #[must_use]
    pub fn chain_key(&self) -> &SenderChainKey {
        &self.chain_key
    }

    pub(crate) fn set_chain_key(&mut self, chain_key: SenderChainKey) {
        self.chain_key = chain_key;
    }

    /// The Ed25519 verification key all members hold.
    #[must_use]
    pub fn signing_key_public(&self) -> &[u8; 32] {
        &self.signing_key_public
    }

    /// The Ed25519 signing pair, present only on the originating device.
    #[must_use]
    pub fn signing_key_private(&self) -> Option<&SigningKeyPair> {
        self.signing_key_private.as_ref()
    }

    /// Caches skipped message keys, evicting the oldest past the cap.
    pub(crate) fn cache_message_keys(&mut self, keys: MessageKeys) {
        self.message_keys.push_back(keys);
        if self.message_keys.len() > MAX_MESSAGE_KEYS {
            self.message_keys.pop_front();
        }
    }

    /// Removes and returns the cached keys for `iteration`, if present.
    pub(crate) fn take_message_keys(&mut self, iteration: u32) -> Option<MessageKeys> {
        let position = self
            .message_keys
            .iter()
            .position(|keys| keys.index() == iteration)?;
        self.message_keys.remove(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    #[test]
    fn chain_iterations_advance() {
        let chain = SenderChainKey::new(0, [42u8; 32]);
        let next = chain.next();

        assert_eq!(next.iteration(), 1);
        assert_ne!(chain.seed(), next.seed());
        // deterministic: the same step yields the same key
        assert_eq!(chain.next().seed(), next.seed());
    }

    #[test]
    fn message_keys_carry_the_iteration() {
        let chain = SenderChainKey::new(9, [1u8; 32]);
        assert_eq!(chain.message_keys().index(), 9);
    }

    #[test]
    fn skipped_keys_are_single_use() {
        let signing = SigningKeyPair::generate(&mut OsRng);
        let mut state = SenderKeyState::new(
            1,
            0,
            [7u8; 32],
            signing.verifying_key_bytes(),
            Some(signing),
        );

        state.cache_message_keys(state.chain_key().message_keys());
        assert!(state.take_message_keys(0).is_some());
        assert!(state.take_message_keys(0).is_none());
    }
}
