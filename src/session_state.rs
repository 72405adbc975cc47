//! Per-peer Double Ratchet session state.
//!
//! One [`SessionState`] holds everything needed to continue a ratchet with
//! one remote device: identity keys, root key, the sending chain, receiving
//! chains keyed by remote ratchet key, and the bounded skipped-message-key
//! caches that tolerate out-of-order delivery.

use std::collections::VecDeque;

use crate::kdf::{ChainKey, MessageKeys, RootKey};
use crate::keys::{IdentityKey, KeyPair, PublicKey};

/// Hard ceiling on how far ahead of a receiving chain a single message may
/// jump. Exceeding it fails decryption rather than silently resyncing.
pub const MAX_SKIP: u32 = 2000;

/// Cached skipped message keys retained per receiving chain; the oldest
/// entry is evicted when a new key would exceed the cap.
pub const MAX_MESSAGE_KEYS: usize = 2000;

/// Receiving chains kept per state; the oldest chain is dropped when a DH
/// ratchet step would exceed the cap.
pub const MAX_RECEIVER_CHAINS: usize = 5;

/// X3DH bootstrap reference kept until the peer's first reply proves the
/// session is established.
#[derive(Clone, Debug)]
pub struct PendingPreKey {
    pre_key_id: Option<u32>,
    signed_pre_key_id: u32,
    base_key: PublicKey,
}

impl PendingPreKey {
    /// Records which published keys an outgoing bootstrap referenced.
    #[must_use]
    pub fn new(pre_key_id: Option<u32>, signed_pre_key_id: u32, base_key: PublicKey) -> Self {
        Self {
            pre_key_id,
            signed_pre_key_id,
            base_key,
        }
    }

    /// One-time prekey ID the exchange consumed, if any.
    #[must_use]
    pub fn pre_key_id(&self) -> Option<u32> {
        self.pre_key_id
    }

    /// Signed prekey ID the exchange was computed against.
    #[must_use]
    pub fn signed_pre_key_id(&self) -> u32 {
        self.signed_pre_key_id
    }

    /// Our ephemeral base key from the agreement.
    #[must_use]
    pub fn base_key(&self) -> &PublicKey {
        &self.base_key
    }
}

/// The local sending chain: ratchet key pair plus its chain key.
#[derive(Clone, Debug)]
pub struct SenderChain {
    ratchet_key_pair: KeyPair,
    chain_key: ChainKey,
}

impl SenderChain {
    /// The ratchet key pair announced in outgoing message headers.
    #[must_use]
    pub fn ratchet_key_pair(&self) -> &KeyPair {
        &self.ratchet_key_pair
    }

    /// The sending chain key.
    #[must_use]
    pub fn chain_key(&self) -> &ChainKey {
        &self.chain_key
    }
}

/// One receiving chain under a particular remote ratchet key, with its
/// skipped-key cache (insertion-ordered, oldest evicted first).
#[derive(Clone, Debug)]
struct ReceiverChain {
    ratchet_key: PublicKey,
    chain_key: ChainKey,
    message_keys: VecDeque<MessageKeys>,
}

/// Ratchet state for one remote device.
#[derive(Clone, Debug)]
pub struct SessionState {
    session_version: u8,
    local_identity: IdentityKey,
    remote_identity: IdentityKey,
    root_key: RootKey,
    sender_chain: SenderChain,
    receiver_chains: VecDeque<ReceiverChain>,
    previous_counter: u32,
    pending_pre_key: Option<PendingPreKey>,
    remote_registration_id: u32,
    base_key: PublicKey,
}

impl SessionState {
    /// Assembles a freshly derived session state.
    #[must_use]
    pub fn new(
        session_version: u8,
        local_identity: IdentityKey,
        remote_identity: IdentityKey,
        root_key: RootKey,
        sender_ratchet_key_pair: KeyPair,
        sender_chain_key: ChainKey,
        base_key: PublicKey,
    ) -> Self {
        Self {
            session_version,
            local_identity,
            remote_identity,
            root_key,
            sender_chain: SenderChain {
                ratchet_key_pair: sender_ratchet_key_pair,
                chain_key: sender_chain_key,
            },
            receiver_chains: VecDeque::new(),
            previous_counter: 0,
            pending_pre_key: None,
            remote_registration_id: 0,
            base_key,
        }
    }

    /// The wire version this session speaks.
    #[must_use]
    pub fn session_version(&self) -> u8 {
        self.session_version
    }

    /// Our identity key as used in this session.
    #[must_use]
    pub fn local_identity(&self) -> &IdentityKey {
        &self.local_identity
    }

    /// The peer's identity key pinned into this session.
    #[must_use]
    pub fn remote_identity(&self) -> &IdentityKey {
        &self.remote_identity
    }

    /// The current root key.
    #[must_use]
    pub fn root_key(&self) -> &RootKey {
        &self.root_key
    }

    pub(crate) fn set_root_key(&mut self, root_key: RootKey) {
        self.root_key = root_key;
    }

    /// The X3DH base key this session was established from (ours when we
    /// initiated, the peer's when we responded).
    #[must_use]
    pub fn base_key(&self) -> &PublicKey {
        &self.base_key
    }

    /// The local sending chain.
    #[must_use]
    pub fn sender_chain(&self) -> &SenderChain {
        &self.sender_chain
    }

    pub(crate) fn set_sender_chain(&mut self, ratchet_key_pair: KeyPair, chain_key: ChainKey) {
        self.sender_chain = SenderChain {
            ratchet_key_pair,
            chain_key,
        };
    }

    pub(crate) fn set_sender_chain_key(&mut self, chain_key: ChainKey) {
        self.sender_chain.chain_key = chain_key;
    }

    /// Length of the previous sending chain, echoed in message headers.
    #[must_use]
    pub fn previous_counter(&self) -> u32 {
        self.previous_counter
    }

    pub(crate) fn set_previous_counter(&mut self, counter: u32) {
        self.previous_counter = counter;
    }

    /// The bootstrap marker, present until the first reply arrives.
    #[must_use]
    pub fn pending_pre_key(&self) -> Option<&PendingPreKey> {
        self.pending_pre_key.as_ref()
    }

    pub(crate) fn set_pending_pre_key(&mut self, pending: PendingPreKey) {
        self.pending_pre_key = Some(pending);
    }

    pub(crate) fn clear_pending_pre_key(&mut self) {
        self.pending_pre_key = None;
    }

    /// The peer's registration ID, when known.
    #[must_use]
    pub fn remote_registration_id(&self) -> u32 {
        self.remote_registration_id
    }

    pub(crate) fn set_remote_registration_id(&mut self, id: u32) {
        self.remote_registration_id = id;
    }

    /// Whether a receiving chain exists for `ratchet_key`.
    #[must_use]
    pub fn has_receiver_chain(&self, ratchet_key: &PublicKey) -> bool {
        self.receiver_chains
            .iter()
            .any(|chain| chain.ratchet_key == *ratchet_key)
    }

    /// The receiving chain key under `ratchet_key`, if that chain exists.
    #[must_use]
    pub fn receiver_chain_key(&self, ratchet_key: &PublicKey) -> Option<&ChainKey> {
        self.receiver_chains
            .iter()
            .find(|chain| chain.ratchet_key == *ratchet_key)
            .map(|chain| &chain.chain_key)
    }

    /// Installs a new receiving chain, evicting the oldest past the cap.
    pub(crate) fn add_receiver_chain(&mut self, ratchet_key: PublicKey, chain_key: ChainKey) {
        self.receiver_chains.push_back(ReceiverChain {
            ratchet_key,
            chain_key,
            message_keys: VecDeque::new(),
        });
        if self.receiver_chains.len() > MAX_RECEIVER_CHAINS {
            self.receiver_chains.pop_front();
        }
    }

    /// Replaces the chain key of the receiving chain under `ratchet_key`.
    pub(crate) fn set_receiver_chain_key(&mut self, ratchet_key: &PublicKey, chain_key: ChainKey) {
        if let Some(chain) = self
            .receiver_chains
            .iter_mut()
            .find(|chain| chain.ratchet_key == *ratchet_key)
        {
            chain.chain_key = chain_key;
        }
    }

    /// Caches skipped message keys for later out-of-order consumption.
    pub(crate) fn cache_message_keys(&mut self, ratchet_key: &PublicKey, keys: MessageKeys) {
        if let Some(chain) = self
            .receiver_chains
            .iter_mut()
            .find(|chain| chain.ratchet_key == *ratchet_key)
        {
            chain.message_keys.push_back(keys);
            if chain.message_keys.len() > MAX_MESSAGE_KEYS {
                chain.message_keys.pop_front();
            }
        }
    }

    /// Removes and returns the cached keys for `counter`, if present.
    ///
    /// Single-use: a successful take deletes the cache entry.
    pub(crate) fn take_message_keys(
        &mut self,
        ratchet_key: &PublicKey,
        counter: u32,
    ) -> Option<MessageKeys> {
        let chain = self
            .receiver_chains
            .iter_mut()
            .find(|chain| chain.ratchet_key == *ratchet_key)?;
        let position = chain
            .message_keys
            .iter()
            .position(|keys| keys.index() == counter)?;
        chain.message_keys.remove(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SymmetricKey;
    use rand_core::OsRng;

    fn test_state() -> SessionState {
        let local = KeyPair::generate(&mut OsRng);
        let remote = KeyPair::generate(&mut OsRng);
        let base = KeyPair::generate(&mut OsRng);
        SessionState::new(
            3,
            IdentityKey::new(local.public_key()),
            IdentityKey::new(remote.public_key()),
            RootKey::new(SymmetricKey::from_bytes([1u8; 32])),
            KeyPair::generate(&mut OsRng),
            ChainKey::new(SymmetricKey::from_bytes([2u8; 32]), 0),
            base.public_key(),
        )
    }

    fn chain_key(byte: u8) -> ChainKey {
        ChainKey::new(SymmetricKey::from_bytes([byte; 32]), 0)
    }

    #[test]
    fn receiver_chain_lookup() {
        let mut state = test_state();
        let ratchet = KeyPair::generate(&mut OsRng).public_key();

        assert!(!state.has_receiver_chain(&ratchet));
        state.add_receiver_chain(ratchet, chain_key(3));
        assert!(state.has_receiver_chain(&ratchet));
        assert_eq!(state.receiver_chain_key(&ratchet).unwrap().index(), 0);
    }

    #[test]
    fn oldest_receiver_chain_evicted() {
        let mut state = test_state();
        let first = KeyPair::generate(&mut OsRng).public_key();
        state.add_receiver_chain(first, chain_key(0));

        for i in 0..MAX_RECEIVER_CHAINS {
            let key = KeyPair::generate(&mut OsRng).public_key();
            state.add_receiver_chain(key, chain_key(i as u8 + 1));
        }

        assert!(!state.has_receiver_chain(&first));
    }

    #[test]
    fn message_keys_are_single_use() {
        let mut state = test_state();
        let ratchet = KeyPair::generate(&mut OsRng).public_key();
        state.add_receiver_chain(ratchet, chain_key(5));

        let keys = chain_key(5).message_keys();
        state.cache_message_keys(&ratchet, keys);

        assert!(state.take_message_keys(&ratchet, 0).is_some());
        assert!(state.take_message_keys(&ratchet, 0).is_none());
    }

    #[test]
    fn cache_evicts_oldest_key() {
        let mut state = test_state();
        let ratchet = KeyPair::generate(&mut OsRng).public_key();
        state.add_receiver_chain(ratchet, chain_key(5));

        let mut chain = chain_key(5);
        for _ in 0..=MAX_MESSAGE_KEYS {
            state.cache_message_keys(&ratchet, chain.message_keys());
            chain = chain.next();
        }

        // index 0 was the oldest entry and fell off the cache
        assert!(state.take_message_keys(&ratchet, 0).is_none());
        assert!(state.take_message_keys(&ratchet, 1).is_some());
    }
}
