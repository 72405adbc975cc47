//! Session records: one current state plus bounded history.
//!
//! When a session is re-established (new bundle, new inbound bootstrap, or
//! a DH-ratchet step) the superseded state slides into an ordered previous
//! list so in-flight messages encrypted under it can still be decrypted.
//! The list is bounded; the oldest state is evicted first.

use std::collections::VecDeque;

use crate::keys::PublicKey;
use crate::session_state::SessionState;

/// Previous session states retained per record.
pub const MAX_ARCHIVED_STATES: usize = 40;

/// A peer device's session record: the current [`SessionState`] plus up to
/// [`MAX_ARCHIVED_STATES`] superseded ones, newest first.
#[derive(Clone, Debug, Default)]
pub struct SessionRecord {
    current: Option<SessionState>,
    previous: VecDeque<SessionState>,
}

impl SessionRecord {
    /// An empty record with no established session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A record seeded with an initial state.
    #[must_use]
    pub fn from_state(state: SessionState) -> Self {
        Self {
            current: Some(state),
            previous: VecDeque::new(),
        }
    }

    /// Whether no session has ever been established under this record.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.current.is_none() && self.previous.is_empty()
    }

    /// The current session state, if one is established.
    #[must_use]
    pub fn session_state(&self) -> Option<&SessionState> {
        self.current.as_ref()
    }

    /// Mutable access to the current session state.
    pub fn session_state_mut(&mut self) -> Option<&mut SessionState> {
        self.current.as_mut()
    }

    /// The archived states, newest first.
    pub fn previous_states(&self) -> impl Iterator<Item = &SessionState> {
        self.previous.iter()
    }

    /// Number of archived states.
    #[must_use]
    pub fn previous_state_count(&self) -> usize {
        self.previous.len()
    }

    /// Whether any held state (current or previous) was established from
    /// `base_key` at `version`.
    ///
    /// Lets a responder recognize a retransmitted bootstrap message and
    /// skip re-deriving a session it already holds.
    #[must_use]
    pub fn has_session_state(&self, version: u8, base_key: &PublicKey) -> bool {
        self.current
            .iter()
            .chain(self.previous.iter())
            .any(|state| {
                state.session_version() == version && state.base_key() == base_key
            })
    }

    /// Makes `state` current, archiving the present current state.
    pub fn promote_state(&mut self, state: SessionState) {
        self.archive_current_state();
        self.current = Some(state);
    }

    /// Moves the current state into the previous list.
    pub fn archive_current_state(&mut self) {
        if let Some(old) = self.current.take() {
            self.previous.push_front(old);
            if self.previous.len() > MAX_ARCHIVED_STATES {
                self.previous.pop_back();
            }
        }
    }

    /// Replaces the current state without archiving (same-state update).
    pub(crate) fn set_session_state(&mut self, state: SessionState) {
        self.current = Some(state);
    }

    /// Removes and returns the archived state at `index` (0 = newest).
    pub(crate) fn take_previous_state(&mut self, index: usize) -> Option<SessionState> {
        self.previous.remove(index)
    }

    /// Finds the archived state able to receive under `ratchet_key`.
    pub(crate) fn previous_state_position(&self, ratchet_key: &PublicKey) -> Option<usize> {
        self.previous
            .iter()
            .position(|state| state.has_receiver_chain(ratchet_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SymmetricKey;
    use crate::kdf::{ChainKey, RootKey};
    use crate::keys::{IdentityKey, KeyPair};
    use rand_core::OsRng;

    fn state_with_base(base: PublicKey) -> SessionState {
        SessionState::new(
            3,
            IdentityKey::new(KeyPair::generate(&mut OsRng).public_key()),
            IdentityKey::new(KeyPair::generate(&mut OsRng).public_key()),
            RootKey::new(SymmetricKey::from_bytes([1u8; 32])),
            KeyPair::generate(&mut OsRng),
            ChainKey::new(SymmetricKey::from_bytes([2u8; 32]), 0),
            base,
        )
    }

    fn some_state() -> SessionState {
        state_with_base(KeyPair::generate(&mut OsRng).public_key())
    }

    #[test]
    fn fresh_record_has_no_state() {
        let record = SessionRecord::new();
        assert!(record.is_fresh());
        assert!(record.session_state().is_none());
    }

    #[test]
    fn promote_archives_the_old_current() {
        let mut record = SessionRecord::from_state(some_state());
        assert_eq!(record.previous_state_count(), 0);

        record.promote_state(some_state());
        assert_eq!(record.previous_state_count(), 1);
        assert!(!record.is_fresh());
    }

    #[test]
    fn archive_bound_evicts_oldest() {
        let mut record = SessionRecord::from_state(some_state());
        for _ in 0..(MAX_ARCHIVED_STATES + 10) {
            record.promote_state(some_state());
        }
        assert_eq!(record.previous_state_count(), MAX_ARCHIVED_STATES);
    }

    #[test]
    fn recognizes_known_base_key() {
        let base = KeyPair::generate(&mut OsRng).public_key();
        let mut record = SessionRecord::from_state(state_with_base(base));
        assert!(record.has_session_state(3, &base));
        assert!(!record.has_session_state(2, &base));

        // still recognized after being archived
        record.promote_state(some_state());
        assert!(record.has_session_state(3, &base));
    }
}
