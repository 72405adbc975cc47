//! Sender key records: a bounded list of chain states per (group, sender).
//!
//! Multiple states tolerate a sender resetting or rotating their chain
//! while messages encrypted under the old chain are still in flight.
//! States are kept newest first; the oldest is evicted past the cap.

use std::collections::VecDeque;

use crate::sender_key_state::SenderKeyState;

/// Chain states retained per (group, sender) pair.
pub const MAX_SENDER_KEY_STATES: usize = 5;

/// All known chain states for one (group, sender) pair.
#[derive(Clone, Debug, Default)]
pub struct SenderKeyRecord {
    states: VecDeque<SenderKeyState>,
}

impl SenderKeyRecord {
    /// An empty record with no chain states.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no chain state is known yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// The newest chain state.
    #[must_use]
    pub fn sender_key_state(&self) -> Option<&SenderKeyState> {
        self.states.front()
    }

    /// Mutable access to the newest chain state.
    pub fn sender_key_state_mut(&mut self) -> Option<&mut SenderKeyState> {
        self.states.front_mut()
    }

    /// The state for a specific chain ID.
    #[must_use]
    pub fn state_for_chain_id(&self, chain_id: u32) -> Option<&SenderKeyState> {
        self.states.iter().find(|state| state.chain_id() == chain_id)
    }

    /// Mutable access to the state for a specific chain ID.
    pub fn state_for_chain_id_mut(&mut self, chain_id: u32) -> Option<&mut SenderKeyState> {
        self.states
            .iter_mut()
            .find(|state| state.chain_id() == chain_id)
    }

    /// Installs a new chain state as newest, evicting the oldest past the
    /// cap.
    pub fn add_sender_key_state(&mut self, state: SenderKeyState) {
        self.states.push_front(state);
        if self.states.len() > MAX_SENDER_KEY_STATES {
            self.states.pop_back();
        }
    }

    /// Replaces every state with `state` (chain reset).
    pub fn set_sender_key_state(&mut self, state: SenderKeyState) {
        self.states.clear();
        self.states.push_front(state);
    }
}
