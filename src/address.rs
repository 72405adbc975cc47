//! Addressing of protocol endpoints and group senders.
//!
//! Addresses are value types: two addresses compare equal when their name
//! and device ID match, and they hash accordingly. They are used as lookup
//! keys throughout the store interfaces.

use std::fmt;

/// One logical endpoint: a named identity plus a device index.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProtocolAddress {
    name: String,
    device_id: u32,
}

impl ProtocolAddress {
    /// Creates an address from a stable name and a device index.
    pub fn new(name: impl Into<String>, device_id: u32) -> Self {
        Self {
            name: name.into(),
            device_id,
        }
    }

    /// The stable identifier shared by all of a user's devices.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The device index within the name's device family.
    #[must_use]
    pub fn device_id(&self) -> u32 {
        self.device_id
    }
}

impl fmt::Display for ProtocolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.device_id)
    }
}

impl fmt::Debug for ProtocolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProtocolAddress({self})")
    }
}

/// Identifies one sender's chain within one group: (group, sending device).
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SenderKeyName {
    group_id: String,
    sender: ProtocolAddress,
}

impl SenderKeyName {
    /// Creates a sender key name for `sender`'s chain in `group_id`.
    pub fn new(group_id: impl Into<String>, sender: ProtocolAddress) -> Self {
        Self {
            group_id: group_id.into(),
            sender,
        }
    }

    /// The group identifier.
    #[must_use]
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// The sending device.
    #[must_use]
    pub fn sender(&self) -> &ProtocolAddress {
        &self.sender
    }
}

impl fmt::Display for SenderKeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.group_id, self.sender)
    }
}

impl fmt::Debug for SenderKeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SenderKeyName({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn address_equality_is_by_value() {
        let a = ProtocolAddress::new("alice", 1);
        let b = ProtocolAddress::new("alice", 1);
        let c = ProtocolAddress::new("alice", 2);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn address_works_as_map_key_across_instances() {
        let mut map = HashMap::new();
        map.insert(ProtocolAddress::new("bob", 3), 42u32);

        // A separately constructed, equal address must find the entry.
        assert_eq!(map.get(&ProtocolAddress::new("bob", 3)), Some(&42));
    }

    #[test]
    fn sender_key_name_distinguishes_groups_and_senders() {
        let alice = ProtocolAddress::new("alice", 1);
        let a = SenderKeyName::new("room", alice.clone());
        let b = SenderKeyName::new("room", ProtocolAddress::new("bob", 1));
        let c = SenderKeyName::new("other", alice);

        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
