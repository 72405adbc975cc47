//! Store interfaces the protocol core depends on, plus in-memory
//! reference implementations.
//!
//! The traits are the crate's only persistence boundary. Implementations
//! may block on I/O inside any method; every method receives the caller's
//! [`Context`] so a cancelled operation can stop before mutating anything.
//! Each store must present linearizable load/store semantics per key; the
//! in-memory implementations are cheap-to-clone handles over shared state,
//! so a builder and a cipher can operate on the same underlying maps.
//!
//! Identity pinning follows trust-on-first-use: an address with no saved
//! identity trusts the first key it sees; once pinned, a differing key is
//! untrusted until the caller explicitly approves the replacement by
//! calling [`IdentityKeyStore::save_identity`] with the new key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::address::{ProtocolAddress, SenderKeyName};
use crate::context::Context;
use crate::error::{Result, SignalError};
use crate::keys::{IdentityKey, IdentityKeyPair};
use crate::record::{PreKeyRecord, SignedPreKeyRecord};
use crate::sender_key_record::SenderKeyRecord;
use crate::session_record::SessionRecord;

/// Local identity material and remote identity pinning.
pub trait IdentityKeyStore: Send {
    /// The local device's identity key pair.
    fn identity_key_pair(&self, ctx: &Context) -> Result<IdentityKeyPair>;

    /// The local device's registration ID.
    fn local_registration_id(&self, ctx: &Context) -> Result<u32>;

    /// Pins (or explicitly replaces) the identity key for an address.
    fn save_identity(
        &mut self,
        ctx: &Context,
        address: &ProtocolAddress,
        identity: &IdentityKey,
    ) -> Result<()>;

    /// Whether `identity` is trusted for `address`: true when no key is
    /// pinned yet, or when the pinned key matches.
    fn is_trusted_identity(
        &self,
        ctx: &Context,
        address: &ProtocolAddress,
        identity: &IdentityKey,
    ) -> Result<bool>;
}

/// One-time prekey storage, keyed by numeric ID.
pub trait PreKeyStore: Send {
    /// Loads a prekey, `None` when absent (consumed or never stored).
    fn load_pre_key(&self, ctx: &Context, id: u32) -> Result<Option<PreKeyRecord>>;

    /// Stores a prekey under its ID.
    fn store_pre_key(&mut self, ctx: &Context, id: u32, record: PreKeyRecord) -> Result<()>;

    /// Whether a prekey exists under `id`.
    fn contains_pre_key(&self, ctx: &Context, id: u32) -> Result<bool>;

    /// Removes the prekey under `id`. Removing an absent ID is a no-op.
    fn remove_pre_key(&mut self, ctx: &Context, id: u32) -> Result<()>;
}

/// Signed prekey storage, keyed by numeric ID.
pub trait SignedPreKeyStore: Send {
    /// Loads a signed prekey, `None` when absent.
    fn load_signed_pre_key(&self, ctx: &Context, id: u32) -> Result<Option<SignedPreKeyRecord>>;

    /// All stored signed prekeys.
    fn load_signed_pre_keys(&self, ctx: &Context) -> Result<Vec<SignedPreKeyRecord>>;

    /// Stores a signed prekey under its ID.
    fn store_signed_pre_key(
        &mut self,
        ctx: &Context,
        id: u32,
        record: SignedPreKeyRecord,
    ) -> Result<()>;

    /// Whether a signed prekey exists under `id`.
    fn contains_signed_pre_key(&self, ctx: &Context, id: u32) -> Result<bool>;

    /// Removes the signed prekey under `id`.
    fn remove_signed_pre_key(&mut self, ctx: &Context, id: u32) -> Result<()>;
}

/// Session record storage, keyed by address.
pub trait SessionStore: Send {
    /// Loads the record for `address`, or a fresh empty record when none
    /// is stored. Loading never persists.
    fn load_session(&self, ctx: &Context, address: &ProtocolAddress) -> Result<SessionRecord>;

    /// Persists the record for `address`.
    fn store_session(
        &mut self,
        ctx: &Context,
        address: &ProtocolAddress,
        record: SessionRecord,
    ) -> Result<()>;

    /// Whether a record is stored for `address`.
    fn contains_session(&self, ctx: &Context, address: &ProtocolAddress) -> Result<bool>;

    /// Deletes the record for `address`.
    fn delete_session(&mut self, ctx: &Context, address: &ProtocolAddress) -> Result<()>;

    /// Deletes every record in `name`'s device family.
    fn delete_all_sessions(&mut self, ctx: &Context, name: &str) -> Result<()>;

    /// Device IDs (other than the primary, 1) with sessions under `name`.
    fn sub_device_sessions(&self, ctx: &Context, name: &str) -> Result<Vec<u32>>;
}

/// Sender key record storage, keyed by (group, sender address).
pub trait SenderKeyStore: Send {
    /// Loads the record for `name`, or a fresh empty record when none is
    /// stored. Loading never persists.
    fn load_sender_key(&self, ctx: &Context, name: &SenderKeyName) -> Result<SenderKeyRecord>;

    /// Persists the record for `name`.
    fn store_sender_key(
        &mut self,
        ctx: &Context,
        name: &SenderKeyName,
        record: SenderKeyRecord,
    ) -> Result<()>;
}

/// In-memory identity store.
#[derive(Clone, Debug)]
pub struct InMemoryIdentityKeyStore {
    identity_key_pair: IdentityKeyPair,
    registration_id: u32,
    trusted_keys: Arc<Mutex<HashMap<ProtocolAddress, IdentityKey>>>,
}

impl InMemoryIdentityKeyStore {
    /// Creates a store for the given local identity.
    #[must_use]
    pub fn new(identity_key_pair: IdentityKeyPair, registration_id: u32) -> Self {
        Self {
            identity_key_pair,
            registration_id,
            trusted_keys: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl IdentityKeyStore for InMemoryIdentityKeyStore {
    fn identity_key_pair(&self, _ctx: &Context) -> Result<IdentityKeyPair> {
        Ok(self.identity_key_pair.clone())
    }

    fn local_registration_id(&self, _ctx: &Context) -> Result<u32> {
        Ok(self.registration_id)
    }

    fn save_identity(
        &mut self,
        ctx: &Context,
        address: &ProtocolAddress,
        identity: &IdentityKey,
    ) -> Result<()> {
        ctx.check()?;
        let mut trusted = self.trusted_keys.lock().map_err(|_| SignalError::Storage)?;
        trusted.insert(address.clone(), *identity);
        Ok(())
    }

    fn is_trusted_identity(
        &self,
        ctx: &Context,
        address: &ProtocolAddress,
        identity: &IdentityKey,
    ) -> Result<bool> {
        ctx.check()?;
        let trusted = self.trusted_keys.lock().map_err(|_| SignalError::Storage)?;
        Ok(match trusted.get(address) {
            Some(pinned) => pinned == identity,
            None => true,
        })
    }
}

/// In-memory one-time prekey store.
#[derive(Clone, Debug, Default)]
pub struct InMemoryPreKeyStore {
    pre_keys: Arc<Mutex<HashMap<u32, PreKeyRecord>>>,
}

impl InMemoryPreKeyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreKeyStore for InMemoryPreKeyStore {
    fn load_pre_key(&self, ctx: &Context, id: u32) -> Result<Option<PreKeyRecord>> {
        ctx.check()?;
        let store = self.pre_keys.lock().map_err(|_| SignalError::Storage)?;
        Ok(store.get(&id).cloned())
    }

    fn store_pre_key(&mut self, ctx: &Context, id: u32, record: PreKeyRecord) -> Result<()> {
        ctx.check()?;
        let mut store = self.pre_keys.lock().map_err(|_| SignalError::Storage)?;
        store.insert(id, record);
        Ok(())
    }

    fn contains_pre_key(&self, ctx: &Context, id: u32) -> Result<bool> {
        ctx.check()?;
        let store = self.pre_keys.lock().map_err(|_| SignalError::Storage)?;
        Ok(store.contains_key(&id))
    }

    fn remove_pre_key(&mut self, ctx: &Context, id: u32) -> Result<()> {
        ctx.check()?;
        let mut store = self.pre_keys.lock().map_err(|_| SignalError::Storage)?;
        store.remove(&id);
        Ok(())
    }
}

/// In-memory signed prekey store.
#[derive(Clone, Debug, Default)]
pub struct InMemorySignedPreKeyStore {
    signed_pre_keys: Arc<Mutex<HashMap<u32, SignedPreKeyRecord>>>,
}

impl InMemorySignedPreKeyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignedPreKeyStore for InMemorySignedPreKeyStore {
    fn load_signed_pre_key(&self, ctx: &Context, id: u32) -> Result<Option<SignedPreKeyRecord>> {
        ctx.check()?;
        let store = self
            .signed_pre_keys
            .lock()
            .map_err(|_| SignalError::Storage)?;
        Ok(store.get(&id).cloned())
    }

    fn load_signed_pre_keys(&self, ctx: &Context) -> Result<Vec<SignedPreKeyRecord>> {
        ctx.check()?;
        let store = self
            .signed_pre_keys
            .lock()
            .map_err(|_| SignalError::Storage)?;
        Ok(store.values().cloned().collect())
    }

    fn store_signed_pre_key(
        &mut self,
        ctx: &Context,
        id: u32,
        record: SignedPreKeyRecord,
    ) -> Result<()> {
        ctx.check()?;
        let mut store = self
            .signed_pre_keys
            .lock()
            .map_err(|_| SignalError::Storage)?;
        store.insert(id, record);
        Ok(())
    }

    fn contains_signed_pre_key(&self, ctx: &Context, id: u32) -> Result<bool> {
        ctx.check()?;
        let store = self
            .signed_pre_keys
            .lock()
            .map_err(|_| SignalError::Storage)?;
        Ok(store.contains_key(&id))
    }

    fn remove_signed_pre_key(&mut self, ctx: &Context, id: u32) -> Result<()> {
        ctx.check()?;
        let mut store = self
            .signed_pre_keys
            .lock()
            .map_err(|_| SignalError::Storage)?;
        store.remove(&id);
        Ok(())
    }
}

/// In-memory session store.
#[derive(Clone, Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<Mutex<HashMap<ProtocolAddress, SessionRecord>>>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn load_session(&self, ctx: &Context, address: &ProtocolAddress) -> Result<SessionRecord> {
        ctx.check()?;
        let store = self.sessions.lock().map_err(|_| SignalError::Storage)?;
        Ok(store.get(address).cloned().unwrap_or_default())
    }

    fn store_session(
        &mut self,
        ctx: &Context,
        address: &ProtocolAddress,
        record: SessionRecord,
    ) -> Result<()> {
        ctx.check()?;
        let mut store = self.sessions.lock().map_err(|_| SignalError::Storage)?;
        store.insert(address.clone(), record);
        Ok(())
    }

    fn contains_session(&self, ctx: &Context, address: &ProtocolAddress) -> Result<bool> {
        ctx.check()?;
        let store = self.sessions.lock().map_err(|_| SignalError::Storage)?;
        Ok(store.contains_key(address))
    }

    fn delete_session(&mut self, ctx: &Context, address: &ProtocolAddress) -> Result<()> {
        ctx.check()?;
        let mut store = self.sessions.lock().map_err(|_| SignalError::Storage)?;
        store.remove(address);
        Ok(())
    }

    fn delete_all_sessions(&mut self, ctx: &Context, name: &str) -> Result<()> {
        ctx.check()?;
        let mut store = self.sessions.lock().map_err(|_| SignalError::Storage)?;
        store.retain(|address, _| address.name() != name);
        Ok(())
    }

    fn sub_device_sessions(&self, ctx: &Context, name: &str) -> Result<Vec<u32>> {
        ctx.check()?;
        let store = self.sessions.lock().map_err(|_| SignalError::Storage)?;
        Ok(store
            .keys()
            .filter(|address| address.name() == name && address.device_id() != 1)
            .map(ProtocolAddress::device_id)
            .collect())
    }
}

/// In-memory sender key store.
#[derive(Clone, Debug, Default)]
pub struct InMemorySenderKeyStore {
    sender_keys: Arc<Mutex<HashMap<SenderKeyName, SenderKeyRecord>>>,
}

impl InMemorySenderKeyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SenderKeyStore for InMemorySenderKeyStore {
    fn load_sender_key(&self, ctx: &Context, name: &SenderKeyName) -> Result<SenderKeyRecord> {
        ctx.check()?;
        let store = self.sender_keys.lock().map_err(|_| SignalError::Storage)?;
        Ok(store.get(name).cloned().unwrap_or_default())
    }

    fn store_sender_key(
        &mut self,
        ctx: &Context,
        name: &SenderKeyName,
        record: SenderKeyRecord,
    ) -> Result<()> {
        ctx.check()?;
        let mut store = self.sender_keys.lock().map_err(|_| SignalError::Storage)?;
        store.insert(name.clone(), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyPair;
    use rand_core::OsRng;

    #[test]
    fn identity_store_trusts_first_then_pins() {
        let identity = IdentityKeyPair::generate(&mut OsRng);
        let mut store = InMemoryIdentityKeyStore::new(identity, 42);
        let ctx = Context::background();
        let address = ProtocolAddress::new("alice", 1);

        let first = IdentityKey::new(KeyPair::generate(&mut OsRng).public_key());
        let second = IdentityKey::new(KeyPair::generate(&mut OsRng).public_key());

        // empty: any key trusted
        assert!(store.is_trusted_identity(&ctx, &address, &first).unwrap());

        // pinned: only the saved key trusted
        store.save_identity(&ctx, &address, &first).unwrap();
        assert!(store.is_trusted_identity(&ctx, &address, &first).unwrap());
        assert!(!store.is_trusted_identity(&ctx, &address, &second).unwrap());

        // explicit override re-pins
        store.save_identity(&ctx, &address, &second).unwrap();
        assert!(store.is_trusted_identity(&ctx, &address, &second).unwrap());
        assert!(!store.is_trusted_identity(&ctx, &address, &first).unwrap());
    }

    #[test]
    fn pre_key_store_remove_consumes() {
        let mut store = InMemoryPreKeyStore::new();
        let ctx = Context::background();

        store
            .store_pre_key(&ctx, 7, PreKeyRecord::new(7, KeyPair::generate(&mut OsRng)))
            .unwrap();
        assert!(store.contains_pre_key(&ctx, 7).unwrap());

        store.remove_pre_key(&ctx, 7).unwrap();
        assert!(!store.contains_pre_key(&ctx, 7).unwrap());
        assert!(store.load_pre_key(&ctx, 7).unwrap().is_none());
    }

    #[test]
    fn session_store_tracks_device_family() {
        let mut store = InMemorySessionStore::new();
        let ctx = Context::background();

        for device_id in 1..=3 {
            store
                .store_session(
                    &ctx,
                    &ProtocolAddress::new("bob", device_id),
                    SessionRecord::new(),
                )
                .unwrap();
        }

        let mut devices = store.sub_device_sessions(&ctx, "bob").unwrap();
        devices.sort_unstable();
        assert_eq!(devices, vec![2, 3]);

        store.delete_all_sessions(&ctx, "bob").unwrap();
        assert!(!store
            .contains_session(&ctx, &ProtocolAddress::new("bob", 1))
            .unwrap());
    }

    #[test]
    fn cancelled_context_blocks_store_access() {
        let mut store = InMemoryPreKeyStore::new();
        let (ctx, handle) = Context::cancellable();
        handle.cancel();

        let result = store.store_pre_key(&ctx, 1, PreKeyRecord::new(1, KeyPair::generate(&mut OsRng)));
        assert_eq!(result, Err(SignalError::Cancelled));
    }
}
