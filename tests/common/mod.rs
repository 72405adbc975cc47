//! Shared test fixtures: a device with a full set of in-memory stores.

#![allow(dead_code)]

use rand_core::OsRng;
use signal_protocol::address::{ProtocolAddress, SenderKeyName};
use signal_protocol::bundle::PreKeyBundle;
use signal_protocol::context::Context;
use signal_protocol::group_cipher::GroupCipher;
use signal_protocol::group_session_builder::GroupSessionBuilder;
use signal_protocol::key_helper;
use signal_protocol::keys::IdentityKeyPair;
use signal_protocol::record::{PreKeyRecord, SignedPreKeyRecord};
use signal_protocol::session_builder::SessionBuilder;
use signal_protocol::session_cipher::SessionCipher;
use signal_protocol::storage::{
    InMemoryIdentityKeyStore, InMemoryPreKeyStore, InMemorySenderKeyStore, InMemorySessionStore,
    InMemorySignedPreKeyStore, PreKeyStore, SignedPreKeyStore,
};

pub type TestSessionBuilder = SessionBuilder<
    InMemorySessionStore,
    InMemoryIdentityKeyStore,
    InMemoryPreKeyStore,
    InMemorySignedPreKeyStore,
>;
pub type TestSessionCipher = SessionCipher<
    InMemorySessionStore,
    InMemoryIdentityKeyStore,
    InMemoryPreKeyStore,
    InMemorySignedPreKeyStore,
>;

/// One device with generated key material and populated in-memory stores.
pub struct TestUser {
    pub address: ProtocolAddress,
    pub registration_id: u32,
    pub identity: IdentityKeyPair,
    pub pre_keys: Vec<PreKeyRecord>,
    pub signed_pre_key: SignedPreKeyRecord,
    pub session_store: InMemorySessionStore,
    pub pre_key_store: InMemoryPreKeyStore,
    pub signed_pre_key_store: InMemorySignedPreKeyStore,
    pub identity_store: InMemoryIdentityKeyStore,
    pub sender_key_store: InMemorySenderKeyStore,
}

impl TestUser {
    pub fn new(name: &str, device_id: u32) -> Self {
        let ctx = Context::background();

        let identity = key_helper::generate_identity_key_pair(&mut OsRng);
        let registration_id = key_helper::generate_registration_id(&mut OsRng);
        let pre_keys = key_helper::generate_pre_keys(&mut OsRng, 1, 100);
        let signed_pre_key = key_helper::generate_signed_pre_key(&mut OsRng, &identity, 0);

        let mut pre_key_store = InMemoryPreKeyStore::new();
        for record in &pre_keys {
            pre_key_store
                .store_pre_key(&ctx, record.id(), record.clone())
                .unwrap();
        }

        let mut signed_pre_key_store = InMemorySignedPreKeyStore::new();
        signed_pre_key_store
            .store_signed_pre_key(&ctx, signed_pre_key.id(), signed_pre_key.clone())
            .unwrap();

        Self {
            address: ProtocolAddress::new(name, device_id),
            registration_id,
            identity: identity.clone(),
            pre_keys,
            signed_pre_key,
            session_store: InMemorySessionStore::new(),
            pre_key_store,
            signed_pre_key_store,
            identity_store: InMemoryIdentityKeyStore::new(identity, registration_id),
            sender_key_store: InMemorySenderKeyStore::new(),
        }
    }

    /// The bundle this user would publish, offering the one-time prekey at
    /// `pre_key_index`.
    pub fn pre_key_bundle(&self, pre_key_index: usize) -> PreKeyBundle {
        let pre_key = &self.pre_keys[pre_key_index];
        PreKeyBundle::new(
            self.registration_id,
            self.address.device_id(),
            Some((pre_key.id(), pre_key.key_pair().public_key())),
            self.signed_pre_key.id(),
            self.signed_pre_key.key_pair().public_key(),
            *self.signed_pre_key.signature(),
            *self.identity.identity_key(),
        )
    }

    /// A session builder for talking to `remote`, over this user's stores.
    pub fn session_builder(&self, remote: &ProtocolAddress) -> TestSessionBuilder {
        SessionBuilder::new(
            self.session_store.clone(),
            self.pre_key_store.clone(),
            self.signed_pre_key_store.clone(),
            self.identity_store.clone(),
            remote.clone(),
        )
    }

    /// A session cipher for talking to `remote`.
    pub fn session_cipher(&self, remote: &ProtocolAddress) -> TestSessionCipher {
        SessionCipher::new(self.session_builder(remote))
    }

    /// A group session builder over this user's sender key store.
    pub fn group_builder(&self) -> GroupSessionBuilder<InMemorySenderKeyStore> {
        GroupSessionBuilder::new(self.sender_key_store.clone())
    }

    /// A group cipher for the given (group, sender) chain.
    pub fn group_cipher(&self, name: &SenderKeyName) -> GroupCipher<InMemorySenderKeyStore> {
        GroupCipher::new(self.sender_key_store.clone(), name.clone())
    }
}
