//! Property-based tests for protocol invariants across random inputs.

mod common;

use common::TestUser;
use proptest::prelude::*;
use rand_core::OsRng;
use signal_protocol::context::Context;
use signal_protocol::keys::{IdentityKeyPair, KeyPair};
use signal_protocol::message::{
    CiphertextMessage, PreKeySignalMessage, SenderKeyDistributionMessage, SenderKeyMessage,
    SignalMessage,
};
use signal_protocol::ratchet::{
    initialize_alice_session, initialize_bob_session, AliceParameters, BobParameters,
};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn x3dh_sides_always_agree(seed in any::<u64>(), with_opk in any::<bool>()) {
        use rand::SeedableRng;
        use rand::rngs::StdRng;

        let mut rng = StdRng::seed_from_u64(seed);

        let alice_identity = IdentityKeyPair::generate(&mut rng);
        let bob_identity = IdentityKeyPair::generate(&mut rng);
        let base_key = KeyPair::generate(&mut rng);
        let signed_pre_key = KeyPair::generate(&mut rng);
        let one_time_pre_key = KeyPair::generate(&mut rng);

        let alice = initialize_alice_session(&mut rng, &AliceParameters {
            our_identity: &alice_identity,
            our_base_key: &base_key,
            their_identity: *bob_identity.identity_key(),
            their_signed_pre_key: signed_pre_key.public_key(),
            their_one_time_pre_key: with_opk.then(|| one_time_pre_key.public_key()),
        });
        let bob = initialize_bob_session(&BobParameters {
            our_identity: &bob_identity,
            our_signed_pre_key: &signed_pre_key,
            our_one_time_pre_key: with_opk.then_some(&one_time_pre_key),
            their_identity: *alice_identity.identity_key(),
            their_base_key: base_key.public_key(),
        });

        // Alice's receiving chain under Bob's initial ratchet key equals
        // Bob's sending chain.
        let alice_receiver = alice
            .receiver_chain_key(&signed_pre_key.public_key())
            .expect("receiver chain must exist");
        prop_assert_eq!(
            alice_receiver.as_bytes(),
            bob.sender_chain().chain_key().as_bytes()
        );
    }

    #[test]
    fn session_roundtrip_preserves_any_payload(
        message in prop::collection::vec(any::<u8>(), 0..1000)
    ) {
        let ctx = Context::background();
        let alice = TestUser::new("alice", 1);
        let bob = TestUser::new("bob", 2);

        alice
            .session_builder(&bob.address)
            .process_bundle(&ctx, &mut OsRng, &bob.pre_key_bundle(0))
            .unwrap();
        let mut alice_cipher = alice.session_cipher(&bob.address);
        let mut bob_cipher = bob.session_cipher(&alice.address);

        let encrypted = alice_cipher.encrypt(&ctx, &message).unwrap();
        let received = match &encrypted {
            CiphertextMessage::PreKey(_) =>
                PreKeySignalMessage::from_bytes(&encrypted.to_bytes()).unwrap(),
            CiphertextMessage::Signal(_) => panic!("first message must be prekey-wrapped"),
        };
        let decrypted = bob_cipher.decrypt_prekey(&ctx, &mut OsRng, &received).unwrap();

        prop_assert_eq!(decrypted, message);
    }

    #[test]
    fn ciphertexts_never_repeat(count in 2usize..24) {
        let ctx = Context::background();
        let alice = TestUser::new("alice", 1);
        let bob = TestUser::new("bob", 2);

        alice
            .session_builder(&bob.address)
            .process_bundle(&ctx, &mut OsRng, &bob.pre_key_bundle(0))
            .unwrap();
        let mut alice_cipher = alice.session_cipher(&bob.address);

        // The same plaintext, encrypted repeatedly, yields distinct
        // ciphertexts: every message sits at a different chain position.
        let mut ciphertexts: Vec<Vec<u8>> = Vec::new();
        for _ in 0..count {
            let encrypted = alice_cipher.encrypt(&ctx, b"same plaintext").unwrap();
            let body = match &encrypted {
                CiphertextMessage::PreKey(message) => message.message().ciphertext().to_vec(),
                CiphertextMessage::Signal(message) => message.ciphertext().to_vec(),
            };
            ciphertexts.push(body);
        }

        for i in 0..ciphertexts.len() {
            for j in (i + 1)..ciphertexts.len() {
                prop_assert_ne!(&ciphertexts[i], &ciphertexts[j]);
            }
        }
    }

    #[test]
    fn group_roundtrip_preserves_any_payload(
        message in prop::collection::vec(any::<u8>(), 0..1000)
    ) {
        let ctx = Context::background();
        let alice = TestUser::new("alice", 1);
        let bob = TestUser::new("bob", 2);
        let name = signal_protocol::address::SenderKeyName::new("prop", alice.address.clone());

        let distribution = alice.group_builder().create(&ctx, &mut OsRng, &name).unwrap();
        bob.group_builder().process(&ctx, &name, &distribution).unwrap();

        let encrypted = alice.group_cipher(&name).encrypt(&ctx, &message).unwrap();
        let decrypted = bob
            .group_cipher(&name)
            .decrypt(&ctx, &SenderKeyMessage::from_bytes(&encrypted.to_bytes()).unwrap())
            .unwrap();

        prop_assert_eq!(decrypted, message);
    }

    #[test]
    fn signal_message_parsing_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = SignalMessage::from_bytes(&bytes);
        let _ = PreKeySignalMessage::from_bytes(&bytes);
        let _ = SenderKeyMessage::from_bytes(&bytes);
        let _ = SenderKeyDistributionMessage::from_bytes(&bytes);
    }

    #[test]
    fn signal_message_wire_roundtrip(
        counter in any::<u32>(),
        previous_counter in any::<u32>(),
        ciphertext in prop::collection::vec(any::<u8>(), 16..128)
    ) {
        let ratchet_key = KeyPair::generate(&mut OsRng).public_key();
        let message = SignalMessage::new(ratchet_key, counter, previous_counter, ciphertext);

        let parsed = SignalMessage::from_bytes(&message.to_bytes()).unwrap();
        prop_assert_eq!(parsed.counter(), counter);
        prop_assert_eq!(parsed.previous_counter(), previous_counter);
        prop_assert_eq!(parsed.ratchet_key(), &ratchet_key);
        prop_assert_eq!(parsed.ciphertext(), message.ciphertext());
    }
}
