//! X3DH key agreement and initial session derivation.
//!
//! Computes the extended triple Diffie-Hellman secret from long-term,
//! medium-term, and optional one-time key material, then seeds the Double
//! Ratchet state for whichever side of the exchange we are on:
//!
//! - The **initiator** (Alice) works from the peer's published bundle. Her
//!   state starts with a receiving chain under the peer's signed prekey
//!   (acting as his first ratchet key) and a sending chain one DH-ratchet
//!   step ahead of it.
//! - The **responder** (Bob) works from the embedded keys of a received
//!   prekey message and starts with just a sending chain; the initiator's
//!   ratchet key triggers his first DH-ratchet step on first decrypt.

use hkdf::Hkdf;
use rand_core::CryptoRngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::crypto::SymmetricKey;
use crate::kdf::{ChainKey, RootKey};
use crate::keys::{IdentityKey, IdentityKeyPair, KeyPair, PublicKey};
use crate::message::CIPHERTEXT_VERSION;
use crate::session_state::SessionState;

const X3DH_INFO: &[u8] = b"Signal_X3DH_v1";

/// Initiator-side inputs to the X3DH agreement.
pub struct AliceParameters<'a> {
    /// Our long-term identity key pair
    pub our_identity: &'a IdentityKeyPair,
    /// Our fresh ephemeral base key pair
    pub our_base_key: &'a KeyPair,
    /// The peer's identity key from the bundle
    pub their_identity: IdentityKey,
    /// The peer's signed prekey from the bundle
    pub their_signed_pre_key: PublicKey,
    /// The peer's one-time prekey, when the bundle carried one
    pub their_one_time_pre_key: Option<PublicKey>,
}

/// Responder-side inputs to the X3DH agreement.
pub struct BobParameters<'a> {
    /// Our long-term identity key pair
    pub our_identity: &'a IdentityKeyPair,
    /// The signed prekey the initiator computed against
    pub our_signed_pre_key: &'a KeyPair,
    /// The consumed one-time prekey, when the message references one
    pub our_one_time_pre_key: Option<&'a KeyPair>,
    /// The initiator's identity key from the message
    pub their_identity: IdentityKey,
    /// The initiator's ephemeral base key from the message
    pub their_base_key: PublicKey,
}

/// Derives the initiator's first session state.
///
/// `DH1 = DH(IK_A, SPK_B)`, `DH2 = DH(EK_A, IK_B)`, `DH3 = DH(EK_A,
/// SPK_B)`, optionally `DH4 = DH(EK_A, OPK_B)`. The signed prekey doubles
/// as the peer's initial ratchet key.
pub fn initialize_alice_session<R: CryptoRngCore>(
    rng: &mut R,
    parameters: &AliceParameters<'_>,
) -> SessionState {
    let dh1 = parameters
        .our_identity
        .secret_key()
        .diffie_hellman(&parameters.their_signed_pre_key);
    let dh2 = parameters
        .our_base_key
        .secret_key()
        .diffie_hellman(parameters.their_identity.public_key());
    let dh3 = parameters
        .our_base_key
        .secret_key()
        .diffie_hellman(&parameters.their_signed_pre_key);
    let dh4 = parameters
        .their_one_time_pre_key
        .as_ref()
        .map(|opk| parameters.our_base_key.secret_key().diffie_hellman(opk));

    let (root_key, receiver_chain) = derive_initial_keys(
        dh1.as_bytes(),
        dh2.as_bytes(),
        dh3.as_bytes(),
        dh4.as_ref().map(|dh| dh.as_bytes()),
    );

    // The peer's signed prekey is his initial ratchet key; step our sending
    // chain one DH ratchet past it.
    let sending_ratchet_key = KeyPair::generate(rng);
    let (root_key, sender_chain) =
        root_key.create_chain(&parameters.their_signed_pre_key, &sending_ratchet_key);

    let mut state = SessionState::new(
        CIPHERTEXT_VERSION,
        *parameters.our_identity.identity_key(),
        parameters.their_identity,
        root_key,
        sending_ratchet_key,
        sender_chain,
        parameters.our_base_key.public_key(),
    );
    state.add_receiver_chain(parameters.their_signed_pre_key, receiver_chain);
    state
}

/// Derives the responder's first session state.
///
/// Mirrors [`initialize_alice_session`] with the DH roles reversed; the
/// responder's signed prekey pair becomes his first ratchet key pair.
#[must_use]
pub fn initialize_bob_session(parameters: &BobParameters<'_>) -> SessionState {
    let dh1 = parameters
        .our_signed_pre_key
        .secret_key()
        .diffie_hellman(parameters.their_identity.public_key());
    let dh2 = parameters
        .our_identity
        .secret_key()
        .diffie_hellman(&parameters.their_base_key);
    let dh3 = parameters
        .our_signed_pre_key
        .secret_key()
        .diffie_hellman(&parameters.their_base_key);
    let dh4 = parameters
        .our_one_time_pre_key
        .map(|opk| opk.secret_key().diffie_hellman(&parameters.their_base_key));

    let (root_key, sender_chain) = derive_initial_keys(
        dh1.as_bytes(),
        dh2.as_bytes(),
        dh3.as_bytes(),
        dh4.as_ref().map(|dh| dh.as_bytes()),
    );

    SessionState::new(
        CIPHERTEXT_VERSION,
        *parameters.our_identity.identity_key(),
        parameters.their_identity,
        root_key,
        parameters.our_signed_pre_key.clone(),
        sender_chain,
        parameters.their_base_key,
    )
}

/// `(RK, CK) = HKDF(salt = 0^32, ikm = 0xFF^32 || DH1 || DH2 || DH3 ||
/// [DH4], info = "Signal_X3DH_v1")`.
///
/// The all-ones prefix keeps X25519 outputs out of the value range any
/// other protocol use of the identity key could produce.
///
/// # Panics
///
/// Never panics in practice. The internal `expect()` is only a safeguard
/// for the HKDF expand operation with a fixed 64-byte output length,
/// which is always valid.
fn derive_initial_keys(
    dh1: &[u8; 32],
    dh2: &[u8; 32],
    dh3: &[u8; 32],
    dh4: Option<&[u8; 32]>,
) -> (RootKey, ChainKey) {
    let mut ikm = [0u8; 32 * 5];
    let mut len = 0;

    ikm[len..len + 32].copy_from_slice(&[0xFF; 32]);
    len += 32;
    ikm[len..len + 32].copy_from_slice(dh1);
    len += 32;
    ikm[len..len + 32].copy_from_slice(dh2);
    len += 32;
    ikm[len..len + 32].copy_from_slice(dh3);
    len += 32;
    if let Some(dh4) = dh4 {
        ikm[len..len + 32].copy_from_slice(dh4);
        len += 32;
    }

    let salt = [0u8; 32];
    let hkdf = Hkdf::<Sha256>::new(Some(&salt), &ikm[..len]);

    let mut output = [0u8; 64];
    // SAFETY: 64-byte output is always valid for HKDF-SHA256
    hkdf.expand(X3DH_INFO, &mut output)
        .expect("64-byte HKDF output is always valid");
    ikm.zeroize();

    let mut root_bytes = [0u8; 32];
    root_bytes.copy_from_slice(&output[..32]);
    let mut chain_bytes = [0u8; 32];
    chain_bytes.copy_from_slice(&output[32..]);
    output.zeroize();

    (
        RootKey::new(SymmetricKey::from_bytes(root_bytes)),
        ChainKey::new(SymmetricKey::from_bytes(chain_bytes), 0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    struct Exchange {
        alice: SessionState,
        bob: SessionState,
        signed_pre_key: KeyPair,
    }

    fn run_exchange(with_one_time_key: bool) -> Exchange {
        let alice_identity = IdentityKeyPair::generate(&mut OsRng);
        let bob_identity = IdentityKeyPair::generate(&mut OsRng);

        let base_key = KeyPair::generate(&mut OsRng);
        let signed_pre_key = KeyPair::generate(&mut OsRng);
        let one_time_pre_key = KeyPair::generate(&mut OsRng);

        let alice = initialize_alice_session(
            &mut OsRng,
            &AliceParameters {
                our_identity: &alice_identity,
                our_base_key: &base_key,
                their_identity: *bob_identity.identity_key(),
                their_signed_pre_key: signed_pre_key.public_key(),
                their_one_time_pre_key: with_one_time_key
                    .then(|| one_time_pre_key.public_key()),
            },
        );

        let bob = initialize_bob_session(&BobParameters {
            our_identity: &bob_identity,
            our_signed_pre_key: &signed_pre_key,
            our_one_time_pre_key: with_one_time_key.then_some(&one_time_pre_key),
            their_identity: *alice_identity.identity_key(),
            their_base_key: base_key.public_key(),
        });

        Exchange {
            alice,
            bob,
            signed_pre_key,
        }
    }

    #[test]
    fn alice_receiver_chain_matches_bob_sender_chain() {
        for with_opk in [true, false] {
            let exchange = run_exchange(with_opk);

            let bob_sender = exchange.bob.sender_chain().chain_key();
            let alice_receiver = exchange
                .alice
                .receiver_chain_key(&exchange.signed_pre_key.public_key())
                .expect("alice must track bob's initial ratchet key");

            assert_eq!(alice_receiver.as_bytes(), bob_sender.as_bytes());
            assert_eq!(alice_receiver.index(), 0);
        }
    }

    #[test]
    fn bob_ratchet_step_recovers_alice_sending_chain() {
        let exchange = run_exchange(true);

        // Bob sees Alice's ratchet key and performs his first DH step.
        let alice_ratchet = exchange.alice.sender_chain().ratchet_key_pair().public_key();
        let (bob_root, bob_receiver) = exchange
            .bob
            .root_key()
            .create_chain(&alice_ratchet, &exchange.signed_pre_key);

        assert_eq!(
            bob_receiver.as_bytes(),
            exchange.alice.sender_chain().chain_key().as_bytes()
        );
        assert_eq!(bob_root.as_bytes(), exchange.alice.root_key().as_bytes());
    }

    #[test]
    fn one_time_prekey_changes_the_secret() {
        let alice_identity = IdentityKeyPair::generate(&mut OsRng);
        let bob_identity = IdentityKeyPair::generate(&mut OsRng);
        let base_key = KeyPair::generate(&mut OsRng);
        let signed_pre_key = KeyPair::generate(&mut OsRng);
        let one_time_pre_key = KeyPair::generate(&mut OsRng);

        let with = initialize_bob_session(&BobParameters {
            our_identity: &bob_identity,
            our_signed_pre_key: &signed_pre_key,
            our_one_time_pre_key: Some(&one_time_pre_key),
            their_identity: *alice_identity.identity_key(),
            their_base_key: base_key.public_key(),
        });
        let without = initialize_bob_session(&BobParameters {
            our_identity: &bob_identity,
            our_signed_pre_key: &signed_pre_key,
            our_one_time_pre_key: None,
            their_identity: *alice_identity.identity_key(),
            their_base_key: base_key.public_key(),
        });

        assert_ne!(with.root_key().as_bytes(), without.root_key().as_bytes());
    }

    #[test]
    fn sessions_record_identities_and_base_key() {
        let exchange = run_exchange(true);

        assert_eq!(exchange.alice.remote_identity(), exchange.bob.local_identity());
        assert_eq!(exchange.bob.remote_identity(), exchange.alice.local_identity());
        assert_eq!(exchange.alice.base_key(), exchange.bob.base_key());
        assert_eq!(exchange.alice.session_version(), CIPHERTEXT_VERSION);
    }
}
