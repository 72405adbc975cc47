//! Fuzz target for plain ratchet message parsing
//!
//! Arbitrary input must never panic, and anything that parses must
//! survive a serialization roundtrip unchanged.

#![no_main]

use libfuzzer_sys::fuzz_target;
use signal_protocol::message::SignalMessage;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = SignalMessage::from_bytes(data) {
        let serialized = message.to_bytes();
        let roundtrip = SignalMessage::from_bytes(&serialized).expect("roundtrip must parse");

        assert_eq!(message.ratchet_key(), roundtrip.ratchet_key());
        assert_eq!(message.counter(), roundtrip.counter());
        assert_eq!(message.previous_counter(), roundtrip.previous_counter());
        assert_eq!(message.ciphertext(), roundtrip.ciphertext());
    }
});
