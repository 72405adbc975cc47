//! Fuzz target for prekey-wrapped message parsing

#![no_main]

use libfuzzer_sys::fuzz_target;
use signal_protocol::message::PreKeySignalMessage;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = PreKeySignalMessage::from_bytes(data) {
        let serialized = message.to_bytes();
        let roundtrip = PreKeySignalMessage::from_bytes(&serialized).expect("roundtrip must parse");

        assert_eq!(message.registration_id(), roundtrip.registration_id());
        assert_eq!(message.pre_key_id(), roundtrip.pre_key_id());
        assert_eq!(message.signed_pre_key_id(), roundtrip.signed_pre_key_id());
        assert_eq!(message.base_key(), roundtrip.base_key());
        assert_eq!(message.identity_key(), roundtrip.identity_key());
        assert_eq!(message.message().counter(), roundtrip.message().counter());
    }
});
