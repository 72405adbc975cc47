//! Fuzz target for sender key message parsing

#![no_main]

use libfuzzer_sys::fuzz_target;
use signal_protocol::message::SenderKeyMessage;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = SenderKeyMessage::from_bytes(data) {
        let serialized = message.to_bytes();
        let roundtrip = SenderKeyMessage::from_bytes(&serialized).expect("roundtrip must parse");

        assert_eq!(message.group_id(), roundtrip.group_id());
        assert_eq!(message.chain_id(), roundtrip.chain_id());
        assert_eq!(message.iteration(), roundtrip.iteration());
        assert_eq!(message.ciphertext(), roundtrip.ciphertext());
        assert_eq!(message.signature(), roundtrip.signature());
    }
});
