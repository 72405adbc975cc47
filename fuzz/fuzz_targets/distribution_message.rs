//! Fuzz target for sender key distribution message parsing

#![no_main]

use libfuzzer_sys::fuzz_target;
use signal_protocol::message::SenderKeyDistributionMessage;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = SenderKeyDistributionMessage::from_bytes(data) {
        let serialized = message.to_bytes();
        let roundtrip =
            SenderKeyDistributionMessage::from_bytes(&serialized).expect("roundtrip must parse");

        assert_eq!(message.group_id(), roundtrip.group_id());
        assert_eq!(message.chain_id(), roundtrip.chain_id());
        assert_eq!(message.iteration(), roundtrip.iteration());
        assert_eq!(message.chain_key(), roundtrip.chain_key());
        assert_eq!(message.signing_key(), roundtrip.signing_key());
    }
});
