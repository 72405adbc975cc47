use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand_core::OsRng;
use signal_protocol::address::{ProtocolAddress, SenderKeyName};
use signal_protocol::context::Context;
use signal_protocol::group_cipher::GroupCipher;
use signal_protocol::group_session_builder::GroupSessionBuilder;
use signal_protocol::message::SenderKeyMessage;
use signal_protocol::storage::InMemorySenderKeyStore;

fn group_pair() -> (
    GroupCipher<InMemorySenderKeyStore>,
    GroupCipher<InMemorySenderKeyStore>,
) {
    let ctx = Context::background();
    let name = SenderKeyName::new("bench-group", ProtocolAddress::new("alice", 1));

    let sender_store = InMemorySenderKeyStore::new();
    let receiver_store = InMemorySenderKeyStore::new();

    let distribution = GroupSessionBuilder::new(sender_store.clone())
        .create(&ctx, &mut OsRng, &name)
        .unwrap();
    GroupSessionBuilder::new(receiver_store.clone())
        .process(&ctx, &name, &distribution)
        .unwrap();

    (
        GroupCipher::new(sender_store, name.clone()),
        GroupCipher::new(receiver_store, name),
    )
}

fn bench_group_encryption(c: &mut Criterion) {
    let ctx = Context::background();
    let (mut sending, _receiving) = group_pair();
    let message = vec![0u8; 1024];

    c.bench_function("group_encrypt_1kb", |b| {
        b.iter(|| black_box(sending.encrypt(&ctx, &message).unwrap()));
    });
}

fn bench_group_roundtrip(c: &mut Criterion) {
    let ctx = Context::background();
    let (mut sending, mut receiving) = group_pair();
    let message = vec![0u8; 1024];

    c.bench_function("group_encrypt_decrypt_1kb", |b| {
        b.iter(|| {
            let encrypted = sending.encrypt(&ctx, &message).unwrap();
            let received = SenderKeyMessage::from_bytes(&encrypted.to_bytes()).unwrap();
            black_box(receiving.decrypt(&ctx, &received).unwrap())
        });
    });
}

criterion_group!(benches, bench_group_encryption, bench_group_roundtrip);
criterion_main!(benches);
