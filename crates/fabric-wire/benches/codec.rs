use criterion::{Criterion, criterion_group, criterion_main};
use fabric_core::{member::Member, message::Message, node::Node, token::Token};
use fabric_wire::codec;
use std::hint::black_box;

fn bench_encode_decode(c: &mut Criterion) {
    let mut message = Message::new("directory", "/lookup/alice");
    for i in 0..3u32 {
        message.destination.add(Member::new(Token(i), Node::new("10.0.0.1", 4000, 4001)));
    }
    message.data.insert("name".into(), fabric_core::data::Value::from("alice"));

    c.bench_function("encode", |b| b.iter(|| black_box(codec::encode(black_box(&message)))));

    let encoded = codec::encode(&message);
    c.bench_function("decode", |b| b.iter(|| black_box(codec::decode(black_box(&encoded)).unwrap())));
}

criterion_group!(benches, bench_encode_decode);
criterion_main!(benches);
