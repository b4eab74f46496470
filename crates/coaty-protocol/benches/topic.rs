//! Topic codec and matcher benchmarks for coaty-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use coaty_protocol::{matcher, EventType, Topic};
use uuid::Uuid;

fn bench_parse(c: &mut Criterion) {
    let source = Uuid::new_v4();
    let topic = Topic::publish_topic(
        "com.example.bench",
        source,
        EventType::Call,
        Some("lights.switch"),
        Some(&Uuid::new_v4().to_string()),
    )
    .unwrap();

    c.bench_function("parse_call_topic", |b| {
        b.iter(|| Topic::parse(black_box(&topic)))
    });
}

fn bench_build(c: &mut Criterion) {
    let source = Uuid::new_v4();

    c.bench_function("build_advertise_topic", |b| {
        b.iter(|| {
            Topic::publish_topic(
                black_box("com.example.bench"),
                source,
                EventType::Advertise,
                Some("CoatyObject"),
                None,
            )
        })
    });
}

fn bench_match(c: &mut Criterion) {
    let topic = "coaty/1/com.example.bench/ADV:CoatyObject/c0fbb160-50e5-4f3a-9213-f306b2fb26e0";
    let filter = "coaty/1/+/ADV:CoatyObject/+";

    c.bench_function("match_advertise_filter", |b| {
        b.iter(|| matcher::matches(black_box(topic), black_box(filter)))
    });
}

criterion_group!(benches, bench_parse, bench_build, bench_match);
criterion_main!(benches);
