use std::hint::black_box;

use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use hagrid::{
    listener::ListenerRegistry,
    packet::{WirePacket, WirePayload},
    Direction, Listener, Packet, Payload,
};

fn registry_with(listeners: usize) -> ListenerRegistry {
    let registry = ListenerRegistry::new();
    for i in 0..listeners {
        let pattern = if i % 2 == 0 { "events-*" } else { "events-login" };
        registry
            .register(
                Listener::builder(pattern)
                    .priority((i % 8) as i32)
                    .handle::<String, _>(|payload, _, _| {
                        black_box(payload);
                        Ok(())
                    }),
            )
            .unwrap();
    }
    registry
}

fn bench_execute_listeners(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute_listeners");
    let packet = Packet::new("events-login").with_payload(Payload::new("user-1".to_string()));
    for count in [1usize, 10, 100] {
        let registry = registry_with(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &registry, |b, registry| {
            b.iter(|| {
                registry.execute_listeners(
                    black_box("events-login"),
                    Direction::Downstream,
                    &packet,
                )
            })
        });
    }
    group.finish();
}

fn bench_correlated_round(c: &mut Criterion) {
    let registry = ListenerRegistry::new();
    c.bench_function("correlated_register_and_fire", |b| {
        b.iter(|| {
            let request = Packet::new("rpc");
            let _reply = registry
                .await_correlated("rpc", request.id(), None)
                .unwrap();
            registry.execute_listeners("rpc", Direction::Downstream, &Packet::reply_to(&request))
        })
    });
}

fn bench_wire_codec(c: &mut Criterion) {
    let packet = Packet::new("events-login");
    let wire = WirePacket::from_packet(
        &packet,
        WirePayload::new("string", Bytes::from_static(b"user-1")),
    );
    let encoded = wire.encode().unwrap();

    c.bench_function("wire_encode", |b| b.iter(|| black_box(&wire).encode().unwrap()));
    c.bench_function("wire_decode", |b| {
        b.iter(|| WirePacket::decode(black_box(&encoded)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_execute_listeners,
    bench_correlated_round,
    bench_wire_codec
);
criterion_main!(benches);
