use std::{hint::black_box, sync::Arc};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use hagrid::{
    topic::{Topic, TopicPattern, TopicRegistry},
    StringSerdes, TopicProperties,
};

fn registry_with(count: usize) -> TopicRegistry {
    let registry = TopicRegistry::new();
    for i in 0..count {
        for pattern in [
            format!("svc{i}"),
            format!("svc{i}-*"),
            format!("svc{i}-events"),
            format!("svc{i}-events-*"),
        ] {
            let topic = Topic::new(&pattern, Arc::new(StringSerdes), TopicProperties::default())
                .unwrap();
            registry.insert(topic);
        }
    }
    registry
}

fn bench_pattern_parse(c: &mut Criterion) {
    c.bench_function("pattern_parse", |b| {
        b.iter(|| TopicPattern::parse(black_box("orders-eu-west-*")).unwrap())
    });
}

fn bench_pattern_matches(c: &mut Criterion) {
    let pattern = TopicPattern::parse("orders-eu-*").unwrap();
    c.bench_function("pattern_matches", |b| {
        b.iter(|| pattern.matches(black_box("orders-eu-west-1")))
    });
}

fn bench_registry_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_find");
    for count in [1usize, 10, 100] {
        let registry = registry_with(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &registry, |b, registry| {
            b.iter(|| registry.find(black_box("svc0-events-login-failed")))
        });
    }
    group.finish();
}

fn bench_registry_miss(c: &mut Criterion) {
    let registry = registry_with(100);
    c.bench_function("registry_find_miss", |b| {
        b.iter(|| registry.find(black_box("unknown-topic")))
    });
}

criterion_group!(
    benches,
    bench_pattern_parse,
    bench_pattern_matches,
    bench_registry_find,
    bench_registry_miss
);
criterion_main!(benches);
