//! # MAL Runtime Benchmarks
//!
//! | Area        | Measured                                   |
//! |-------------|--------------------------------------------|
//! | Broker      | Publish check + notify fan-out per batch   |
//! | Registry    | Transaction create and cancel              |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mal_broker::{BrokerEngine, BrokerHandler};
use mal_interaction::{InteractionPattern, TransactionRegistry};
use mal_types::{
    Element, EntityKey, EntityRequest, MessageHeader, Subscription, UpdateHeader, UpdateType, Uri,
};
use rand::Rng;
use std::time::Duration;

fn header(from: &str) -> MessageHeader {
    MessageHeader {
        uri_from: Uri::new(from),
        service_area: 1,
        service: 1,
        operation: 1,
        area_version: 1,
        ..MessageHeader::default()
    }
}

// ============================================================================
// BROKER FAN-OUT
// ============================================================================

fn bench_broker_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("broker-fan-out");
    group.measurement_time(Duration::from_secs(5));

    let names = ["temp", "pressure", "voltage", "current"];
    let publisher = header("malmem://publisher");
    let mut rng = rand::thread_rng();

    for consumers in [10usize, 100, 1000] {
        let engine = BrokerEngine::new();
        engine
            .add_provider(&publisher, &[EntityKey::wildcard()])
            .unwrap();
        for i in 0..consumers {
            let name = names[rng.gen_range(0..names.len())];
            let subscription = Subscription::new(
                "sub",
                vec![EntityRequest::new(i % 2 == 0, vec![EntityKey::new(name, 0, 0, 0)])],
            );
            engine
                .add_consumer(&header(&format!("malmem://consumer-{}", i)), &subscription)
                .unwrap();
        }

        let updates: Vec<UpdateHeader> = (0..16)
            .map(|i| {
                let update_type = if i % 3 == 0 { UpdateType::Update } else { UpdateType::Modification };
                UpdateHeader::new(
                    publisher.uri_from.clone(),
                    update_type,
                    EntityKey::new(names[i % names.len()], i as i64 + 1, 1, 1),
                )
            })
            .collect();
        let values = vec![(0..16).map(Element::Long).collect::<Vec<_>>()];

        group.throughput(Throughput::Elements(consumers as u64));
        group.bench_with_input(BenchmarkId::new("publish", consumers), &consumers, |b, _| {
            b.iter(|| {
                engine.check_publish(&publisher, &updates).unwrap();
                black_box(engine.create_notify(&publisher, &updates, &values).unwrap())
            })
        });
    }

    group.finish();
}

// ============================================================================
// TRANSACTION REGISTRY
// ============================================================================

fn bench_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("transaction-registry");
    let registry = TransactionRegistry::new(None);

    group.bench_function("create_cancel", |b| {
        b.iter(|| {
            let id = registry.create_transaction(InteractionPattern::Request, true, None);
            black_box(registry.cancel(id))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_broker_fan_out, bench_registry);
criterion_main!(benches);
