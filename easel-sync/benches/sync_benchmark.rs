use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use easel_core::{Event, EventPayload, LayerDelta, Origin, Point, Shape};
use easel_sync::protocol::{decode, encode};
use easel_sync::{LogCompactor, RelayRoom};

fn sample_events(count: usize) -> Vec<Event> {
    let origin = Origin::from("bench");
    let mut events = Vec::with_capacity(count);
    for n in 0..count {
        let id = format!("rect-bench-{}", n / 4);
        let payload = match n % 4 {
            0 => EventPayload::added(Shape::rectangle(
                id,
                Point::new(n as f32, 0.0),
                Point::new(n as f32 + 5.0, 5.0),
            )),
            1 => EventPayload::selected(id, "#ff00ff"),
            2 => EventPayload::layer_changed(id, LayerDelta::ToFront),
            // Every other shape is deleted again.
            _ if (n / 4) % 2 == 0 => EventPayload::removed(id),
            _ => EventPayload::deselected(id),
        };
        events.push(Event::new(origin.clone(), n as u64, payload));
    }
    events
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("Protocol");
    let event = Event::new(
        Origin::from("bench"),
        1_718_000_000_000,
        EventPayload::added(Shape::triangle(
            "triangle-bench-0",
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(5.0, 8.0),
        )),
    );
    let frame = encode(&event).unwrap();

    group.bench_function("encode_event", |b| b.iter(|| black_box(encode(black_box(&event)))));
    group.bench_function("decode_event", |b| b.iter(|| black_box(decode(black_box(&frame)))));
    group.finish();
}

fn bench_compaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("Compaction");
    for size in [1_000usize, 10_000] {
        let events = sample_events(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("compact", size), &events, |b, events| {
            b.iter(|| black_box(LogCompactor::compact(black_box(events))))
        });
    }
    group.finish();
}

fn bench_relay(c: &mut Criterion) {
    let mut group = c.benchmark_group("Relay");
    let room = RelayRoom::in_memory();
    let sender = Origin::from("bench");
    let mut links: Vec<_> = (0..100)
        .map(|n| room.join(Origin::new(format!("peer-{n}"))).unwrap())
        .collect();
    let _own = room.join(sender.clone()).unwrap();
    let frame = encode(&Event::new(sender.clone(), 0, EventPayload::deselected("x"))).unwrap();

    group.throughput(Throughput::Elements(100));
    group.bench_function("submit_to_100_links", |b| {
        b.iter(|| {
            black_box(room.submit(&sender, frame.clone()).unwrap());
            for link in links.iter_mut() {
                black_box(link.poll());
            }
        })
    });
    group.finish();
}

criterion_group!(benches, bench_codec, bench_compaction, bench_relay);
criterion_main!(benches);
