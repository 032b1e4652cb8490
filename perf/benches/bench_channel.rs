use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use strand_perf::{bench_channel_name, make_payload};
use strand_ring::Channel;

const SEGMENT_SIZE: u32 = 1 << 22;

fn open_pair(label: &str) -> (Channel, Channel, String) {
    let name = bench_channel_name(label);
    let mut publisher = Channel::open(&name, SEGMENT_SIZE, None).expect("failed to open channel");
    publisher.init_publisher().expect("init_publisher");
    let mut subscriber = Channel::open(&name, SEGMENT_SIZE, None).expect("failed to open channel");
    subscriber.init_subscriber(false).expect("init_subscriber");
    (publisher, subscriber, name)
}

fn bench_send(c: &mut Criterion) {
    let (mut publisher, _subscriber, name) = open_pair("send");
    let payload = make_payload(64);

    let mut group = c.benchmark_group("channel");
    group.throughput(Throughput::Elements(1));

    group.bench_function("send", |b| {
        b.iter(|| publisher.send(black_box(&payload)).unwrap());
    });

    drop(group);
    let _ = Channel::unlink(&name, None);
}

fn bench_recv_data(c: &mut Criterion) {
    let (mut publisher, mut subscriber, name) = open_pair("recv");
    let payload = make_payload(64);

    let mut group = c.benchmark_group("channel");
    group.throughput(Throughput::Elements(1));

    group.bench_function("recv (data)", |b| {
        b.iter_custom(|iters| {
            // Pre-fill; the ring is large enough that the reader is never
            // lapped within one batch.
            for _ in 0..iters {
                publisher.send(&payload).unwrap();
            }
            let start = std::time::Instant::now();
            for _ in 0..iters {
                black_box(subscriber.recv(0).unwrap());
            }
            start.elapsed()
        });
    });

    drop(group);
    let _ = Channel::unlink(&name, None);
}

fn bench_recv_empty(c: &mut Criterion) {
    let (_publisher, mut subscriber, name) = open_pair("empty");

    let mut group = c.benchmark_group("channel");
    group.throughput(Throughput::Elements(1));

    group.bench_function("recv (empty)", |b| {
        b.iter(|| black_box(subscriber.recv(0).unwrap()));
    });

    drop(group);
    let _ = Channel::unlink(&name, None);
}

fn bench_round_trip(c: &mut Criterion) {
    let (mut publisher, mut subscriber, name) = open_pair("rt");
    let payload = make_payload(64);

    let mut group = c.benchmark_group("channel");
    group.throughput(Throughput::Elements(1));

    group.bench_function("round_trip", |b| {
        b.iter(|| {
            publisher.send(black_box(&payload)).unwrap();
            black_box(subscriber.recv(0).unwrap());
        });
    });

    drop(group);
    let _ = Channel::unlink(&name, None);
}

fn bench_payload_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_payload");

    for &len in &[64usize, 1024, 16 * 1024, 256 * 1024] {
        let (mut publisher, mut subscriber, name) = open_pair(&format!("size_{len}"));
        let payload = make_payload(len);

        group.throughput(Throughput::Bytes(len as u64));
        group.bench_function(format!("round_trip_{len}B"), |b| {
            b.iter(|| {
                publisher.send(black_box(&payload)).unwrap();
                black_box(subscriber.recv(0).unwrap());
            });
        });

        drop(publisher);
        drop(subscriber);
        let _ = Channel::unlink(&name, None);
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_send,
    bench_recv_data,
    bench_recv_empty,
    bench_round_trip,
    bench_payload_sizes,
);
criterion_main!(benches);
