use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use mboxrank::engine::accumulator::SpillLimits;
use mboxrank::engine::{CancelToken, Engine, EngineOptions};
use mboxrank::parser::scanner::MessageScanner;
use mboxrank::store::{MemoryStore, SqliteStore};

fn synthetic_mbox(messages: usize) -> Vec<u8> {
    let mut out = String::new();
    for i in 0..messages {
        out.push_str(&format!("From sender{i} Mon Jan  1 00:00:00 2024\n"));
        out.push_str(&format!(
            "From: Sender {i} <user{}@host{}.example{}.com>\n",
            i % 50,
            i % 40,
            i % 300
        ));
        out.push_str(&format!("Date: {} Mar 2022 08:{:02}:00 +0000\n", 1 + i % 28, i % 60));
        out.push_str("Subject: benchmark\n\nSome body text.\nAnother line.\n\n");
    }
    out.into_bytes()
}

fn bench_scanner(c: &mut Criterion) {
    let data = String::from_utf8(synthetic_mbox(5_000)).unwrap_or_default();
    let mut group = c.benchmark_group("scanner");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("scan_lines", |b| {
        b.iter(|| {
            let mut scanner = MessageScanner::new();
            let mut count = 0u64;
            for line in data.split_inclusive('\n') {
                if scanner.feed_line(line).is_some() {
                    count += 1;
                }
            }
            count + u64::from(scanner.finish().is_some())
        })
    });
    group.finish();
}

fn bench_engine(c: &mut Criterion) {
    let data = synthetic_mbox(20_000);
    let mut group = c.benchmark_group("engine");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.sample_size(20);

    group.bench_function("in_memory", |b| {
        b.iter(|| {
            let mut engine = Engine::new(MemoryStore::new(), EngineOptions::default());
            let mut source = data.clone();
            engine.run(&mut source, None, &CancelToken::new()).unwrap().groups.len()
        })
    });

    let spilling = EngineOptions {
        batch_size: 256 * 1024,
        limits: SpillLimits {
            max_domains: 1_000,
            max_senders: 2_000,
        },
        ..EngineOptions::default()
    };
    group.bench_function("spilling_sqlite", |b| {
        b.iter(|| {
            let store = SqliteStore::open_in_memory().unwrap();
            let mut engine = Engine::new(store, spilling.clone());
            let mut source = data.clone();
            engine.run(&mut source, None, &CancelToken::new()).unwrap().groups.len()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_scanner, bench_engine);
criterion_main!(benches);
