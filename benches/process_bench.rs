use adbsync::process::{parse_batch, parse_strict};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const INIT: &str = "1 (init) S 0 0 0 0 -1 1077936384 1467 168323 0 38 12 141 863 249 20 0 1 0 4 2535424 245 4294967295 1 1 0 0 0 0 0 0 65536 4294967295 0 0 17 3 0 0 0 0 0 0 0 0 0 0 0 0 0";

const NESTED: &str = "1869 (irq/306-(null)) S 2 0 0 0 -1 2129984 0 0 0 0 0 0 0 0 -51 0 1 0 116 0 0 18446744073709551615 0 0 0 0 0 0 0 2147483647 0 0 0 0 17 0 50 1 0 0 0 0 0 0 0 0 0 0 0";

fn with_preamble() -> String {
    format!(
        "/vendor/bin/hw/wpa_supplicant\0-O/data/vendor/wifi/wpa/sockets\0-g@android:wpa_wlan0\0{}",
        INIT
    )
}

fn bench_parse_single(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_single");
    let preamble = with_preamble();

    for (name, record) in [
        ("plain", INIT),
        ("nested_parens", NESTED),
        ("nul_preamble", preamble.as_str()),
    ] {
        group.throughput(Throughput::Bytes(record.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), record, |b, record| {
            b.iter(|| parse_strict(black_box(record)))
        });
    }

    group.finish();
}

fn bench_parse_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_batch");

    for count in [100, 1000, 5000].iter() {
        // Typical device: mostly kernel threads plus some apps
        let dump: String = (0..*count)
            .map(|i| {
                if i % 3 == 0 {
                    format!("{}\n", with_preamble())
                } else {
                    format!("{}\n", NESTED)
                }
            })
            .collect();

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &dump, |b, dump| {
            b.iter(|| parse_batch(black_box(dump.lines())))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse_single, bench_parse_batch);
criterion_main!(benches);
