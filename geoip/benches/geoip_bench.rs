use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tally_geoip::country::Family;
use tally_geoip::{GeoTable, ProviderTable};

fn build_geo_table() -> GeoTable {
    let mut table = GeoTable::empty();
    let mut body = String::from(
        "start,end,country,country_name,continent,continent_name,asn,as_name,as_domain\n",
    );
    for i in 0..256u32 {
        body.push_str(&format!(
            "10.{i}.0.0,10.{i}.255.255,US,United States,NA,North America,AS{i},Example {i},example.com\n"
        ));
    }
    table
        .add_partition(Family::V4, "10.0.0.0", "10.255.255.255", &body)
        .expect("valid partition");
    table.finish();
    table
}

fn build_provider_table() -> ProviderTable {
    let ranges: Vec<(String, String, String)> = (0..256u32)
        .map(|i| (format!("13.{i}.0.0/16"), "aws".to_string(), "ec2".to_string()))
        .collect();
    ProviderTable::from_ranges(ranges).expect("valid ranges")
}

fn bench_lookup(c: &mut Criterion) {
    let table = build_geo_table();
    c.bench_function("geo_lookup_hit", |b| {
        b.iter(|| table.lookup(black_box("10.128.55.1")))
    });
    c.bench_function("geo_lookup_miss", |b| {
        b.iter(|| table.lookup(black_box("192.168.1.1")))
    });
}

fn bench_classify(c: &mut Criterion) {
    let table = build_provider_table();
    c.bench_function("provider_classify_cold", |b| {
        b.iter(|| {
            table.clear_cache();
            table.classify(black_box("13.200.1.2"))
        })
    });
    c.bench_function("provider_classify_memoized", |b| {
        b.iter(|| table.classify(black_box("13.200.1.2")))
    });
}

criterion_group!(benches, bench_lookup, bench_classify);
criterion_main!(benches);
