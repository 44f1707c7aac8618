//! Benchmarks for blocking and resolution.
//!
//! Runs against a synthetic table of 20,000 company records spread over
//! a handful of jurisdictions.

// Criterion macros generate items without docs - this is expected for benchmarks
// Benchmarks use expect/unwrap for simplicity - panics are acceptable in benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;

use entityidentity::config::EngineConfig;
use entityidentity::models::{EntityProfile, RawRecord, RawSource, ResolveHints};
use entityidentity::services::{ConsolidationConfig, Resolver, consolidate};
use entityidentity::storage::LoadedTable;

const STEMS: &[&str] = &[
    "acme", "globex", "initech", "umbrella", "hooli", "soylent", "stark", "wayne", "tyrell",
    "cyberdyne", "wonka", "gringotts", "oscorp", "vandelay", "massive", "dynamic",
];
const WORDS: &[&str] = &[
    "mining", "metals", "energy", "capital", "resources", "trading", "holdings", "industries",
];
const SUFFIXES: &[&str] = &["Inc", "Ltd", "plc", "S.A.", "GmbH", "Corp"];
const JURISDICTIONS: &[&str] = &["US", "GB", "AU", "CA", "DE", "BR"];

/// Builds a synthetic table with `n` distinct entities.
fn synthetic_resolver(n: usize) -> Resolver {
    let records = (0..n)
        .map(|i| {
            let stem = STEMS[i % STEMS.len()];
            let word = WORDS[(i / STEMS.len()) % WORDS.len()];
            let suffix = SUFFIXES[i % SUFFIXES.len()];
            RawRecord::new(format!("{stem} {word} {i} {suffix}"))
                .with_context("jurisdiction", JURISDICTIONS[i % JURISDICTIONS.len()])
        })
        .collect();
    let profile = EntityProfile::company();
    let built = consolidate(
        &[RawSource::new("synthetic", 1, records)],
        &ConsolidationConfig::new(profile.clone()),
    )
    .expect("synthetic table builds");
    let config = EngineConfig::default();
    let loaded = Arc::new(LoadedTable::new(built.table, &profile, config.blocking));
    Resolver::new(loaded, &profile, &config)
}

fn bench_blocking(c: &mut Criterion) {
    let resolver = synthetic_resolver(20_000);
    let index = &resolver.loaded().index;
    let hints = ResolveHints::default();
    let au = ResolveHints::new().with_jurisdiction("AU");

    let mut group = c.benchmark_group("blocking");
    group.bench_function("prefix", |b| {
        b.iter(|| index.candidates(black_box("wonka energy 1234"), &hints));
    });
    group.bench_function("prefix_with_hint", |b| {
        b.iter(|| index.candidates(black_box("wonka energy 1234"), &au));
    });
    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    for size in [1_000, 20_000] {
        let resolver = synthetic_resolver(size);
        let hints = ResolveHints::default();
        group.bench_with_input(BenchmarkId::new("exact", size), &resolver, |b, r| {
            b.iter(|| r.resolve(black_box("Acme Mining 0 Inc"), &hints, None));
        });
        group.bench_with_input(BenchmarkId::new("typo", size), &resolver, |b, r| {
            b.iter(|| r.resolve(black_box("Acem Minng 16"), &hints, None));
        });
    }
    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let resolver = synthetic_resolver(20_000);
    let queries: Vec<String> = (0..256).map(|i| format!("globex metals {i}")).collect();
    let hints = ResolveHints::default();

    c.bench_function("resolve_batch_256", |b| {
        b.iter(|| resolver.resolve_batch(black_box(&queries), &hints, None));
    });
}

criterion_group!(benches, bench_blocking, bench_resolve, bench_batch);
criterion_main!(benches);
