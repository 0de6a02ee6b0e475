//! Performance benchmarks for the statement ledger.
//!
//! Run with: cargo bench

use std::sync::Arc;

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use statement_ledger::crypto::{block_fingerprint, statement_fingerprint};
use statement_ledger::domain::{Judgment, LedgerEntry, NewStatement};
use statement_ledger::infra::{InMemoryLedgerStore, RetryConfig};
use statement_ledger::ledger::ChainLinker;
use statement_ledger::metrics::MetricsRegistry;

fn sample_statement(i: usize) -> NewStatement {
    NewStatement::new(
        format!("Statement {i}: the city council approved the new transit budget"),
        "Council Member",
    )
    .with_source_url("https://news.example/council")
}

/// Benchmark fingerprint computation
fn bench_fingerprints(c: &mut Criterion) {
    let statement = "Unemployment fell to 3.5 percent last quarter";
    let statement_fp = statement_fingerprint(statement, "Bob", None);
    let previous = statement_fingerprint("previous", "Alice", None);

    c.bench_function("statement_fingerprint", |b| {
        b.iter(|| {
            black_box(statement_fingerprint(
                black_box(statement),
                "Bob",
                Some("https://news.example/jobs"),
            ));
        });
    });

    c.bench_function("block_fingerprint", |b| {
        b.iter(|| {
            black_box(block_fingerprint(&statement_fp, &previous, 1_700_000_000_000));
        });
    });
}

/// Benchmark sealing and replaying an entry
fn bench_seal(c: &mut Criterion) {
    let candidate = sample_statement(0);
    let tail = LedgerEntry::seal(&sample_statement(1), None, Utc::now());

    c.bench_function("entry_seal", |b| {
        b.iter(|| {
            black_box(LedgerEntry::seal(&candidate, Some(&tail), Utc::now()));
        });
    });

    c.bench_function("entry_verify_fingerprints", |b| {
        b.iter(|| {
            black_box(tail.verify_fingerprints());
        });
    });
}

/// Benchmark appending onto the in-memory chain
fn bench_append(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("chain_append");

    for count in [1, 10, 100].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("in_memory", count), count, |b, &count| {
            b.to_async(&runtime).iter(|| async move {
                let linker = ChainLinker::new(
                    Arc::new(InMemoryLedgerStore::new()),
                    Arc::new(MetricsRegistry::new()),
                )
                .with_retry(RetryConfig::immediate(3));
                for i in 0..count {
                    black_box(linker.append(sample_statement(i)).await.unwrap());
                }
            });
        });
    }

    group.finish();
}

/// Benchmark chain replay
fn bench_verify_chain(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let linker = runtime.block_on(async {
        let linker = ChainLinker::new(
            Arc::new(InMemoryLedgerStore::new()),
            Arc::new(MetricsRegistry::new()),
        );
        for i in 0..500 {
            linker.append(sample_statement(i)).await.unwrap();
        }
        linker
    });

    c.bench_function("verify_chain_500", |b| {
        b.to_async(&runtime)
            .iter(|| async { black_box(linker.verify_chain().await.unwrap()) });
    });
}

/// Benchmark parsing oracle judgments
fn bench_judgment_parse(c: &mut Criterion) {
    let fenced = "```json\n{\"status\":\"VERIFIED\",\"confidence\":\"HIGH\",\"keyFacts\":[\"a\",\"b\"],\"issues\":[],\"context\":\"c\",\"recommendation\":\"r\",\"reasoning\":\"why\"}\n```";

    c.bench_function("judgment_parse_fenced", |b| {
        b.iter(|| black_box(Judgment::parse(black_box(fenced))));
    });

    c.bench_function("judgment_parse_degraded", |b| {
        b.iter(|| black_box(Judgment::parse("The statement looks accurate to me.")));
    });
}

criterion_group!(
    benches,
    bench_fingerprints,
    bench_seal,
    bench_append,
    bench_verify_chain,
    bench_judgment_parse
);
criterion_main!(benches);
