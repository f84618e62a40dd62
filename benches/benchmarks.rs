//! Benchmark suite for seekloop hot paths.
//!
//! This module provides performance benchmarks for:
//! - Output classification (pattern matching over command output)
//! - Attempt summarization (prompt context assembly)
//! - Code extraction from oracle replies
//!
//! # Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench
//!
//! # Save baseline for comparison
//! cargo bench -- --save-baseline main
//!
//! # Compare against baseline
//! cargo bench -- --baseline main
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use seekloop::attempt::{error_fingerprint, summarize, Attempt, SUMMARY_WINDOW};
use seekloop::classify::OutcomeClassifier;
use seekloop::config::SeekConfig;
use seekloop::oracle::extract_code;

// ============================================================================
// Classification Benchmarks
// ============================================================================

/// Build test-runner style output with `lines` passing lines and one failure at the end.
fn runner_output(lines: usize) -> String {
    let mut out = String::new();
    for i in 0..lines {
        out.push_str(&format!("test module::case_{i} ... ok\n"));
    }
    out.push_str("test module::last ... FAILED\n");
    out
}

/// Benchmark classification over outputs of various sizes.
///
/// The exit code is 0 so every error pattern is evaluated.
fn bench_classification(c: &mut Criterion) {
    let mut group = c.benchmark_group("classification");
    let classifier = OutcomeClassifier::from_config(&SeekConfig::default());
    let explicit = OutcomeClassifier::new(
        &["test result: ok", "All tests passed"],
        &["error", "failed", "exception", "panicked"],
        true,
    );

    for size in [10, 1_000, 10_000] {
        let output = runner_output(size);
        group.throughput(Throughput::Bytes(output.len() as u64));

        group.bench_with_input(BenchmarkId::new("default_rules", size), &output, |b, out| {
            b.iter(|| black_box(classifier.verdict(black_box(out), Some(0))));
        });

        group.bench_with_input(
            BenchmarkId::new("explicit_success", size),
            &output,
            |b, out| {
                b.iter(|| black_box(explicit.classify(black_box(out), Some(0))));
            },
        );
    }

    group.finish();
}

// ============================================================================
// Summarization Benchmarks
// ============================================================================

fn attempts(count: u32) -> Vec<Attempt> {
    (1..=count)
        .map(|i| {
            Attempt::new(
                i,
                format!("candidate {i}"),
                format!("running\n{}\nerror[E0308]: mismatched types at line {i}", runner_output(20)),
                Some(1),
                i % 7 == 0,
            )
        })
        .collect()
}

/// Benchmark summary construction as the attempt log grows.
fn bench_summarization(c: &mut Criterion) {
    let mut group = c.benchmark_group("summarization");

    for count in [3, 50, 500] {
        let log = attempts(count);
        group.throughput(Throughput::Elements(u64::from(count)));
        group.bench_with_input(BenchmarkId::new("summarize", count), &log, |b, log| {
            b.iter(|| black_box(summarize(black_box(log), SUMMARY_WINDOW).render()));
        });
    }

    let output = runner_output(1_000);
    group.bench_function("error_fingerprint", |b| {
        b.iter(|| black_box(error_fingerprint(black_box(&output))));
    });

    group.finish();
}

// ============================================================================
// Extraction Benchmarks
// ============================================================================

/// Benchmark pulling a fenced block out of a long reply.
fn bench_code_extraction(c: &mut Criterion) {
    let body: String = (0..500).map(|i| format!("    let v{i} = {i};\n")).collect();
    let reply = format!("Here is the fix:\n\n```rust\nfn main() {{\n{body}}}\n```\n\nDone.");

    c.bench_function("extract_code", |b| {
        b.iter(|| black_box(extract_code(black_box(&reply))));
    });
}

criterion_group!(classify_benches, bench_classification);

criterion_group!(attempt_benches, bench_summarization, bench_code_extraction);

criterion_main!(classify_benches, attempt_benches);
