//! Benchmarks for the sequence graph and its document form.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use heyoflow::sequence::codec;
use heyoflow::{SequenceDocument, SequenceGraph, StepContent, StepKind};

/// LeadSource followed by `len - 1` alternating emails and waits.
fn build_graph(len: usize) -> SequenceGraph {
    let mut graph = SequenceGraph::new();
    graph
        .add_step(StepKind::LeadSource, StepContent::lead_source("lead@example.com"))
        .unwrap();
    for i in 1..len {
        if i % 2 == 1 {
            graph
                .add_step(
                    StepKind::ColdEmail,
                    StepContent::cold_email(format!("Touch {}", i), "Checking in"),
                )
                .unwrap();
        } else {
            graph
                .add_step(StepKind::WaitDelay, StepContent::wait_delay(60 * i as u32))
                .unwrap();
        }
    }
    graph
}

fn bench_add_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_step");

    for len in [1, 100, 500].iter() {
        let graph = build_graph(*len);
        group.bench_with_input(BenchmarkId::new("steps", len), len, |b, _| {
            b.iter_batched(
                || graph.clone(),
                |mut g| {
                    black_box(
                        g.add_step(StepKind::WaitDelay, StepContent::wait_delay(15))
                            .unwrap(),
                    )
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_delete_interior(c: &mut Criterion) {
    let mut group = c.benchmark_group("delete_interior");

    for len in [10, 100, 500].iter() {
        let graph = build_graph(*len);
        let middle = graph.chain_ids()[len / 2].clone();

        group.bench_with_input(BenchmarkId::new("steps", len), len, |b, _| {
            b.iter_batched(
                || graph.clone(),
                |mut g| black_box(g.delete_step(&middle).unwrap()),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain");

    for len in [10, 100, 500].iter() {
        let graph = build_graph(*len);
        group.bench_with_input(BenchmarkId::new("steps", len), len, |b, _| {
            b.iter(|| black_box(graph.chain()))
        });
    }
    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let content = StepContent::cold_email("Quick question", "Do you have five minutes this week?");
    let text = codec::encode(&content);

    c.bench_function("encode_cold_email", |b| {
        b.iter(|| black_box(codec::encode(&content)))
    });
    c.bench_function("decode_cold_email", |b| {
        b.iter(|| black_box(codec::decode(StepKind::ColdEmail, &text).unwrap()))
    });
}

fn bench_document(c: &mut Criterion) {
    let mut group = c.benchmark_group("document");

    for len in [1, 10, 50].iter() {
        let graph = build_graph(*len);
        let bytes = SequenceDocument::from_graph(&graph).unwrap().save();

        group.bench_with_input(BenchmarkId::new("save", len), len, |b, _| {
            b.iter(|| black_box(SequenceDocument::from_graph(&graph).unwrap().save()))
        });
        group.bench_with_input(BenchmarkId::new("load", len), len, |b, _| {
            b.iter(|| {
                let mut doc = SequenceDocument::from_bytes(&bytes).unwrap();
                black_box(doc.to_graph().unwrap())
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_add_step,
    bench_delete_interior,
    bench_chain,
    bench_codec,
    bench_document,
);
criterion_main!(benches);
