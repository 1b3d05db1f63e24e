use criterion::{criterion_group, criterion_main, Criterion};
use irbridge_tests::*;
use std::hint::black_box;

fn fib_20_translated_bench(c: &mut Criterion) {
    let mut ctx = control::new_context();
    c.bench_function("fib 20 translated from llvm ir", |b| {
        b.iter(|| control::fib(&mut ctx, black_box(20)))
    });
}

fn fib_20_orig_bench(c: &mut Criterion) {
    c.bench_function("fib 20 plain rust", |b| b.iter(|| fibo_orig(black_box(20))));
}

// ─── Exception emulation overhead ────────────────────────────────────────────

fn checked_div_ok_bench(c: &mut Criterion) {
    let mut ctx = exceptions::new_context();
    c.bench_function("checked_div through three calls", |b| {
        b.iter(|| exceptions::outer(&mut ctx, black_box(1000), black_box(7)))
    });
}

fn checked_div_caught_bench(c: &mut Criterion) {
    let mut ctx = exceptions::new_context();
    c.bench_function("checked_div caught by invoke", |b| {
        b.iter(|| exceptions::div_or_default(&mut ctx, black_box(1000), black_box(0), black_box(-1)))
    });
}

fn checked_div_orig_bench(c: &mut Criterion) {
    c.bench_function("checked_div plain rust", |b| {
        b.iter(|| safe_div_orig(black_box(1000), black_box(7)))
    });
}

// ─── Memory ──────────────────────────────────────────────────────────────────

fn table_sum_bench(c: &mut Criterion) {
    let mut ctx = memory::new_context();
    c.bench_function("table sum over bounds-checked memory", |b| {
        b.iter(|| memory::table_sum(black_box(&mut ctx)))
    });
}

criterion_group!(
    benches,
    fib_20_translated_bench,
    fib_20_orig_bench,
    checked_div_ok_bench,
    checked_div_caught_bench,
    checked_div_orig_bench,
    table_sum_bench
);
criterion_main!(benches);
