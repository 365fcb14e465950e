//! Performance benchmarks for trace construction
//!
//! Run with: cargo bench
//!
//! These benchmarks measure:
//! - Builder setup cost
//! - Straight-line arithmetic with and without CSE
//! - Local and stack traffic around calls
//! - Block formation and numbering

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hhir::builder::{FuncInfo, TraceBuilder};
use hhir::ir::{number_instructions, FuncId, LocalId, Type};
use hhir::JitConfig;

fn config(cse: bool) -> JitConfig {
    JitConfig {
        enable_cse: cse,
        check_operand_types: false,
        ..JitConfig::default()
    }
}

fn new_builder(config: JitConfig) -> TraceBuilder {
    let func = FuncInfo::new(FuncId(1)).with_locals(["x", "y", "acc"]);
    TraceBuilder::new(func, 0, 2, config)
}

/// Sums the two top stack cells `n` times, recomputing the same sum each
/// round so CSE has something to find.
fn arithmetic_trace(config: JitConfig, n: usize) -> TraceBuilder {
    let mut tb = new_builder(config);
    let x = tb.gen_ld_stack(0, Type::INT);
    let y = tb.gen_ld_stack(1, Type::INT);
    let mut acc = tb.gen_def_const(0i64);
    for _ in 0..n {
        let sum = tb.gen_add(x, y);
        let prod = tb.gen_mul(sum, y);
        acc = tb.gen_add(acc, prod);
    }
    tb.gen_trace_end(64);
    tb
}

fn bench_builder_setup(c: &mut Criterion) {
    c.bench_function("builder_setup", |b| b.iter(|| black_box(new_builder(config(true)))));
}

fn bench_arithmetic(c: &mut Criterion) {
    let mut group = c.benchmark_group("arithmetic");
    for n in [16usize, 256] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("cse", n), &n, |b, &n| {
            b.iter(|| black_box(arithmetic_trace(config(true), n)))
        });
        group.bench_with_input(BenchmarkId::new("no_cse", n), &n, |b, &n| {
            b.iter(|| black_box(arithmetic_trace(config(false), n)))
        });
    }
    group.finish();
}

fn bench_locals_and_calls(c: &mut Criterion) {
    c.bench_function("locals_and_calls", |b| {
        b.iter(|| {
            let mut tb = new_builder(config(true));
            tb.gen_assert_loc(LocalId(0), Type::INT);
            tb.gen_assert_loc(LocalId(2), Type::INT);
            for _ in 0..32 {
                let x = tb.gen_ld_loc(LocalId(0));
                let acc = tb.gen_ld_loc(LocalId(2));
                let sum = tb.gen_add(acc, x);
                tb.gen_st_loc(LocalId(2), sum, false, true, None);

                let func = tb.gen_def_const(FuncId(2));
                let null = tb.gen_def_init_null();
                let ar = tb.gen_def_act_rec(func, null, 0, None);
                let sp = tb.gen_spill_stack(0, &[ar, func, null, null, null]);
                tb.gen_call(sp, 8, func, &[]);
                tb.gen_spill_stack(1, &[]);
            }
            tb.gen_trace_end(128);
            black_box(tb)
        })
    });
}

fn bench_numbering(c: &mut Criterion) {
    c.bench_function("number_instructions", |b| {
        b.iter(|| {
            let mut tb = arithmetic_trace(config(false), 128);
            let exit = tb.gen_exit_guard_failure(0);
            tb.gen_guard_stk(0, Type::INT, exit);
            let (mut trace, mut factory) = tb.into_parts();
            black_box(number_instructions(&mut trace, &mut factory))
        })
    });
}

criterion_group!(
    benches,
    bench_builder_setup,
    bench_arithmetic,
    bench_locals_and_calls,
    bench_numbering,
);

criterion_main!(benches);
