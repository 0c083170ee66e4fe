#![allow(unused)]
extern crate unsafescope;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use strum::IntoEnumIterator;
use unsafescope::prelude::*;

/// Builds a module of `count` functions, each with a safe prologue and an unsafe
/// load/add/store sequence.
fn synthetic_module(count: usize) -> Module {
    let mut module = Module::new("bench");
    for index in 0..count {
        let mut func = Function::new(
            format!("f{index}"),
            FunctionType::new(Type::Void, vec![Type::Ptr, Type::I32]),
        );
        let entry = func.add_block("entry", Op::Ret { value: None });
        {
            let mut b = IrBuilder::at_end(&mut func, entry).unwrap();
            let line = u32::try_from(index).unwrap() * 4;
            b.set_debug_loc(Some(DebugLoc::new("src/lib.rs", line + 1, 1)));
            let a = b.binary(BinaryOp::Add, Value::Arg(1), Value::i32(1));
            b.set_unsafe(true);
            b.set_debug_loc(Some(DebugLoc::new("src/lib.rs", line + 2, 1)));
            let v = b.load(Type::I32, Value::Arg(0));
            b.set_debug_loc(Some(DebugLoc::new("src/lib.rs", line + 3, 1)));
            let sum = b.binary(BinaryOp::Add, v, a);
            b.store(sum, Value::Arg(0));
        }
        module.add_function(func).unwrap();
    }
    module
}

/// Benchmark the full pipeline with every family enabled
///
/// The module is cloned per iteration since the pipeline instruments in place and a second
/// run over the same module is a no-op.
fn bench_full_pipeline(c: &mut Criterion) {
    let config =
        InstrumentFamily::iter().fold(PipelineConfig::primary(), PipelineConfig::with_family);
    let scheduler = PassScheduler::from_config(&config);

    let mut group = c.benchmark_group("pipeline_all_families");
    for count in [1usize, 16, 128] {
        let module = synthetic_module(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &module, |b, module| {
            b.iter(|| {
                let mut module = module.clone();
                let ctx = InstrumentContext::new(config.clone());
                scheduler.run_pipeline(&mut module, &ctx).unwrap();
                black_box(module)
            });
        });
    }
    group.finish();
}

/// Benchmark each family on its own
fn bench_families(c: &mut Criterion) {
    let module = synthetic_module(64);

    let mut group = c.benchmark_group("pipeline_family");
    for family in InstrumentFamily::iter() {
        let config = PipelineConfig::primary().with_family(family);
        let scheduler = PassScheduler::from_config(&config);
        group.bench_function(family.to_string(), |b| {
            b.iter(|| {
                let mut module = module.clone();
                let ctx = InstrumentContext::new(config.clone());
                scheduler.run_pipeline(&mut module, &ctx).unwrap();
                black_box(module)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_full_pipeline, bench_families);
criterion_main!(benches);
