use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ketra_rt::config::GcConfig;
use ketra_rt::factory::Factory;
use ketra_rt::gc::{GcCollector, Msg, Registry};

fn allocate_and_collect(garbage_count: usize) {
    let mut registry = Registry::new();
    let mut factory = Factory::new();
    let mut gc = Msg::new(GcConfig::default());

    let kept = factory.alloc_array(&mut registry, vec![]);
    for _ in 0..garbage_count {
        black_box(factory.alloc_array(&mut registry, vec![]));
    }

    let roots = vec![kept];
    gc.full_gc(&mut registry, &roots);
    black_box(gc.stats());
}

fn bench_gc_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("gc_sweep");
    for &size in &[1_000usize, 10_000, 100_000] {
        group.bench_with_input(format!("garbage_{size}"), &size, |b, &size| {
            b.iter(|| allocate_and_collect(size));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_gc_sweep);
criterion_main!(benches);
