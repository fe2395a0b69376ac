#[macro_use]
extern crate criterion;

use criterion::Criterion;
use mandelbrot::{GatherMode, RenderConfig, Renderer, Resolution, Schedule, Viewport};

fn renderer() -> Renderer {
    let config = RenderConfig::new(
        Viewport::default(),
        Resolution::new(200, 150, 500).unwrap(),
    );
    Renderer::new(&config).unwrap()
}

fn sequential(c: &mut Criterion) {
    let r = renderer();
    c.bench_function("sequential 200x150", move |b| b.iter(|| r.sequential().unwrap()));
}

fn parallel(c: &mut Criterion) {
    let r = renderer();
    let threads = num_cpus::get();
    c.bench_function("parallel static 200x150", move |b| {
        b.iter(|| r.parallel(threads, Schedule::Static).unwrap())
    });
    c.bench_function("parallel dynamic 200x150", move |b| {
        b.iter(|| r.parallel(threads, Schedule::Dynamic).unwrap())
    });
}

fn distributed(c: &mut Criterion) {
    let r = renderer();
    let size = num_cpus::get();
    c.bench_function("distributed threads 200x150", move |b| {
        b.iter(|| r.distributed_local(size, GatherMode::Gather).unwrap())
    });
}

criterion_group!(benches, sequential, parallel, distributed);
criterion_main!(benches);
