use criterion::{black_box, criterion_group, criterion_main, Criterion};
use strata_core::{BaseTensor, Cpu, DimensionRange, DimensionType, Tensor, ALL};

fn tensor_4d() -> Tensor<f32, Cpu> {
    Tensor::new(
        [32, 16, 64, 64].into(),
        [
            DimensionType::Sample,
            DimensionType::Channel,
            DimensionType::Spatial,
            DimensionType::Spatial,
        ]
        .into(),
    )
    .unwrap()
}

fn bench_full_view(c: &mut Criterion) {
    let mut t = tensor_4d();
    c.bench_function("view_full_4d", |bencher| {
        bencher.iter(|| black_box(t.view().unwrap()));
    });
}

fn bench_sub_view(c: &mut Criterion) {
    let mut t = tensor_4d();
    let coords = [
        DimensionRange::Index(3),
        ALL,
        DimensionRange::range(8, 40),
        DimensionRange::range(8, 40),
    ];
    c.bench_function("view_sub_4d", |bencher| {
        bencher.iter(|| black_box(t.view_of(black_box(&coords)).unwrap()));
    });
}

fn bench_get(c: &mut Criterion) {
    let t = tensor_4d();
    c.bench_function("get_4d", |bencher| {
        bencher.iter(|| black_box(t.get(black_box(&[31, 15, 63, 63])).unwrap()));
    });
}

criterion_group!(benches, bench_full_view, bench_sub_view, bench_get);
criterion_main!(benches);
