//! Criterion benchmarks for signed distance and isosurface extraction.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use massing_core::prelude::*;

fn bench_signed_distance(c: &mut Criterion) {
    let mesh = TriangleMesh::axis_aligned_box(Point3::new(0.3, 0.3, 0.0), Point3::new(0.7, 0.7, 0.9));
    let sdf = MeshSdf::new(&mesh).unwrap();
    let points: Vec<Point3> = (0..4096)
        .map(|i| {
            let t = i as f32 / 4096.0;
            Point3::new(t, (t * 7.0).fract(), (t * 13.0).fract())
        })
        .collect();

    let mut group = c.benchmark_group("signed_distance");
    group.throughput(Throughput::Elements(points.len() as u64));
    group.bench_function("box_4096", |b| {
        b.iter(|| black_box(sdf.signed_distances(black_box(&points))))
    });
    group.finish();
}

fn bench_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_isosurface");
    for resolution in [32usize, 64, 96] {
        let grid = GridSpec::new(Aabb::new(Point3::splat(-1.0), Point3::splat(1.0)), resolution).unwrap();
        let field = ScalarField::from_fn(grid, |p| p.length() - 0.7);
        group.throughput(Throughput::Elements(grid.num_nodes() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(resolution), &field, |b, field| {
            b.iter(|| black_box(extract_isosurface(field, 0.0)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_signed_distance, bench_extraction);
criterion_main!(benches);
