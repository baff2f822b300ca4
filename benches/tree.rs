use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kdmesh::{linear_scan, KdTreeBuilder, Problem};

fn build(c: &mut Criterion) {
    let problem = Problem::generate(0, 16, 50_000, 0).unwrap();
    let mut group = c.benchmark_group("build");
    group.sample_size(20);

    for depth in [0, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            b.iter(|| {
                let mut points = problem.points().points();
                let tree = KdTreeBuilder::new()
                    .parallel_depth(depth)
                    .build(&mut points)
                    .unwrap();
                black_box(tree.len())
            })
        });
    }
    group.finish();
}

fn search(c: &mut Criterion) {
    let problem = Problem::generate(1, 16, 50_000, 100).unwrap();
    let mut points = problem.points().slice(0..problem.num_index_points());
    let index = points.clone();
    let tree = KdTreeBuilder::new().build(&mut points).unwrap();
    let queries = problem.queries();

    let mut group = c.benchmark_group("search");
    group.bench_function("kdtree", |b| {
        b.iter(|| {
            for q in &queries {
                black_box(tree.search(q).unwrap());
            }
        })
    });
    group.bench_function("batch", |b| b.iter(|| black_box(tree.search_batch(&queries).unwrap())));
    group.sample_size(10);
    group.bench_function("linear", |b| {
        b.iter(|| {
            for q in &queries {
                black_box(linear_scan(&index, q).unwrap());
            }
        })
    });
    group.finish();
}

criterion_group!(benches, build, search);
criterion_main!(benches);
