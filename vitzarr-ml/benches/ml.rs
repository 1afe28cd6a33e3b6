use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::Array2;
use vitzarr_ml::distance::DistanceMetric;
use vitzarr_ml::neighbors::{fuzzy_simplicial_set, knn_graph};
use vitzarr_ml::reduction::{pca, PcaConfig, PcaSolver};
use vitzarr_ml::umap::{umap_layout, UmapConfig};

fn random_matrix(n: usize, d: usize, seed: u64) -> Array2<f64> {
    let mut state = seed;
    Array2::from_shape_fn((n, d), |_| {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        (state >> 11) as f64 / (1u64 << 53) as f64
    })
}

fn bench_pca(c: &mut Criterion) {
    let mut group = c.benchmark_group("pca");
    group.sample_size(10);

    let data = random_matrix(2_000, 200, 42);
    for (name, solver) in [("exact", PcaSolver::Exact), ("power", PcaSolver::PowerIteration)] {
        let config = PcaConfig {
            n_components: 50,
            solver,
            ..Default::default()
        };
        group.bench_function(format!("2k_x_200_{name}"), |b| {
            b.iter(|| pca(black_box(data.view()), &config))
        });
    }

    group.finish();
}

fn bench_neighbors(c: &mut Criterion) {
    let mut group = c.benchmark_group("neighbors");
    group.sample_size(10);

    let data = random_matrix(1_000, 50, 7);
    group.bench_function("1k_x_50_k14", |b| {
        b.iter(|| {
            let knn = knn_graph(black_box(data.view()), 14, DistanceMetric::Euclidean)?;
            Ok::<_, vitzarr_core::VitzarrError>(fuzzy_simplicial_set(&knn))
        })
    });

    group.finish();
}

fn bench_umap(c: &mut Criterion) {
    let mut group = c.benchmark_group("umap");
    group.sample_size(10);

    let data = random_matrix(500, 30, 11);
    let knn = knn_graph(data.view(), 14, DistanceMetric::Euclidean).unwrap();
    let graph = fuzzy_simplicial_set(&knn);
    let config = UmapConfig {
        n_epochs: 100,
        ..Default::default()
    };
    group.bench_function("500_pts_100_epochs", |b| {
        b.iter(|| umap_layout(black_box(&graph), data.view(), &config))
    });

    group.finish();
}

criterion_group!(benches, bench_pca, bench_neighbors, bench_umap);
criterion_main!(benches);
