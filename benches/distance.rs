//! Distance kernel benchmarks
//!
//! Run with: cargo bench --bench distance

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::Rng;

use flatvec_db::distance::{detect_simd, squared_l2};

fn random_vector(dim: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..dim).map(|_| rng.gen::<f32>() - 0.5).collect()
}

fn bench_squared_l2(c: &mut Criterion) {
    let dims = [64, 128, 256, 512];
    let simd_available = detect_simd();

    let mut group = c.benchmark_group("squared_l2");

    for dim in dims {
        group.throughput(Throughput::Elements(dim as u64));

        let a = random_vector(dim);
        let b = random_vector(dim);

        group.bench_function(format!("scalar_dim_{}", dim), |bencher| {
            bencher.iter(|| squared_l2(black_box(&a), black_box(&b), false))
        });

        if simd_available {
            group.bench_function(format!("simd_dim_{}", dim), |bencher| {
                bencher.iter(|| squared_l2(black_box(&a), black_box(&b), true))
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_squared_l2);
criterion_main!(benches);
