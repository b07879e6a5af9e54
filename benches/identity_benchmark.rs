// Measures the cost of one posterior evaluation: the identity curve over all
// pairs followed by the weighted binomial likelihood.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use malecot::data::{CoordinateMode, MarkerLocus, PairwiseData, Sample};
use malecot::identity::{IdentityModel, ModelKind};
use malecot::likelihood::log_likelihood;
use malecot::series::DEFAULT_SERIES_TERMS;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Sample counts to benchmark; pairs grow quadratically.
const SAMPLE_COUNTS: [usize; 3] = [50, 200, 500];
const MARKERS: usize = 10;
const MUTATION_RATE: f64 = 1e-4;

fn synthetic_data(n: usize) -> PairwiseData {
    let mut rng = StdRng::seed_from_u64(42);
    let samples = (0..n)
        .map(|i| Sample {
            id: format!("s{i}"),
            coordinates: [rng.gen_range(0.0..50.0), rng.gen_range(0.0..50.0)],
        })
        .collect();
    let markers = (0..MARKERS)
        .map(|m| MarkerLocus {
            name: format!("m{m}"),
            genotypes: (0..n)
                .map(|_| [rng.gen_range(1..8), rng.gen_range(1..8)])
                .collect(),
        })
        .collect();
    match PairwiseData::from_parts(samples, markers, CoordinateMode::Planar) {
        Ok(data) => data,
        Err(e) => panic!("synthetic data is invalid: {e}"),
    }
}

fn bench_identity(c: &mut Criterion) {
    let mut group = c.benchmark_group("identity");
    for &n in &SAMPLE_COUNTS {
        let data = synthetic_data(n);
        let model = match IdentityModel::for_data(&data, MUTATION_RATE, DEFAULT_SERIES_TERMS) {
            Ok(model) => model,
            Err(e) => panic!("series setup failed: {e}"),
        };
        group.throughput(Throughput::Elements(data.n_pairs() as u64));

        group.bench_with_input(BenchmarkId::new("phi", n), &n, |b, _| {
            b.iter(|| model.phi(black_box(12.0), black_box(3.0)))
        });

        group.bench_with_input(BenchmarkId::new("log_likelihood", n), &n, |b, _| {
            b.iter(|| {
                let probabilities = model
                    .probabilities(ModelKind::Full, black_box(12.0), black_box(3.0), &data)
                    .map_err(|e| e.to_string())?;
                log_likelihood(probabilities.view(), &data).map_err(|e| e.to_string())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_identity);
criterion_main!(benches);
