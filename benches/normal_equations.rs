use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use xoverdb::solver::{
    solve, CorrectionModel, RecordTerms, SolveParams, SolverInput, SolverRecord,
};

/// Random survey of `n_tracks` tracks, each crossing a few random others.
fn make_input(rng: &mut StdRng, model: CorrectionModel, n_tracks: usize) -> SolverInput {
    let offsets: Vec<f64> = (0..n_tracks).map(|_| rng.random_range(-5.0..5.0)).collect();
    let slopes: Vec<f64> = (0..n_tracks).map(|_| rng.random_range(-0.01..0.01)).collect();
    let mut records = Vec::new();

    for i in 0..n_tracks {
        // link to the next track so the survey is one cluster
        let partners: Vec<usize> = std::iter::once((i + 1) % n_tracks)
            .chain((0..6).map(|_| rng.random_range(0..n_tracks)))
            .filter(|&j| j != i)
            .collect();
        for j in partners {
            let d = [rng.random_range(0.0..1000.0), rng.random_range(0.0..1000.0)];
            let (coe, terms) = match model {
                CorrectionModel::DistanceDrift => (
                    offsets[i] + slopes[i] * d[0] - offsets[j] - slopes[j] * d[1],
                    RecordTerms::Drift(d),
                ),
                _ => (offsets[i] - offsets[j], RecordTerms::Constant),
            };
            records.push(SolverRecord {
                tracks: [i, j],
                coe: coe + rng.random_range(-0.1..0.1),
                weight: 1.0,
                terms,
            });
        }
    }

    SolverInput {
        tag: "BENCH".into(),
        field: "faa".into(),
        model,
        tracks: (0..n_tracks).map(|k| format!("track{k:04}")).collect(),
        records,
    }
}

fn bench_constant(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    let params = SolveParams::builder()
        .model(CorrectionModel::Constant)
        .build()
        .unwrap();

    c.bench_function("solve/constant_200_tracks", |b| {
        b.iter_batched(
            || make_input(&mut rng, CorrectionModel::Constant, 200),
            |input| {
                let table = solve(black_box(&input), &params).unwrap();
                black_box(table);
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_distance_drift(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xD21F7);
    let params = SolveParams::builder()
        .model(CorrectionModel::DistanceDrift)
        .build()
        .unwrap();

    c.bench_function("solve/distance_drift_150_tracks", |b| {
        b.iter_batched(
            || make_input(&mut rng, CorrectionModel::DistanceDrift, 150),
            |input| {
                let table = solve(black_box(&input), &params).unwrap();
                black_box(table);
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_constant, bench_distance_drift);
criterion_main!(benches);
