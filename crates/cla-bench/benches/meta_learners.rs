// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use cla_bench::filtered_training_set;
use cla_unify::{MetaLearnerConfig, MetaModel, Method};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

fn benchmark_meta_learners(c: &mut Criterion) {
    let filtered = filtered_training_set(2, 3, 100).expect("training set should build");
    let d = filtered.table.d().to_vec();
    let config = MetaLearnerConfig::default();

    let mut group = c.benchmark_group("meta_learners");

    for method in Method::ALL {
        group.bench_function(format!("train_{method}"), |b| {
            b.iter(|| {
                MetaModel::train(
                    black_box(method),
                    black_box(&filtered.matrix),
                    black_box(&d),
                    black_box(&config),
                )
                .expect("meta-learner training should succeed");
            })
        });
    }

    let model = MetaModel::train(Method::Pca, &filtered.matrix, &d, &config)
        .expect("pca training should succeed");
    let rows: Vec<&[f64]> = filtered.matrix.row_iter().collect();
    group.bench_function("pca_unified_score_grid", |b| {
        b.iter(|| {
            for row in &rows {
                let _ = model
                    .unified_score(black_box(row))
                    .expect("scoring a training row should succeed");
            }
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_meta_learners);
criterion_main!(benches);
