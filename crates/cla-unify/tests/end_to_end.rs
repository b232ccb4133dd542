// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use cla_core::{ClaError, Dataset, ExecutionContext, MetricProvider, MetricSet, seeded_rng};
use cla_metrics::{BuiltinMetricProvider, spearman};
use cla_unify::{
    AnalyzeConfig, Analyzer, AtomMetricConfig, AtomOverrides, DistanceGrid, MetaLearnerConfig,
    MetaModel, Method, UnifiedMetricEvaluator, analyze, calculate_atom_metrics, filter_metrics,
    generate_two_class, sanitize_training_matrix,
};
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn assert_close(actual: f64, expected: f64, tol: f64) {
    assert!(
        (actual - expected).abs() <= tol,
        "expected {expected}, got {actual}, tol={tol}"
    );
}

/// Absolute class-mean gap of feature 0 and an affine copy of it.
fn gap_provider(dataset: &Dataset) -> Result<MetricSet, ClaError> {
    let classes = dataset.classes();
    if classes.len() != 2 {
        return Err(ClaError::invalid_input("need two classes"));
    }
    let a = dataset.subset_for_class(classes[0]).column_means()[0];
    let b = dataset.subset_for_class(classes[1]).column_means()[0];
    let mut set = MetricSet::new();
    set.insert("gap", (a - b).abs());
    set.insert("gap.scaled", 2.0 * (a - b).abs() + 1.0);
    Ok(set)
}

fn unit_variance_config(dims: usize, repeat: usize, nobs: usize, cache_dir: &Path) -> AnalyzeConfig {
    AnalyzeConfig {
        cache_dir: cache_dir.to_path_buf(),
        seed: Some(2024),
        atom: AtomOverrides {
            mu: Some(vec![0.0; dims]),
            s: Some(vec![1.0; dims]),
            grid: Some(DistanceGrid::standard()),
            repeat: Some(repeat),
            nobs: Some(nobs),
        },
        ..AnalyzeConfig::default()
    }
}

#[test]
fn separability_metrics_rise_with_distance() {
    init_tracing();
    let provider = BuiltinMetricProvider::default();
    let config = AtomMetricConfig::unit_variance(2, DistanceGrid::standard(), 3, 100);
    for seed in [5_u64, 17, 29] {
        let table = calculate_atom_metrics(
            &config,
            &provider,
            &mut seeded_rng(Some(seed)),
            &ExecutionContext::new(),
        )
        .expect("atom table");

        let acc = table.column("classification.ACC").expect("accuracy column");
        let (rho, _) = spearman(acc, table.d()).expect("spearman");
        assert!(rho > 0.8, "seed {seed}: rho={rho} acc={acc:?}");
        assert!(acc[12] > acc[0] + 0.3, "seed {seed}: acc={acc:?}");

        let ber = table.column("classification.BER").expect("ber column");
        let (rho, _) = spearman(ber, table.d()).expect("spearman");
        assert!(rho < -0.8, "seed {seed}: rho={rho} ber={ber:?}");

        let ks = table.column("test.KS.D.max").expect("ks column");
        let (rho, _) = spearman(ks, table.d()).expect("spearman");
        assert!(rho > 0.8, "seed {seed}: rho={rho} ks={ks:?}");
    }
}

#[test]
fn decomposition_calibration_maps_grid_ends_to_bounds() {
    init_tracing();
    let config = AtomMetricConfig::unit_variance(1, DistanceGrid::standard(), 20, 200);
    let table = calculate_atom_metrics(
        &config,
        &gap_provider,
        &mut seeded_rng(Some(9)),
        &ExecutionContext::new(),
    )
    .expect("atom table");
    let filtered = filter_metrics(&table, Some(0.5)).expect("filter");
    assert_eq!(filtered.keys, vec!["gap".to_string(), "gap.scaled".to_string()]);

    let training = sanitize_training_matrix(&filtered.matrix);
    for method in [Method::Pca, Method::Lda] {
        let model = MetaModel::train(method, &filtered.matrix, table.d(), &MetaLearnerConfig::default())
            .expect("train");
        let calibration = model.calibration().expect("decomposition calibration");
        let (at_min, at_max) = if calibration.slope { (0.0, 1.0) } else { (1.0, 0.0) };
        let first = model.unified_score(training.row(0)).expect("first row");
        let last = model.unified_score(training.row(training.rows() - 1)).expect("last row");
        assert_close(first, at_min, 1e-12);
        assert_close(last, at_max, 1e-12);

        for point in [[-1e9, -1e9], [1e9, 1e9], [0.0, 0.0]] {
            let score = model.unified_score(&point).expect("score");
            assert!((0.0..=1.0).contains(&score), "{method}: {score}");
        }
    }
}

#[test]
fn two_feature_logistic_scenario_scores_high() {
    init_tracing();
    let provider = BuiltinMetricProvider::default();
    let dataset = generate_two_class(&[0.0, 0.0], &[1.0, 1.0], 4.0, 200, &mut seeded_rng(Some(77)))
        .expect("dataset");

    let metrics = provider.compute(&dataset).expect("metrics");
    let acc = metrics.scalar("classification.ACC").expect("accuracy");
    assert!(acc > 0.9, "acc={acc}");

    let dir = tempfile::tempdir().expect("tempdir");
    let config = AnalyzeConfig {
        method: Method::Logistic,
        ..unit_variance_config(2, 5, 200, dir.path())
    };
    let report = Analyzer::new(&provider, config)
        .expect("analyzer")
        .run(&dataset)
        .expect("report");
    assert!(report.between_class > 0.8, "between={}", report.between_class);
    assert!(report.cache_path.exists());
    assert!(!report.selected_keys.is_empty());
    assert_eq!(report.diagnostics.provider, "builtin");
}

#[test]
fn in_class_scores_sit_nearer_the_zero_distance_end() {
    init_tracing();
    let provider = gap_provider;
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset = generate_two_class(&[0.0], &[1.0], 2.0, 100, &mut seeded_rng(Some(31)))
        .expect("dataset");
    let report = Analyzer::new(&provider, unit_variance_config(1, 5, 100, dir.path()))
        .expect("analyzer")
        .run(&dataset)
        .expect("report");

    let training_table = cla_unify::load_atom_table_file(&report.cache_path, None)
        .expect("artifact")
        .table;
    let filtered = filter_metrics(&training_table, Some(0.5)).expect("filter");
    let training = sanitize_training_matrix(&filtered.matrix);
    let zero_end = report.model.unified_score(training.row(0)).expect("zero-distance score");

    let evaluator =
        UnifiedMetricEvaluator::new(&report.model, &report.selected_keys, &provider).expect("evaluator");
    let mut in_class = Vec::new();
    for seed in 0..4 {
        let scores = evaluator
            .in_class(&dataset, 3, &mut seeded_rng(Some(seed)))
            .expect("in-class");
        in_class.extend(scores.values().copied());
    }
    assert!(!in_class.is_empty());
    let in_class_mean = in_class.iter().sum::<f64>() / in_class.len() as f64;
    assert!(
        (in_class_mean - zero_end).abs() < (report.between_class - zero_end).abs(),
        "in_class={in_class_mean}, between={}, zero_end={zero_end}",
        report.between_class
    );
}

#[test]
fn unsupported_method_produces_no_artifact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("atoms.clatbl");
    let dataset = generate_two_class(&[0.0], &[1.0], 1.0, 20, &mut seeded_rng(Some(1)))
        .expect("dataset");
    let err = analyze(&dataset, &gap_provider, true, "bogus", Some(&path)).expect_err("bogus");
    assert_eq!(err.code(), "invalid_config");
    assert!(err.to_string().contains("bogus"));
    assert!(!path.exists());
    assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
}

#[test]
fn cached_table_reproduces_scores_for_every_method() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("shared.clatbl");
    let dataset = generate_two_class(&[1.0], &[2.0], 3.0, 80, &mut seeded_rng(Some(12)))
        .expect("dataset");
    let seed_config = AnalyzeConfig {
        cache_path: Some(path.clone()),
        seed: Some(3),
        atom: AtomOverrides {
            repeat: Some(4),
            nobs: Some(60),
            ..AtomOverrides::default()
        },
        ..AnalyzeConfig::default()
    };
    Analyzer::new(&gap_provider, seed_config.clone())
        .expect("analyzer")
        .run(&dataset)
        .expect("seed run");

    for method in Method::ALL {
        let config = AnalyzeConfig {
            method,
            ..seed_config.clone()
        };
        let first = Analyzer::new(&gap_provider, config.clone())
            .expect("analyzer")
            .run(&dataset)
            .expect("first");
        let second = Analyzer::new(&gap_provider, config)
            .expect("analyzer")
            .run(&dataset)
            .expect("second");
        assert_eq!(first.between_class.to_bits(), second.between_class.to_bits());
        assert_eq!(first.in_class, second.in_class);
        assert_eq!(first.cache_path, path);
        if method != Method::Linear {
            assert!((0.0..=1.0).contains(&first.between_class), "{method}");
        }
    }
}
