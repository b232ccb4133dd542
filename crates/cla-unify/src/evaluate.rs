// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::meta::MetaModel;
use cla_core::{ClaError, Dataset, MetricProvider, MetricSet};
use rand::Rng;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Stand-in for infinite metric values at evaluation time.
pub const EVALUATION_INFINITY: f64 = 1000.0;

/// Picks `keys` out of `metrics`; absent or vector-valued keys become NaN.
pub fn metric_vector(metrics: &MetricSet, keys: &[String]) -> Vec<f64> {
    keys.iter()
        .map(|key| match metrics.scalar(key) {
            Some(value) => value,
            None => {
                warn!(key = key.as_str(), "selected metric missing from provider output");
                f64::NAN
            }
        })
        .collect()
}

/// NaN becomes 0 and infinities become `±EVALUATION_INFINITY`.
pub fn sanitize_metric_value(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else if value.is_infinite() {
        EVALUATION_INFINITY.copysign(value)
    } else {
        value
    }
}

pub fn sanitize_metric_vector(values: &mut [f64]) {
    values
        .iter_mut()
        .for_each(|v| *v = sanitize_metric_value(*v));
}

/// Applies a trained meta-model to real datasets.
pub struct UnifiedMetricEvaluator<'a, P: MetricProvider + ?Sized> {
    model: &'a MetaModel,
    keys: &'a [String],
    provider: &'a P,
}

impl<P: MetricProvider + ?Sized> std::fmt::Debug for UnifiedMetricEvaluator<'_, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiedMetricEvaluator")
            .field("model", &self.model)
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

impl<'a, P: MetricProvider + ?Sized> UnifiedMetricEvaluator<'a, P> {
    /// `keys` must be the metric order the model was trained on.
    pub fn new(model: &'a MetaModel, keys: &'a [String], provider: &'a P) -> Result<Self, ClaError> {
        if keys.len() != model.n_features() {
            return Err(ClaError::invalid_config(format!(
                "evaluator got {} keys for a model trained on {} metrics",
                keys.len(),
                model.n_features()
            )));
        }
        Ok(Self {
            model,
            keys,
            provider,
        })
    }

    /// Uncalibrated model score of `dataset` under its own labels.
    fn raw_score(&self, dataset: &Dataset) -> Result<f64, ClaError> {
        let metrics = self.provider.compute(dataset)?;
        let mut vector = metric_vector(&metrics, self.keys);
        sanitize_metric_vector(&mut vector);
        self.model.score(&vector)
    }

    /// Unified score of the dataset's actual class split.
    pub fn between_class(&self, dataset: &Dataset) -> Result<f64, ClaError> {
        let raw = self.raw_score(dataset)?;
        let score = self.model.calibrate(raw);
        debug!(raw, score, "between-class score");
        Ok(score)
    }

    /// Per-class unified score under `repeat` random binary relabelings.
    ///
    /// Raw scores are averaged over the trials that succeeded, then calibrated.
    /// A class whose every trial failed is left out of the result.
    pub fn in_class<R: Rng + ?Sized>(
        &self,
        dataset: &Dataset,
        repeat: usize,
        rng: &mut R,
    ) -> Result<BTreeMap<i64, f64>, ClaError> {
        if repeat == 0 {
            return Err(ClaError::invalid_config("in-class repeat must be >= 1"));
        }
        let mut scores = BTreeMap::new();
        for class in dataset.classes() {
            let members = dataset.subset_for_class(class);
            let mut raw_sum = 0.0;
            let mut succeeded = 0usize;
            for trial in 0..repeat {
                let labels: Vec<i64> = (0..members.n_samples())
                    .map(|_| i64::from(rng.gen::<f64>() > 0.5))
                    .collect();
                let relabeled = members.with_labels(labels)?;
                match self.raw_score(&relabeled) {
                    Ok(raw) => {
                        raw_sum += raw;
                        succeeded += 1;
                    }
                    Err(err) => debug!(class, trial, error = %err, "in-class trial failed"),
                }
            }
            if succeeded == 0 {
                warn!(class, repeat, "every in-class trial failed; class omitted");
                continue;
            }
            let score = self.model.calibrate(raw_sum / succeeded as f64);
            debug!(class, succeeded, score, "in-class score");
            scores.insert(class, score);
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::{UnifiedMetricEvaluator, metric_vector, sanitize_metric_value};
    use crate::config::{MetaLearnerConfig, Method};
    use crate::linalg::Matrix;
    use crate::meta::MetaModel;
    use cla_core::{ClaError, Dataset, MetricSet, seeded_rng};

    fn gap_provider(dataset: &Dataset) -> Result<MetricSet, ClaError> {
        let classes = dataset.classes();
        if classes.len() != 2 {
            return Err(ClaError::invalid_input("need two classes"));
        }
        let a = dataset.subset_for_class(classes[0]).column_means()[0];
        let b = dataset.subset_for_class(classes[1]).column_means()[0];
        let mut set = MetricSet::new();
        set.insert("gap", (a - b).abs());
        Ok(set)
    }

    fn gap_model(method: Method) -> (MetaModel, Vec<String>) {
        let d: Vec<f64> = (0..13).map(|i| f64::from(i) * 0.5).collect();
        let matrix = Matrix::from_columns(&[&d], d.len()).expect("matrix");
        let model =
            MetaModel::train(method, &matrix, &d, &MetaLearnerConfig::default()).expect("train");
        (model, vec!["gap".to_string()])
    }

    fn two_blobs(gap: f64) -> Dataset {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| {
                let jitter = f64::from(i % 5) * 0.01;
                if i < 20 { vec![jitter] } else { vec![gap + jitter] }
            })
            .collect();
        let labels = (0..40).map(|i| i64::from(i >= 20)).collect();
        Dataset::from_rows(&rows, labels).expect("dataset")
    }

    #[test]
    fn sanitize_bounds_infinities() {
        assert_eq!(sanitize_metric_value(f64::NAN), 0.0);
        assert_eq!(sanitize_metric_value(f64::INFINITY), 1000.0);
        assert_eq!(sanitize_metric_value(f64::NEG_INFINITY), -1000.0);
        assert_eq!(sanitize_metric_value(0.25), 0.25);
    }

    #[test]
    fn missing_and_vector_keys_become_nan() {
        let mut metrics = MetricSet::new();
        metrics.insert("a", 1.5);
        metrics.insert("v", vec![1.0, 2.0]);
        let keys = vec!["a".to_string(), "v".to_string(), "absent".to_string()];
        let vector = metric_vector(&metrics, &keys);
        assert_eq!(vector[0], 1.5);
        assert!(vector[1].is_nan());
        assert!(vector[2].is_nan());
    }

    #[test]
    fn evaluator_checks_key_count() {
        let (model, _) = gap_model(Method::Pca);
        let keys = vec!["gap".to_string(), "other".to_string()];
        let err = UnifiedMetricEvaluator::new(&model, &keys, &gap_provider).expect_err("width");
        assert_eq!(err.code(), "invalid_config");
    }

    #[test]
    fn between_class_is_calibrated_for_decomposition() {
        let (model, keys) = gap_model(Method::Pca);
        let evaluator = UnifiedMetricEvaluator::new(&model, &keys, &gap_provider).expect("evaluator");
        let near = evaluator.between_class(&two_blobs(0.0)).expect("near");
        let mid = evaluator.between_class(&two_blobs(3.0)).expect("mid");
        let far = evaluator.between_class(&two_blobs(50.0)).expect("far");
        assert!(near < 0.05, "{near}");
        assert!((mid - 0.5).abs() < 0.05, "{mid}");
        assert_eq!(far, 1.0);
    }

    #[test]
    fn linear_scores_are_not_rescaled() {
        let (model, keys) = gap_model(Method::Linear);
        let evaluator = UnifiedMetricEvaluator::new(&model, &keys, &gap_provider).expect("evaluator");
        let far = evaluator.between_class(&two_blobs(50.0)).expect("far");
        assert!(far > 40.0, "{far}");
    }

    #[test]
    fn in_class_scores_every_class_near_zero() {
        let (model, keys) = gap_model(Method::Pca);
        let evaluator = UnifiedMetricEvaluator::new(&model, &keys, &gap_provider).expect("evaluator");
        let scores = evaluator
            .in_class(&two_blobs(4.0), 3, &mut seeded_rng(Some(11)))
            .expect("in-class");
        assert_eq!(scores.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
        for score in scores.values() {
            assert!(*score < 0.05, "{score}");
        }
    }

    #[test]
    fn in_class_omits_class_without_successful_trial() {
        let (model, keys) = gap_model(Method::Pca);
        let evaluator = UnifiedMetricEvaluator::new(&model, &keys, &gap_provider).expect("evaluator");
        let mut rows: Vec<Vec<f64>> = (0..10).map(|i| vec![f64::from(i)]).collect();
        rows.push(vec![0.0]);
        let mut labels = vec![0; 10];
        labels.push(7);
        let dataset = Dataset::from_rows(&rows, labels).expect("dataset");
        let scores = evaluator
            .in_class(&dataset, 4, &mut seeded_rng(Some(3)))
            .expect("in-class");
        assert!(scores.contains_key(&0));
        assert!(!scores.contains_key(&7));
    }

    #[test]
    fn zero_repeat_is_config_error() {
        let (model, keys) = gap_model(Method::Pca);
        let evaluator = UnifiedMetricEvaluator::new(&model, &keys, &gap_provider).expect("evaluator");
        let err = evaluator
            .in_class(&two_blobs(1.0), 0, &mut seeded_rng(Some(1)))
            .expect_err("repeat");
        assert_eq!(err.code(), "invalid_config");
    }
}
