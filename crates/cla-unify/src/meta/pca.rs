// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use super::{MetaLearner, far_index, prepare_training};
use crate::calibrate::ScaleCalibration;
use crate::config::{MetaLearnerConfig, Method};
use crate::linalg::{Matrix, scatter, symmetric_eigen};
use cla_core::ClaError;

/// Principal components of the metric matrix; scores are first-component
/// projections mapped through a [`ScaleCalibration`].
#[derive(Clone, Debug, PartialEq)]
pub struct PcaMetaModel {
    pub mean: Vec<f64>,
    /// `components[k]` is the k-th unit loading vector.
    pub components: Vec<Vec<f64>>,
    pub explained_variance: Vec<f64>,
    /// Share of total variance per retained component.
    pub explained_variance_ratio: Vec<f64>,
    /// First-component projection of every training row.
    pub projections: Vec<f64>,
    pub calibration: ScaleCalibration,
}

/// Flips `vector` so its largest-magnitude loading is positive.
fn orient(vector: &mut [f64]) {
    let mut pivot = 0;
    for (i, v) in vector.iter().enumerate() {
        if v.abs() > vector[pivot].abs() {
            pivot = i;
        }
    }
    if vector.get(pivot).is_some_and(|v| *v < 0.0) {
        vector.iter_mut().for_each(|v| *v = -*v);
    }
}

impl PcaMetaModel {
    /// Loading of `component` on each feature, paired with its index.
    pub fn loadings(&self, component: usize) -> Option<Vec<(usize, f64)>> {
        self.components
            .get(component)
            .map(|vector| vector.iter().copied().enumerate().collect())
    }

    fn project(&self, x: &[f64]) -> f64 {
        x.iter()
            .zip(&self.mean)
            .zip(&self.components[0])
            .map(|((v, m), c)| (v - m) * c)
            .sum()
    }
}

impl MetaLearner for PcaMetaModel {
    const METHOD: Method = Method::Pca;

    fn fit(matrix: &Matrix, d: &[f64], config: &MetaLearnerConfig) -> Result<Self, ClaError> {
        let x = prepare_training(matrix, d)?;
        let n = x.rows();
        if n < 2 {
            return Err(ClaError::numerical_issue(
                "principal components need at least two grid points",
            ));
        }
        let k = config.pca_components.min(n).min(x.cols());

        let mean = x.column_means();
        let mut covariance = scatter(x.row_iter(), &mean);
        covariance /= (n - 1) as f64;
        let eigen = symmetric_eigen(covariance)?;

        let total: f64 = eigen.values.iter().map(|v| v.max(0.0)).sum();
        let explained_variance: Vec<f64> =
            eigen.values.iter().take(k).map(|v| v.max(0.0)).collect();
        let explained_variance_ratio = explained_variance
            .iter()
            .map(|v| if total > 0.0 { v / total } else { 0.0 })
            .collect();
        let components: Vec<Vec<f64>> = eigen
            .vectors
            .into_iter()
            .take(k)
            .map(|mut vector| {
                orient(&mut vector);
                vector
            })
            .collect();

        let projections: Vec<f64> = x
            .row_iter()
            .map(|row| {
                row.iter()
                    .zip(&mean)
                    .map(|(v, m)| v - m)
                    .zip(&components[0])
                    .map(|(c, l)| c * l)
                    .sum()
            })
            .collect();
        let calibration = ScaleCalibration::fit(&projections, far_index(d))?;

        Ok(Self {
            mean,
            components,
            explained_variance,
            explained_variance_ratio,
            projections,
            calibration,
        })
    }

    fn n_features(&self) -> usize {
        self.mean.len()
    }

    fn raw_score(&self, x: &[f64]) -> f64 {
        self.project(x)
    }

    fn calibration(&self) -> Option<&ScaleCalibration> {
        Some(&self.calibration)
    }
}

#[cfg(test)]
mod tests {
    use super::{PcaMetaModel, orient};
    use crate::config::MetaLearnerConfig;
    use crate::linalg::Matrix;
    use crate::meta::MetaLearner;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tol={tol}"
        );
    }

    fn fixture() -> (Matrix, Vec<f64>) {
        let d: Vec<f64> = (0..9).map(|i| f64::from(i) * 0.75).collect();
        let strong: Vec<f64> = d.iter().map(|x| 3.0 * x).collect();
        let weak: Vec<f64> = d
            .iter()
            .enumerate()
            .map(|(i, _)| if i % 2 == 0 { 0.2 } else { -0.2 })
            .collect();
        let falling: Vec<f64> = d.iter().map(|x| -0.5 * x).collect();
        let matrix = Matrix::from_columns(&[&strong, &weak, &falling], d.len()).expect("matrix");
        (matrix, d)
    }

    #[test]
    fn orient_makes_largest_loading_positive() {
        let mut v = vec![0.1, -0.9, 0.3];
        orient(&mut v);
        assert_eq!(v, vec![-0.1, 0.9, -0.3]);
    }

    #[test]
    fn first_component_follows_dominant_direction() {
        let (matrix, d) = fixture();
        let model = PcaMetaModel::fit(&matrix, &d, &MetaLearnerConfig::default()).expect("fit");
        assert_eq!(model.components.len(), 3);
        let first = &model.components[0];
        assert!(first[0] > 0.9);
        assert!(first[2] < 0.0);
        assert_close(first.iter().map(|v| v * v).sum::<f64>(), 1.0, 1e-12);
        assert!(model.calibration.slope);
        assert_eq!(model.loadings(0).expect("loadings")[0].0, 0);
        assert!(model.loadings(7).is_none());
    }

    #[test]
    fn explained_variance_ratio_is_descending_and_bounded() {
        let (matrix, d) = fixture();
        let model = PcaMetaModel::fit(&matrix, &d, &MetaLearnerConfig::default()).expect("fit");
        let ratio = &model.explained_variance_ratio;
        assert!(ratio.windows(2).all(|w| w[0] >= w[1]));
        assert!(ratio.iter().all(|r| (0.0..=1.0).contains(r)));
        assert!(ratio.iter().sum::<f64>() <= 1.0 + 1e-12);
        assert!(ratio[0] > 0.95);
    }

    #[test]
    fn component_count_is_capped_by_shape() {
        let d = [0.0, 1.0];
        let a = [0.0, 1.0];
        let b = [2.0, 5.0];
        let c = [1.0, 1.5];
        let matrix = Matrix::from_columns(&[&a, &b, &c], 2).expect("matrix");
        let model = PcaMetaModel::fit(&matrix, &d, &MetaLearnerConfig::default()).expect("fit");
        assert_eq!(model.components.len(), 2);
        assert_close(model.explained_variance_ratio[0], 1.0, 1e-12);
    }

    #[test]
    fn projections_span_calibration_range() {
        let (matrix, d) = fixture();
        let model = PcaMetaModel::fit(&matrix, &d, &MetaLearnerConfig::default()).expect("fit");
        let lo = model.projections.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = model.projections.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(model.calibration.x_min, lo);
        assert_eq!(model.calibration.x_max, hi);
        assert_close(model.calibration.apply(model.projections[0]), 0.0, 1e-12);
        assert_close(model.calibration.apply(*model.projections.last().expect("last")), 1.0, 1e-12);
    }

    #[test]
    fn single_row_is_rejected() {
        let matrix = Matrix::from_columns(&[&[1.0]], 1).expect("matrix");
        let err = PcaMetaModel::fit(&matrix, &[0.0], &MetaLearnerConfig::default())
            .expect_err("one row");
        assert_eq!(err.code(), "numerical_issue");
    }
}
