// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use super::{MetaLearner, binarize, far_index, prepare_training};
use crate::calibrate::ScaleCalibration;
use crate::config::{MetaLearnerConfig, Method};
use crate::linalg::{Matrix, pinv, scatter};
use cla_core::ClaError;
use nalgebra::DVector;

const PINV_REL_TOL: f64 = 1e-8;

/// Fisher discriminant between grid points with `d >= cutoff` and the rest.
///
/// The single discriminant axis is scaled to unit within-class variance and
/// oriented so the far class projects higher.
#[derive(Clone, Debug, PartialEq)]
pub struct LdaMetaModel {
    /// Weighted mean of the class means.
    pub center: Vec<f64>,
    pub direction: Vec<f64>,
    pub cutoff: f64,
    /// Always `[1.0]`: two classes give one discriminant axis.
    pub explained_variance_ratio: Vec<f64>,
    pub projections: Vec<f64>,
    pub calibration: ScaleCalibration,
}

fn class_mean(x: &Matrix, target: &[bool], class: bool) -> (Vec<f64>, usize) {
    let mut mean = vec![0.0; x.cols()];
    let mut count = 0usize;
    for (row, _) in x.row_iter().zip(target).filter(|(_, t)| **t == class) {
        for (acc, &v) in mean.iter_mut().zip(row) {
            *acc += v;
        }
        count += 1;
    }
    mean.iter_mut().for_each(|m| *m /= count.max(1) as f64);
    (mean, count)
}

impl MetaLearner for LdaMetaModel {
    const METHOD: Method = Method::Lda;

    fn fit(matrix: &Matrix, d: &[f64], config: &MetaLearnerConfig) -> Result<Self, ClaError> {
        let x = prepare_training(matrix, d)?;
        let target = binarize(d, config.lda_cutoff, "discriminant meta-learner")?;
        let n = x.rows();

        let (near_mean, near_count) = class_mean(&x, &target, false);
        let (far_mean, far_count) = class_mean(&x, &target, true);
        let near_rows = x.row_iter().zip(&target).filter(|(_, t)| !**t).map(|(row, _)| row);
        let far_rows = x.row_iter().zip(&target).filter(|(_, t)| **t).map(|(row, _)| row);
        let dof = if n > 2 { (n - 2) as f64 } else { 1.0 };
        let within = (scatter(near_rows, &near_mean) + scatter(far_rows, &far_mean)) / dof;

        let gap = DVector::from_iterator(
            far_mean.len(),
            far_mean.iter().zip(&near_mean).map(|(f, m)| f - m),
        );
        if gap.iter().all(|g| *g == 0.0) {
            return Err(ClaError::numerical_issue(
                "discriminant meta-learner: class means coincide",
            ));
        }
        let mut direction = pinv(within.clone(), PINV_REL_TOL)? * &gap;
        if direction.iter().all(|w| *w == 0.0) {
            // Gap lies entirely in the null space of the within-class scatter.
            direction = gap.clone();
        }
        let spread = direction.dot(&(&within * &direction));
        let norm = if spread > 0.0 {
            spread.sqrt()
        } else {
            direction.norm()
        };
        direction /= norm;
        if direction.dot(&gap) < 0.0 {
            direction.neg_mut();
        }
        if direction.iter().any(|w| !w.is_finite()) {
            return Err(ClaError::numerical_issue(
                "discriminant meta-learner produced a non-finite axis",
            ));
        }

        let center: Vec<f64> = near_mean
            .iter()
            .zip(&far_mean)
            .map(|(a, b)| (a * near_count as f64 + b * far_count as f64) / n as f64)
            .collect();
        let mut model = Self {
            center,
            direction: direction.iter().copied().collect(),
            cutoff: config.lda_cutoff,
            explained_variance_ratio: vec![1.0],
            projections: Vec::new(),
            calibration: ScaleCalibration {
                x_min: 0.0,
                x_max: 0.0,
                slope: true,
            },
        };
        model.projections = x.row_iter().map(|row| model.raw_score(row)).collect();
        model.calibration = ScaleCalibration::fit(&model.projections, far_index(d))?;
        Ok(model)
    }

    fn n_features(&self) -> usize {
        self.direction.len()
    }

    fn raw_score(&self, x: &[f64]) -> f64 {
        x.iter()
            .zip(&self.center)
            .zip(&self.direction)
            .map(|((v, c), w)| (v - c) * w)
            .sum()
    }

    fn calibration(&self) -> Option<&ScaleCalibration> {
        Some(&self.calibration)
    }
}

#[cfg(test)]
mod tests {
    use super::LdaMetaModel;
    use crate::config::MetaLearnerConfig;
    use crate::linalg::Matrix;
    use crate::meta::MetaLearner;

    fn grid() -> Vec<f64> {
        (0..13).map(|i| f64::from(i) * 0.5).collect()
    }

    #[test]
    fn far_class_projects_higher() {
        let d = grid();
        let falling: Vec<f64> = d.iter().map(|x| 1.0 - 0.1 * x).collect();
        let noise: Vec<f64> = (0..13).map(|i| f64::from(i % 3) * 0.01).collect();
        let matrix = Matrix::from_columns(&[&falling, &noise], d.len()).expect("matrix");
        let model = LdaMetaModel::fit(&matrix, &d, &MetaLearnerConfig::default()).expect("fit");
        assert!(model.direction[0] < 0.0);
        let near: f64 = model.projections[..6].iter().sum::<f64>() / 6.0;
        let far: f64 = model.projections[6..].iter().sum::<f64>() / 7.0;
        assert!(far > near);
        assert!(model.calibration.slope);
        assert_eq!(model.explained_variance_ratio, vec![1.0]);
    }

    #[test]
    fn projections_are_centered_on_weighted_mean() {
        let d = grid();
        let rising: Vec<f64> = d.iter().map(|x| x * 2.0 + if x.fract() == 0.0 { 0.1 } else { 0.0 }).collect();
        let matrix = Matrix::from_columns(&[&rising], d.len()).expect("matrix");
        let model = LdaMetaModel::fit(&matrix, &d, &MetaLearnerConfig::default()).expect("fit");
        let mean: f64 = model.projections.iter().sum::<f64>() / model.projections.len() as f64;
        assert!(mean.abs() < 1e-9, "{mean}");
    }

    #[test]
    fn constant_within_class_falls_back_to_mean_gap() {
        let d = [0.0, 1.0, 4.0, 5.0];
        let step = [0.0, 0.0, 1.0, 1.0];
        let matrix = Matrix::from_columns(&[&step], 4).expect("matrix");
        let model = LdaMetaModel::fit(&matrix, &d, &MetaLearnerConfig::default()).expect("fit");
        assert!((model.direction[0] - 1.0).abs() < 1e-12);
        assert!(model.projections[3] > model.projections[0]);
    }

    #[test]
    fn identical_class_means_are_rejected() {
        let d = [0.0, 1.0, 4.0, 5.0];
        let same = [1.0, 3.0, 3.0, 1.0];
        let matrix = Matrix::from_columns(&[&same], 4).expect("matrix");
        let err = LdaMetaModel::fit(&matrix, &d, &MetaLearnerConfig::default())
            .expect_err("no gap");
        assert_eq!(err.code(), "numerical_issue");
    }

    #[test]
    fn single_class_target_is_rejected() {
        let d = [0.0, 0.5, 1.0];
        let matrix = Matrix::from_columns(&[&[1.0, 2.0, 3.0]], 3).expect("matrix");
        let err =
            LdaMetaModel::fit(&matrix, &d, &MetaLearnerConfig::default()).expect_err("one class");
        assert_eq!(err.code(), "numerical_issue");
    }
}
