// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use super::{MetaLearner, prepare_training};
use crate::config::{MetaLearnerConfig, Method};
use crate::linalg::{Matrix, dot, lstsq};
use cla_core::ClaError;
use nalgebra::DVector;

const PINV_REL_TOL: f64 = 1e-12;

/// Ordinary least squares of `d` on the metric vector.
///
/// Solved on centered raw columns; when the system is rank deficient (more
/// metrics than grid points, or collinear metrics) the minimum-norm solution
/// is taken.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearMetaModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    /// In-sample coefficient of determination.
    pub r_squared: f64,
}

impl MetaLearner for LinearMetaModel {
    const METHOD: Method = Method::Linear;

    fn fit(matrix: &Matrix, d: &[f64], _config: &MetaLearnerConfig) -> Result<Self, ClaError> {
        let x = prepare_training(matrix, d)?;
        let means = x.column_means();
        let d_mean = d.iter().sum::<f64>() / d.len() as f64;
        let mut centered = x.to_dmatrix();
        for (mut column, mean) in centered.column_iter_mut().zip(&means) {
            column.add_scalar_mut(-mean);
        }
        let target = DVector::from_iterator(d.len(), d.iter().map(|v| v - d_mean));
        let weights = lstsq(centered, &target, PINV_REL_TOL)?;
        let coefficients: Vec<f64> = weights.iter().copied().collect();
        let intercept = d_mean - dot(&coefficients, &means);
        if coefficients.iter().any(|c| !c.is_finite()) || !intercept.is_finite() {
            return Err(ClaError::numerical_issue(
                "linear meta-learner produced non-finite coefficients",
            ));
        }

        let mut model = Self {
            coefficients,
            intercept,
            r_squared: f64::NAN,
        };
        let ss_tot: f64 = d.iter().map(|v| (v - d_mean) * (v - d_mean)).sum();
        let ss_res: f64 = x
            .row_iter()
            .zip(d)
            .map(|(row, &target)| {
                let residual = target - model.raw_score(row);
                residual * residual
            })
            .sum();
        if ss_tot > 0.0 {
            model.r_squared = 1.0 - ss_res / ss_tot;
        }
        Ok(model)
    }

    fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    fn raw_score(&self, x: &[f64]) -> f64 {
        self.intercept + dot(&self.coefficients, x)
    }
}
