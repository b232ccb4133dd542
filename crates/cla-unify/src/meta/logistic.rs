// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use super::{MetaLearner, Standardizer, binarize, prepare_training};
use crate::config::{MetaLearnerConfig, Method};
use crate::linalg::{Matrix, dot};
use cla_core::ClaError;
use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

const MAX_STEP_HALVINGS: usize = 30;
/// Keeps the intercept row of the Hessian invertible when every probability saturates.
const INTERCEPT_RIDGE: f64 = 1e-10;

/// L2-penalized logistic regression of `d >= cutoff`.
///
/// Scores are probabilities of the "far" class. Fitting runs damped Newton
/// iterations on standardized columns; the penalty `1 / C` applies to the
/// standardized weights but not the intercept. This differs from liblinear,
/// which penalizes the intercept together with the raw-scale weights, so
/// coefficients here are not interchangeable with a liblinear fit at equal `C`.
#[derive(Clone, Debug, PartialEq)]
pub struct LogisticMetaModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub cutoff: f64,
    pub training_accuracy: f64,
    pub iterations: usize,
    pub converged: bool,
}

pub(crate) fn sigmoid(eta: f64) -> f64 {
    if eta >= 0.0 {
        1.0 / (1.0 + (-eta).exp())
    } else {
        let e = eta.exp();
        e / (1.0 + e)
    }
}

/// `log(1 + exp(eta))` without overflow.
fn softplus(eta: f64) -> f64 {
    if eta > 0.0 {
        eta + (-eta).exp().ln_1p()
    } else {
        eta.exp().ln_1p()
    }
}

struct Objective<'a> {
    z: &'a Matrix,
    target: &'a [bool],
    lambda: f64,
}

impl Objective<'_> {
    fn linear_predictor(&self, beta: &[f64], row: &[f64]) -> f64 {
        beta[0] + dot(&beta[1..], row)
    }

    fn value(&self, beta: &[f64]) -> f64 {
        let loss: f64 = self
            .z
            .row_iter()
            .zip(self.target)
            .map(|(row, &t)| {
                let eta = self.linear_predictor(beta, row);
                softplus(eta) - if t { eta } else { 0.0 }
            })
            .sum();
        let penalty: f64 = beta[1..].iter().map(|w| w * w).sum();
        loss + 0.5 * self.lambda * penalty
    }

    /// Gradient and Hessian over `[intercept, weights...]`.
    fn derivatives(&self, beta: &[f64]) -> (DVector<f64>, DMatrix<f64>) {
        let k = beta.len();
        let mut gradient = DVector::zeros(k);
        let mut hessian = DMatrix::zeros(k, k);
        let mut augmented = DVector::from_element(k, 1.0);
        for (row, &t) in self.z.row_iter().zip(self.target) {
            augmented.rows_mut(1, k - 1).copy_from_slice(row);
            let mu = sigmoid(self.linear_predictor(beta, row));
            let residual = mu - if t { 1.0 } else { 0.0 };
            gradient.axpy(residual, &augmented, 1.0);
            hessian.ger(mu * (1.0 - mu), &augmented, &augmented, 1.0);
        }
        for a in 1..k {
            gradient[a] += self.lambda * beta[a];
            hessian[(a, a)] += self.lambda;
        }
        hessian[(0, 0)] += INTERCEPT_RIDGE;
        (gradient, hessian)
    }
}

/// Newton direction `H^-1 g`; Cholesky first, LU when rounding breaks definiteness.
fn newton_step(gradient: &DVector<f64>, hessian: DMatrix<f64>) -> Option<DVector<f64>> {
    match hessian.clone().cholesky() {
        Some(cholesky) => Some(cholesky.solve(gradient)),
        None => hessian.lu().solve(gradient),
    }
}

impl MetaLearner for LogisticMetaModel {
    const METHOD: Method = Method::Logistic;

    fn fit(matrix: &Matrix, d: &[f64], config: &MetaLearnerConfig) -> Result<Self, ClaError> {
        let x = prepare_training(matrix, d)?;
        let target = binarize(d, config.logistic_cutoff, "logistic meta-learner")?;
        let standardizer = Standardizer::fit(&x);
        let z = standardizer.transform(&x);
        let objective = Objective {
            z: &z,
            target: &target,
            lambda: 1.0 / config.logistic_c,
        };

        let mut beta = vec![0.0; z.cols() + 1];
        let mut current = objective.value(&beta);
        let mut converged = false;
        let mut iterations = 0;
        while iterations < config.logistic_max_iter {
            iterations += 1;
            let (gradient, hessian) = objective.derivatives(&beta);
            let step = newton_step(&gradient, hessian).ok_or_else(|| {
                ClaError::numerical_issue("logistic meta-learner hit a singular Hessian")
            })?;

            let mut scale = 1.0;
            let mut candidate = beta.clone();
            let mut accepted = false;
            for _ in 0..MAX_STEP_HALVINGS {
                for ((c, b), s) in candidate.iter_mut().zip(&beta).zip(&step) {
                    *c = b - scale * s;
                }
                let value = objective.value(&candidate);
                if value <= current {
                    current = value;
                    accepted = true;
                    break;
                }
                scale *= 0.5;
            }
            if !accepted {
                converged = true;
                break;
            }
            let moved = step
                .iter()
                .map(|s| (scale * s).abs())
                .fold(0.0_f64, f64::max);
            beta = candidate;
            if moved < config.logistic_tol {
                converged = true;
                break;
            }
        }
        if !converged {
            warn!(
                iterations,
                max_iter = config.logistic_max_iter,
                "logistic meta-learner did not converge"
            );
        }
        if beta.iter().any(|b| !b.is_finite()) {
            return Err(ClaError::numerical_issue(
                "logistic meta-learner produced non-finite coefficients",
            ));
        }

        let (coefficients, intercept) = standardizer.unscale(&beta[1..], beta[0]);
        let correct = z
            .row_iter()
            .zip(&target)
            .filter(|(row, t)| (sigmoid(objective.linear_predictor(&beta, row)) > 0.5) == **t)
            .count();
        let training_accuracy = correct as f64 / target.len() as f64;
        debug!(iterations, converged, training_accuracy, "logistic meta-learner fitted");

        Ok(Self {
            coefficients,
            intercept,
            cutoff: config.logistic_cutoff,
            training_accuracy,
            iterations,
            converged,
        })
    }

    fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    fn raw_score(&self, x: &[f64]) -> f64 {
        sigmoid(self.intercept + dot(&self.coefficients, x))
    }
}
