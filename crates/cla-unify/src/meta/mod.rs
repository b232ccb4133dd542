// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! The four interchangeable meta-learners.
//!
//! Every learner fits on a metric matrix (rows are grid points, columns are
//! selected metrics) against the distance grid, after the same sanitization
//! of the matrix: NaN becomes 0, +inf becomes 1 and -inf becomes -1.
//! Decomposition learners additionally carry a [`ScaleCalibration`].

mod lda;
mod linear;
mod logistic;
mod pca;

pub use lda::LdaMetaModel;
pub use linear::LinearMetaModel;
pub use logistic::LogisticMetaModel;
pub use pca::PcaMetaModel;

use crate::calibrate::ScaleCalibration;
use crate::config::{MetaLearnerConfig, Method};
use crate::linalg::Matrix;
use cla_core::ClaError;

/// Contract shared by every meta-learner.
pub trait MetaLearner: Sized {
    const METHOD: Method;

    /// Fits on a sanitized copy of `matrix` against target distances `d`.
    fn fit(matrix: &Matrix, d: &[f64], config: &MetaLearnerConfig) -> Result<Self, ClaError>;

    /// Width of the metric vectors this model accepts.
    fn n_features(&self) -> usize;

    /// Uncalibrated score of a metric vector of width [`Self::n_features`].
    fn raw_score(&self, x: &[f64]) -> f64;

    fn calibration(&self) -> Option<&ScaleCalibration> {
        None
    }
}

/// Replacement applied to training matrix entries.
pub fn sanitize_training_value(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else if value == f64::INFINITY {
        1.0
    } else if value == f64::NEG_INFINITY {
        -1.0
    } else {
        value
    }
}

pub fn sanitize_training_matrix(matrix: &Matrix) -> Matrix {
    let mut out = matrix.clone();
    out.map_in_place(sanitize_training_value);
    out
}

/// Checks shapes, then returns the sanitized training matrix.
pub(crate) fn prepare_training(matrix: &Matrix, d: &[f64]) -> Result<Matrix, ClaError> {
    if matrix.rows() != d.len() {
        return Err(ClaError::invalid_input(format!(
            "training matrix has {} rows but target has {} values",
            matrix.rows(),
            d.len()
        )));
    }
    if matrix.rows() == 0 {
        return Err(ClaError::invalid_input("training needs at least one grid point"));
    }
    if matrix.cols() == 0 {
        return Err(ClaError::numerical_issue(
            "no atom metrics selected; cannot train a meta-learner",
        ));
    }
    if let Some(bad) = d.iter().find(|v| !v.is_finite()) {
        return Err(ClaError::invalid_input(format!(
            "training target must be finite; got {bad}"
        )));
    }
    Ok(sanitize_training_matrix(matrix))
}

/// Index of the largest target; the last one wins on ties.
pub(crate) fn far_index(d: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in d.iter().enumerate() {
        if *v >= d[best] {
            best = i;
        }
    }
    best
}

/// `d >= cutoff`, failing when either side is empty.
pub(crate) fn binarize(d: &[f64], cutoff: f64, learner: &str) -> Result<Vec<bool>, ClaError> {
    let target: Vec<bool> = d.iter().map(|&v| v >= cutoff).collect();
    let positives = target.iter().filter(|&&t| t).count();
    if positives == 0 || positives == target.len() {
        return Err(ClaError::numerical_issue(format!(
            "{learner} needs both classes after binarizing at cutoff={cutoff}; got {positives} of {} positive",
            target.len()
        )));
    }
    Ok(target)
}

/// Column centering and unit-variance scaling; constant columns keep scale 1.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Standardizer {
    pub(crate) means: Vec<f64>,
    pub(crate) scales: Vec<f64>,
}

impl Standardizer {
    pub(crate) fn fit(matrix: &Matrix) -> Self {
        let means = matrix.column_means();
        let mut scales = vec![0.0; matrix.cols()];
        for row in matrix.row_iter() {
            for ((acc, &x), &m) in scales.iter_mut().zip(row).zip(&means) {
                *acc += (x - m) * (x - m);
            }
        }
        let n = matrix.rows().max(1) as f64;
        for scale in scales.iter_mut() {
            let sd = (*scale / n).sqrt();
            *scale = if sd > 0.0 && sd.is_finite() { sd } else { 1.0 };
        }
        Self { means, scales }
    }

    pub(crate) fn transform(&self, matrix: &Matrix) -> Matrix {
        let mut out = matrix.clone();
        let cols = matrix.cols();
        for i in 0..matrix.rows() {
            for j in 0..cols {
                out.set(i, j, (matrix.get(i, j) - self.means[j]) / self.scales[j]);
            }
        }
        out
    }

    /// Maps weights fitted on standardized columns back to raw columns.
    pub(crate) fn unscale(&self, weights: &[f64], intercept: f64) -> (Vec<f64>, f64) {
        let raw: Vec<f64> = weights
            .iter()
            .zip(&self.scales)
            .map(|(w, s)| w / s)
            .collect();
        let shift: f64 = raw.iter().zip(&self.means).map(|(w, m)| w * m).sum();
        (raw, intercept - shift)
    }
}

/// A trained meta-model of one of the four strategies.
#[derive(Clone, Debug, PartialEq)]
pub enum MetaModel {
    Linear(LinearMetaModel),
    Logistic(LogisticMetaModel),
    Pca(PcaMetaModel),
    Lda(LdaMetaModel),
}

impl MetaModel {
    /// Fits the strategy selected by `method`.
    pub fn train(
        method: Method,
        matrix: &Matrix,
        d: &[f64],
        config: &MetaLearnerConfig,
    ) -> Result<Self, ClaError> {
        config.validate()?;
        Ok(match method {
            Method::Linear => Self::Linear(LinearMetaModel::fit(matrix, d, config)?),
            Method::Logistic => Self::Logistic(LogisticMetaModel::fit(matrix, d, config)?),
            Method::Pca => Self::Pca(PcaMetaModel::fit(matrix, d, config)?),
            Method::Lda => Self::Lda(LdaMetaModel::fit(matrix, d, config)?),
        })
    }

    pub fn method(&self) -> Method {
        match self {
            Self::Linear(_) => LinearMetaModel::METHOD,
            Self::Logistic(_) => LogisticMetaModel::METHOD,
            Self::Pca(_) => PcaMetaModel::METHOD,
            Self::Lda(_) => LdaMetaModel::METHOD,
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            Self::Linear(model) => model.n_features(),
            Self::Logistic(model) => model.n_features(),
            Self::Pca(model) => model.n_features(),
            Self::Lda(model) => model.n_features(),
        }
    }

    /// Uncalibrated score of a metric vector.
    pub fn score(&self, x: &[f64]) -> Result<f64, ClaError> {
        if x.len() != self.n_features() {
            return Err(ClaError::invalid_input(format!(
                "metric vector has {} values, model expects {}",
                x.len(),
                self.n_features()
            )));
        }
        Ok(match self {
            Self::Linear(model) => model.raw_score(x),
            Self::Logistic(model) => model.raw_score(x),
            Self::Pca(model) => model.raw_score(x),
            Self::Lda(model) => model.raw_score(x),
        })
    }

    /// Present only for decomposition strategies.
    pub fn calibration(&self) -> Option<&ScaleCalibration> {
        match self {
            Self::Linear(model) => model.calibration(),
            Self::Logistic(model) => model.calibration(),
            Self::Pca(model) => model.calibration(),
            Self::Lda(model) => model.calibration(),
        }
    }

    /// Applies the calibration when present; other strategies pass through.
    pub fn calibrate(&self, raw: f64) -> f64 {
        self.calibration().map_or(raw, |calibration| calibration.apply(raw))
    }

    /// Score followed by calibration.
    pub fn unified_score(&self, x: &[f64]) -> Result<f64, ClaError> {
        self.score(x).map(|raw| self.calibrate(raw))
    }

    /// In-sample fit quality: R² for linear, accuracy for logistic.
    pub fn training_score(&self) -> Option<f64> {
        match self {
            Self::Linear(model) => Some(model.r_squared),
            Self::Logistic(model) => Some(model.training_accuracy),
            Self::Pca(_) | Self::Lda(_) => None,
        }
    }

    pub fn explained_variance_ratio(&self) -> Option<&[f64]> {
        match self {
            Self::Pca(model) => Some(&model.explained_variance_ratio),
            Self::Lda(model) => Some(&model.explained_variance_ratio),
            Self::Linear(_) | Self::Logistic(_) => None,
        }
    }

    /// Training-row projections for decomposition strategies.
    pub fn projections(&self) -> Option<&[f64]> {
        match self {
            Self::Pca(model) => Some(&model.projections),
            Self::Lda(model) => Some(&model.projections),
            Self::Linear(_) | Self::Logistic(_) => None,
        }
    }
}
