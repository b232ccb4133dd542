// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use cla_core::{ClaError, Dataset};
use rand::Rng;

const VAR_SMOOTHING: f64 = 1e-9;
const LOG_LOSS_EPS: f64 = 1e-15;

/// Two-class Gaussian naive Bayes with equal class priors.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct GaussianNb {
    pub(crate) means: [Vec<f64>; 2],
    pub(crate) variances: [Vec<f64>; 2],
}

impl GaussianNb {
    /// Fits per-class means and smoothed population variances.
    ///
    /// `columns[c][j]` holds feature `j` of class `c`.
    pub(crate) fn fit(columns: [&[Vec<f64>]; 2], overall: &Dataset) -> Result<Self, ClaError> {
        let max_var = overall
            .column_stds()
            .into_iter()
            .map(|s| s * s)
            .fold(0.0, f64::max);
        let epsilon = VAR_SMOOTHING * max_var;
        if epsilon <= 0.0 {
            return Err(ClaError::numerical_issue(
                "naive bayes needs at least one non-constant feature",
            ));
        }

        let mut means: [Vec<f64>; 2] = [Vec::new(), Vec::new()];
        let mut variances: [Vec<f64>; 2] = [Vec::new(), Vec::new()];
        for class in 0..2 {
            for feature in columns[class] {
                if feature.is_empty() {
                    return Err(ClaError::invalid_input("naive bayes needs non-empty classes"));
                }
                let n = feature.len() as f64;
                let m = feature.iter().sum::<f64>() / n;
                let v = feature.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / n;
                means[class].push(m);
                variances[class].push(v + epsilon);
            }
        }
        Ok(Self { means, variances })
    }

    fn log_likelihood(&self, class: usize, row: &[f64]) -> f64 {
        row.iter()
            .zip(&self.means[class])
            .zip(&self.variances[class])
            .map(|((&x, &m), &v)| {
                -0.5 * (2.0 * std::f64::consts::PI * v).ln() - (x - m) * (x - m) / (2.0 * v)
            })
            .sum()
    }

    /// Posterior probability of the second class.
    pub(crate) fn posterior(&self, row: &[f64]) -> f64 {
        let delta = self.log_likelihood(0, row) - self.log_likelihood(1, row);
        if delta >= 0.0 {
            let e = (-delta).exp();
            e / (1.0 + e)
        } else {
            1.0 / (1.0 + delta.exp())
        }
    }
}

/// Resubstitution classification metrics; the second class is positive.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ClassificationReport {
    pub(crate) accuracy: f64,
    pub(crate) kappa: f64,
    pub(crate) f1: f64,
    pub(crate) jaccard: f64,
    pub(crate) precision: f64,
    pub(crate) recall: f64,
    pub(crate) brier: f64,
    pub(crate) cross_entropy: f64,
    /// Mean KL divergence of one-hot truth from the predicted distribution; unclipped.
    pub(crate) mean_kld: f64,
    pub(crate) roc_auc: f64,
    pub(crate) average_precision: f64,
    pub(crate) pr_auc: f64,
}

fn ratio_or_zero(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

pub(crate) fn classification_report(
    truth: &[bool],
    probabilities: &[f64],
) -> ClassificationReport {
    let n = truth.len() as f64;
    let (mut tp, mut fp, mut tn, mut fneg) = (0.0, 0.0, 0.0, 0.0);
    let mut brier = 0.0;
    let mut cross_entropy = 0.0;
    let mut kld = 0.0;
    for (&actual, &prob) in truth.iter().zip(probabilities) {
        match (actual, prob > 0.5) {
            (true, true) => tp += 1.0,
            (false, true) => fp += 1.0,
            (false, false) => tn += 1.0,
            (true, false) => fneg += 1.0,
        }
        let target = if actual { 1.0 } else { 0.0 };
        brier += (prob - target) * (prob - target);
        let clipped = prob.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS);
        cross_entropy -= if actual {
            clipped.ln()
        } else {
            (1.0 - clipped).ln()
        };
        let assigned = if actual { prob } else { 1.0 - prob };
        kld -= assigned.ln();
    }

    let accuracy = (tp + tn) / n;
    let expected = ((tp + fp) * (tp + fneg) + (tn + fneg) * (tn + fp)) / (n * n);
    let kappa = if (1.0 - expected).abs() < f64::EPSILON {
        if accuracy >= 1.0 {
            1.0
        } else {
            0.0
        }
    } else {
        (accuracy - expected) / (1.0 - expected)
    };
    let precision = ratio_or_zero(tp, tp + fp);
    let recall = ratio_or_zero(tp, tp + fneg);
    let curve = precision_recall_curve(truth, probabilities);

    ClassificationReport {
        accuracy,
        kappa,
        f1: ratio_or_zero(2.0 * tp, 2.0 * tp + fp + fneg),
        jaccard: ratio_or_zero(tp, tp + fp + fneg),
        precision,
        recall,
        brier: brier / n,
        cross_entropy: cross_entropy / n,
        mean_kld: kld / n,
        roc_auc: roc_auc(truth, probabilities),
        average_precision: average_precision(&curve),
        pr_auc: pr_auc(&curve),
    }
}

/// `(recall, precision)` at each distinct score, from the highest threshold down.
fn precision_recall_curve(truth: &[bool], scores: &[f64]) -> Vec<(f64, f64)> {
    let positives = truth.iter().filter(|&&t| t).count() as f64;
    if positives == 0.0 {
        return Vec::new();
    }
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut curve = Vec::new();
    let (mut tp, mut fp) = (0.0, 0.0);
    for (pos, &idx) in order.iter().enumerate() {
        if truth[idx] {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        let last_of_tie = order
            .get(pos + 1)
            .map_or(true, |&next| scores[next] != scores[idx]);
        if last_of_tie {
            curve.push((tp / positives, tp / (tp + fp)));
        }
    }
    curve
}

/// Step-wise area: precision weighted by each recall increment.
fn average_precision(curve: &[(f64, f64)]) -> f64 {
    if curve.is_empty() {
        return f64::NAN;
    }
    let mut previous = 0.0;
    let mut area = 0.0;
    for &(recall, precision) in curve {
        area += (recall - previous) * precision;
        previous = recall;
    }
    area
}

/// Trapezoidal area under the precision-recall curve, anchored at `(0, 1)`.
fn pr_auc(curve: &[(f64, f64)]) -> f64 {
    if curve.is_empty() {
        return f64::NAN;
    }
    let mut previous = (0.0, 1.0);
    let mut area = 0.0;
    for &point in curve {
        area += (point.0 - previous.0) * (point.1 + previous.1) / 2.0;
        previous = point;
    }
    area
}

/// Rank-based ROC AUC; NaN when one side is empty.
fn roc_auc(truth: &[bool], scores: &[f64]) -> f64 {
    let positives = truth.iter().filter(|&&t| t).count();
    let negatives = truth.len() - positives;
    if positives == 0 || negatives == 0 {
        return f64::NAN;
    }
    let (ranks, _) = crate::stats::average_ranks(scores);
    let rank_sum: f64 = ranks
        .iter()
        .zip(truth)
        .filter_map(|(&r, &t)| t.then_some(r))
        .sum();
    let (np, nn) = (positives as f64, negatives as f64);
    (rank_sum - np * (np + 1.0) / 2.0) / (np * nn)
}

/// Bayes error rate estimated from uniform draws over the `n_sigma` box of both classes.
pub(crate) fn bayes_error_rate<R: Rng + ?Sized>(
    model: &GaussianNb,
    columns: [&[Vec<f64>]; 2],
    samples: usize,
    n_sigma: f64,
    rng: &mut R,
) -> Result<f64, ClaError> {
    if samples == 0 {
        return Err(ClaError::invalid_config("BER sample count must be >= 1"));
    }
    let p = columns[0].len();
    let mut lower = Vec::with_capacity(p);
    let mut upper = Vec::with_capacity(p);
    for j in 0..p {
        let (a, b) = (&columns[0][j], &columns[1][j]);
        if a.len() < 2 || b.len() < 2 {
            return Err(ClaError::invalid_input("BER needs >= 2 samples per class"));
        }
        let (ma, mb) = (crate::stats::mean(a), crate::stats::mean(b));
        let (sa, sb) = (
            crate::stats::sample_variance(a).sqrt(),
            crate::stats::sample_variance(b).sqrt(),
        );
        lower.push((ma - n_sigma * sa).min(mb - n_sigma * sb));
        upper.push((ma + n_sigma * sa).max(mb + n_sigma * sb));
    }

    let mut point = vec![0.0; p];
    let mut max_prob_sum = 0.0;
    for _ in 0..samples {
        for ((x, &lo), &hi) in point.iter_mut().zip(&lower).zip(&upper) {
            *x = lo + (hi - lo) * rng.gen::<f64>();
        }
        let p1 = model.posterior(&point);
        max_prob_sum += p1.max(1.0 - p1);
    }
    Ok(1.0 - max_prob_sum / samples as f64)
}
