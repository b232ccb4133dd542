// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Per-feature two-sample statistics. Distribution tails come from `statrs`.

use cla_core::ClaError;
use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, Normal, StudentsT};
use statrs::function::gamma::digamma;

/// Neighbors used by the nearest-neighbor mutual information estimate.
const MI_NEIGHBORS: usize = 3;

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Unbiased sample variance (divisor `n - 1`); NaN below two samples.
pub(crate) fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    ss / (values.len() - 1) as f64
}

/// Maximum that propagates NaN.
pub(crate) fn nan_max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, |acc, v| {
        if acc.is_nan() || v.is_nan() {
            f64::NAN
        } else {
            acc.max(v)
        }
    })
}

/// Minimum that propagates NaN.
pub(crate) fn nan_min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, |acc, v| {
        if acc.is_nan() || v.is_nan() {
            f64::NAN
        } else {
            acc.min(v)
        }
    })
}

pub(crate) fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    }
}

/// 1-based average ranks plus the tie term `sum(t^3 - t)` over tie groups.
pub(crate) fn average_ranks(values: &[f64]) -> (Vec<f64>, f64) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut tie_term = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        let rank = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        let t = (end - start) as f64;
        tie_term += t * t * t - t;
        start = end;
    }
    (ranks, tie_term)
}

fn students_t_two_sided(t: f64, dof: f64) -> Result<f64, ClaError> {
    let dist = StudentsT::new(0.0, 1.0, dof)
        .map_err(|err| ClaError::numerical_issue(format!("student t setup failed: {err}")))?;
    Ok((2.0 * dist.sf(t.abs())).min(1.0))
}

/// Upper tail of a chi-square law; NaN stays NaN and `+inf` maps to 0.
pub(crate) fn chi_square_sf(statistic: f64, dof: f64) -> Result<f64, ClaError> {
    if statistic.is_nan() {
        return Ok(f64::NAN);
    }
    if statistic == f64::INFINITY {
        return Ok(0.0);
    }
    let dist = ChiSquared::new(dof)
        .map_err(|err| ClaError::numerical_issue(format!("chi-square setup failed: {err}")))?;
    Ok(dist.sf(statistic.max(0.0)))
}

fn standard_normal() -> Result<Normal, ClaError> {
    Normal::new(0.0, 1.0)
        .map_err(|err| ClaError::numerical_issue(format!("normal setup failed: {err}")))
}

/// Pearson correlation with a two-sided t-test p-value.
///
/// A constant input yields `(NaN, NaN)`; fewer than three pairs yields a NaN p-value.
pub(crate) fn pearson(x: &[f64], y: &[f64]) -> Result<(f64, f64), ClaError> {
    if x.len() != y.len() {
        return Err(ClaError::invalid_input(format!(
            "pearson length mismatch: {} vs {}",
            x.len(),
            y.len()
        )));
    }
    let n = x.len();
    let (mx, my) = (mean(x), mean(y));
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (&a, &b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx) * (a - mx);
        syy += (b - my) * (b - my);
    }
    let denom = (sxx * syy).sqrt();
    if n < 2 || denom == 0.0 || !denom.is_finite() {
        return Ok((f64::NAN, f64::NAN));
    }
    let r = (sxy / denom).clamp(-1.0, 1.0);
    if n < 3 {
        return Ok((r, f64::NAN));
    }
    if r.abs() >= 1.0 {
        return Ok((r, 0.0));
    }
    let dof = (n - 2) as f64;
    let t = r * (dof / (1.0 - r * r)).sqrt();
    Ok((r, students_t_two_sided(t, dof)?))
}

/// Spearman rank correlation with average ranks for ties, returning `(rho, p)`.
///
/// The p-value uses the same t approximation as Pearson.
pub fn spearman(x: &[f64], y: &[f64]) -> Result<(f64, f64), ClaError> {
    let (rx, _) = average_ranks(x);
    let (ry, _) = average_ranks(y);
    pearson(&rx, &ry)
}

/// Absolute Cohen's d per feature using the pooled standard deviation.
///
/// Zero pooled deviations are replaced by the median of the positive ones.
pub(crate) fn cohen_d(first: &[Vec<f64>], second: &[Vec<f64>]) -> Result<Vec<f64>, ClaError> {
    let mut pooled = Vec::with_capacity(first.len());
    let mut diffs = Vec::with_capacity(first.len());
    for (a, b) in first.iter().zip(second) {
        let (n1, n2) = (a.len(), b.len());
        if n1 < 2 || n2 < 2 {
            return Err(ClaError::invalid_input(format!(
                "cohen_d needs >= 2 samples per class, got {n1} and {n2}"
            )));
        }
        let dof = (n1 + n2 - 2) as f64;
        let var = ((n1 - 1) as f64 * sample_variance(a) + (n2 - 1) as f64 * sample_variance(b))
            / dof;
        pooled.push(var.sqrt());
        diffs.push((mean(a) - mean(b)).abs());
    }

    let positive: Vec<f64> = pooled.iter().copied().filter(|&s| s > 0.0).collect();
    let fallback = median(&positive);
    Ok(diffs
        .into_iter()
        .zip(pooled)
        .map(|(diff, s)| diff / if s == 0.0 { fallback } else { s })
        .collect())
}

/// Two-group one-way ANOVA, returning `(F, p)`.
pub(crate) fn anova_two(a: &[f64], b: &[f64]) -> Result<(f64, f64), ClaError> {
    let n = a.len() + b.len();
    if a.is_empty() || b.is_empty() || n < 3 {
        return Err(ClaError::invalid_input(format!(
            "anova needs non-empty groups and n >= 3, got {} and {}",
            a.len(),
            b.len()
        )));
    }
    let (ma, mb) = (mean(a), mean(b));
    let grand = (a.iter().sum::<f64>() + b.iter().sum::<f64>()) / n as f64;
    let ss_between =
        a.len() as f64 * (ma - grand).powi(2) + b.len() as f64 * (mb - grand).powi(2);
    let ss_within: f64 = a.iter().map(|v| (v - ma).powi(2)).sum::<f64>()
        + b.iter().map(|v| (v - mb).powi(2)).sum::<f64>();
    let df_within = (n - 2) as f64;

    if ss_within == 0.0 {
        return Ok(if ss_between > 0.0 {
            (f64::INFINITY, 0.0)
        } else {
            (f64::NAN, f64::NAN)
        });
    }
    let f = ss_between / (ss_within / df_within);
    let dist = FisherSnedecor::new(1.0, df_within)
        .map_err(|err| ClaError::numerical_issue(format!("F distribution setup failed: {err}")))?;
    Ok((f, dist.sf(f)))
}

/// Mann-Whitney U, returning `(min(U1, U2), two-sided p)`.
///
/// Uses the normal approximation with tie and continuity corrections.
/// Identical pooled samples give `U = n1*n2/2` and `p = 1`.
pub(crate) fn mann_whitney(a: &[f64], b: &[f64]) -> Result<(f64, f64), ClaError> {
    let (n1, n2) = (a.len(), b.len());
    if n1 == 0 || n2 == 0 {
        return Err(ClaError::invalid_input("mann-whitney needs non-empty groups"));
    }
    let (n1f, n2f) = (n1 as f64, n2 as f64);
    let first = a[0];
    if a.iter().chain(b).all(|&v| v == first) {
        return Ok((n1f * n2f / 2.0, 1.0));
    }

    let pooled: Vec<f64> = a.iter().chain(b).copied().collect();
    let (ranks, tie_term) = average_ranks(&pooled);
    let r1: f64 = ranks[..n1].iter().sum();
    let u1 = r1 - n1f * (n1f + 1.0) / 2.0;
    let u2 = n1f * n2f - u1;

    let n = n1f + n2f;
    let mu = n1f * n2f / 2.0;
    let sigma = (n1f * n2f / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)))).sqrt();
    if sigma == 0.0 || !sigma.is_finite() {
        return Ok((u1.min(u2), 1.0));
    }
    let z = ((u1 - mu).abs() - 0.5).max(0.0) / sigma;
    let p = (2.0 * standard_normal()?.sf(z)).min(1.0);
    Ok((u1.min(u2), p))
}

/// Survival function of the Kolmogorov distribution.
fn kolmogorov_sf(lambda: f64) -> f64 {
    if lambda < 1e-3 {
        return 1.0;
    }
    let mut sum = 0.0;
    let mut sign = 1.0;
    for k in 1..=100 {
        let kf = k as f64;
        let term = (-2.0 * kf * kf * lambda * lambda).exp();
        sum += sign * term;
        if term < 1e-12 {
            break;
        }
        sign = -sign;
    }
    (2.0 * sum).clamp(0.0, 1.0)
}

/// Two-sample Kolmogorov-Smirnov, returning `(D, asymptotic p)`.
pub(crate) fn ks_two_sample(a: &[f64], b: &[f64]) -> Result<(f64, f64), ClaError> {
    let (n1, n2) = (a.len(), b.len());
    if n1 == 0 || n2 == 0 {
        return Err(ClaError::invalid_input("ks test needs non-empty groups"));
    }
    let mut xs = a.to_vec();
    let mut ys = b.to_vec();
    xs.sort_by(f64::total_cmp);
    ys.sort_by(f64::total_cmp);

    let (n1f, n2f) = (n1 as f64, n2 as f64);
    let (mut i, mut j) = (0, 0);
    let mut d: f64 = 0.0;
    while i < n1 && j < n2 {
        let x = xs[i].min(ys[j]);
        while i < n1 && xs[i] <= x {
            i += 1;
        }
        while j < n2 && ys[j] <= x {
            j += 1;
        }
        d = d.max((i as f64 / n1f - j as f64 / n2f).abs());
    }

    let en = (n1f * n2f / (n1f + n2f)).sqrt();
    let p = kolmogorov_sf((en + 0.12 + 0.11 / en) * d);
    Ok((d, p))
}

/// Chi-square statistic of a min-max scaled feature against the class label,
/// returning `(chi2, p)` with one degree of freedom.
///
/// Scaling spans both classes; a constant feature scales to zero and yields NaN.
pub(crate) fn chi_square(a: &[f64], b: &[f64]) -> Result<(f64, f64), ClaError> {
    let n = a.len() + b.len();
    if a.is_empty() || b.is_empty() {
        return Err(ClaError::invalid_input("chi-square needs non-empty groups"));
    }
    let lo = a.iter().chain(b).copied().fold(f64::INFINITY, f64::min);
    let hi = a.iter().chain(b).copied().fold(f64::NEG_INFINITY, f64::max);
    let range = if hi > lo { hi - lo } else { 1.0 };
    let scaled_sum = |group: &[f64]| group.iter().map(|v| (v - lo) / range).sum::<f64>();

    let observed = [scaled_sum(a), scaled_sum(b)];
    let total = observed[0] + observed[1];
    let shares = [a.len() as f64 / n as f64, b.len() as f64 / n as f64];
    if total == 0.0 {
        return Ok((f64::NAN, f64::NAN));
    }
    let statistic: f64 = observed
        .iter()
        .zip(shares)
        .map(|(&obs, share)| {
            let expected = share * total;
            (obs - expected) * (obs - expected) / expected
        })
        .sum();
    Ok((statistic, chi_square_sf(statistic, 1.0)?))
}

fn below(value: f64) -> f64 {
    if value > 0.0 {
        f64::from_bits(value.to_bits() - 1)
    } else {
        0.0
    }
}

/// Mutual information in nats between one continuous feature and the class,
/// by the k-nearest-neighbor estimator for mixed discrete/continuous pairs.
///
/// Each point looks `k = min(3, class_size - 1)` neighbors deep inside its own
/// class, then counts every point within that radius. Classes with a single
/// sample are dropped. The estimate is clamped at zero.
pub(crate) fn mutual_information(a: &[f64], b: &[f64]) -> Result<f64, ClaError> {
    // (value, k, class size, radius)
    let mut points: Vec<(f64, usize, usize, f64)> = Vec::with_capacity(a.len() + b.len());
    for group in [a, b] {
        if group.len() < 2 {
            continue;
        }
        let k = MI_NEIGHBORS.min(group.len() - 1);
        let mut distances = vec![0.0; group.len()];
        for &x in group {
            for (d, &y) in distances.iter_mut().zip(group) {
                *d = (y - x).abs();
            }
            // index 0 is the point itself
            let (_, kth, _) = distances.select_nth_unstable_by(k, f64::total_cmp);
            points.push((x, k, group.len(), below(*kth)));
        }
    }
    if points.is_empty() {
        return Err(ClaError::invalid_input(
            "mutual information needs a class with >= 2 samples",
        ));
    }

    let n = points.len() as f64;
    let (mut psi_k, mut psi_class, mut psi_m) = (0.0, 0.0, 0.0);
    for &(x, k, class_size, radius) in &points {
        let m = points
            .iter()
            .filter(|(y, ..)| (y - x).abs() <= radius)
            .count();
        psi_k += digamma(k as f64);
        psi_class += digamma(class_size as f64);
        psi_m += digamma(m as f64);
    }
    let mi = digamma(n) + (psi_k - psi_class - psi_m) / n;
    Ok(mi.max(0.0))
}

/// Summary of a two-group MANOVA.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Manova {
    pub(crate) f: f64,
    pub(crate) p: f64,
    pub(crate) wilks: f64,
    pub(crate) pillai: f64,
    pub(crate) hotelling_lawley: f64,
    pub(crate) roy: f64,
}

/// Two-group MANOVA over the first two features (or the only one).
///
/// With two groups the hypothesis matrix has rank one, so all four statistics
/// follow from Wilks' lambda and the F approximation is exact with
/// `(q, n - q - 1)` degrees of freedom. A p-value that underflows to zero is
/// reported as machine epsilon.
pub(crate) fn manova(first: &[Vec<f64>], second: &[Vec<f64>]) -> Result<Manova, ClaError> {
    let q = first.len().min(second.len()).min(2);
    if q == 0 {
        return Err(ClaError::invalid_input("MANOVA needs at least one feature"));
    }
    let (n1, n2) = (first[0].len(), second[0].len());
    let n = n1 + n2;
    if n1 == 0 || n2 == 0 || n < q + 2 {
        return Err(ClaError::invalid_input(format!(
            "MANOVA over {q} features needs non-empty groups and n >= {}, got {n1} and {n2}",
            q + 2
        )));
    }

    let grand: Vec<f64> = (0..q)
        .map(|j| (first[j].iter().sum::<f64>() + second[j].iter().sum::<f64>()) / n as f64)
        .collect();
    let mut within = [[0.0; 2]; 2];
    let mut total = [[0.0; 2]; 2];
    for group in [first, second] {
        let means: Vec<f64> = group[..q].iter().map(|column| mean(column)).collect();
        for i in 0..group[0].len() {
            for r in 0..q {
                for c in 0..q {
                    within[r][c] += (group[r][i] - means[r]) * (group[c][i] - means[c]);
                    total[r][c] += (group[r][i] - grand[r]) * (group[c][i] - grand[c]);
                }
            }
        }
    }
    let det = |m: &[[f64; 2]; 2]| {
        if q == 1 {
            m[0][0]
        } else {
            m[0][0] * m[1][1] - m[0][1] * m[1][0]
        }
    };
    let (det_within, det_total) = (det(&within), det(&total));
    if !(det_within > 0.0 && det_total > 0.0 && det_within.is_finite() && det_total.is_finite()) {
        return Err(ClaError::numerical_issue("MANOVA scatter matrix is singular"));
    }

    let wilks = det_within / det_total;
    let hotelling_lawley = (1.0 - wilks) / wilks;
    let dof = (n - q - 1) as f64;
    let f = hotelling_lawley * dof / q as f64;
    let dist = FisherSnedecor::new(q as f64, dof)
        .map_err(|err| ClaError::numerical_issue(format!("F distribution setup failed: {err}")))?;
    let mut p = dist.sf(f);
    if p == 0.0 {
        p = f64::EPSILON;
    }
    Ok(Manova {
        f,
        p,
        wilks,
        pillai: 1.0 - wilks,
        hotelling_lawley,
        roy: hotelling_lawley,
    })
}

/// McNemar's test with continuity correction on truth versus prediction,
/// returning `(chi2, p)`. No discordant pairs gives `(inf, 0)`.
pub(crate) fn mcnemar(truth: &[bool], predicted: &[bool]) -> Result<(f64, f64), ClaError> {
    let (mut false_pos, mut false_neg) = (0.0_f64, 0.0_f64);
    for (&t, &p) in truth.iter().zip(predicted) {
        match (t, p) {
            (false, true) => false_pos += 1.0,
            (true, false) => false_neg += 1.0,
            _ => {}
        }
    }
    let statistic =
        ((false_pos - false_neg).abs() - 1.0).powi(2) / (false_pos + false_neg);
    Ok((statistic, chi_square_sf(statistic, 1.0)?))
}

/// Cochran's Q over the truth and prediction columns, returning `(Q, p)`.
///
/// Success is the positive class. With no disagreement Q is `0 / 0` and NaN.
pub(crate) fn cochran_q(truth: &[bool], predicted: &[bool]) -> Result<(f64, f64), ClaError> {
    let k = 2.0;
    let columns = [
        truth.iter().filter(|&&t| t).count() as f64,
        predicted.iter().filter(|&&p| p).count() as f64,
    ];
    let (mut row_sum, mut row_sq) = (0.0, 0.0);
    for (&t, &p) in truth.iter().zip(predicted) {
        let successes = f64::from(u8::from(t) + u8::from(p));
        row_sum += successes;
        row_sq += successes * successes;
    }
    let column_sq: f64 = columns.iter().map(|c| c * c).sum();
    let statistic = (k - 1.0) * (k * column_sq - row_sum * row_sum) / (k * row_sum - row_sq);
    Ok((statistic, chi_square_sf(statistic, k - 1.0)?))
}
