// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::atom::AtomMetricTable;
use crate::linalg::Matrix;
use cla_core::ClaError;
use std::collections::BTreeMap;
use tracing::debug;

/// Metrics whose linear association with `d` passed the threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct FilteredMetricSet {
    /// R² against `d` for every metric in the source table.
    pub r2: BTreeMap<String, f64>,
    /// Selected keys in table order.
    pub keys: Vec<String>,
    /// Source table restricted to `keys`.
    pub table: AtomMetricTable,
    /// Rows are grid points, columns are `keys`.
    pub matrix: Matrix,
}

/// Pearson correlation of `x` with `y`; NaN when either side is constant or non-finite.
pub fn pearson_r(x: &[f64], y: &[f64]) -> f64 {
    let m = x.len() as f64;
    if x.len() != y.len() || x.len() < 2 {
        return f64::NAN;
    }
    let (sum_x, sum_y, sum_xx, sum_yy, sum_xy) = x.iter().zip(y).fold(
        (0.0, 0.0, 0.0, 0.0, 0.0),
        |(sx, sy, sxx, syy, sxy), (a, b)| (sx + a, sy + b, sxx + a * a, syy + b * b, sxy + a * b),
    );
    let var_x = m * sum_xx - sum_x * sum_x;
    let var_y = m * sum_yy - sum_y * sum_y;
    // Cancellation leaves a tiny residue for constant inputs.
    let degenerate = |var: f64, scale: f64| !var.is_finite() || var <= f64::EPSILON * m * scale;
    if degenerate(var_x, sum_xx) || degenerate(var_y, sum_yy) {
        return f64::NAN;
    }
    ((m * sum_xy - sum_x * sum_y) / (var_x * var_y).sqrt()).clamp(-1.0, 1.0)
}

/// Squared correlation of a simple linear regression of `values` on `d`.
pub fn r_squared(values: &[f64], d: &[f64]) -> f64 {
    let r = pearson_r(values, d);
    r * r
}

/// Scores every metric by R² against `d` and keeps those above `threshold`.
///
/// `None` keeps every metric. A NaN R² never passes a threshold.
pub fn filter_metrics(
    table: &AtomMetricTable,
    threshold: Option<f64>,
) -> Result<FilteredMetricSet, ClaError> {
    if let Some(t) = threshold {
        if !t.is_finite() {
            return Err(ClaError::invalid_config(format!(
                "filter threshold must be finite; got {t}"
            )));
        }
    }

    let d = table.d();
    let mut r2 = BTreeMap::new();
    let mut keys = Vec::new();
    for (key, values) in table.columns() {
        let score = r_squared(values, d);
        r2.insert(key.clone(), score);
        if threshold.map_or(true, |t| score > t) {
            keys.push(key.clone());
        }
    }
    debug!(
        total = table.n_metrics(),
        selected = keys.len(),
        threshold = ?threshold,
        "atom metrics filtered"
    );

    let filtered = table.select(&keys)?;
    let columns: Vec<&[f64]> = filtered.columns().values().map(Vec::as_slice).collect();
    let matrix = Matrix::from_columns(&columns, table.len())?;
    Ok(FilteredMetricSet {
        r2,
        keys,
        table: filtered,
        matrix,
    })
}

/// Pearson correlation of every metric with `d`.
pub fn distance_correlations(table: &AtomMetricTable) -> BTreeMap<String, f64> {
    table
        .columns()
        .iter()
        .map(|(key, values)| (key.clone(), pearson_r(values, table.d())))
        .collect()
}

/// Metrics whose |r| with `d` exceeds `threshold`, in key order.
pub fn strongly_correlated(table: &AtomMetricTable, threshold: f64) -> Vec<String> {
    distance_correlations(table)
        .into_iter()
        .filter_map(|(key, r)| (r.abs() > threshold).then_some(key))
        .collect()
}
