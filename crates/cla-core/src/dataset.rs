// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::ClaError;
use std::collections::BTreeMap;

/// Owned labeled feature matrix stored in row-major order.
///
/// `n` may be zero (an empty draw); `p` is always at least one.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    values: Vec<f64>,
    n: usize,
    p: usize,
    labels: Vec<i64>,
}

impl Dataset {
    /// Constructs a validated dataset from a row-major buffer.
    pub fn new(values: Vec<f64>, n: usize, p: usize, labels: Vec<i64>) -> Result<Self, ClaError> {
        if p == 0 {
            return Err(ClaError::invalid_input("p must be >= 1"));
        }
        let expected_len = n.checked_mul(p).ok_or_else(|| {
            ClaError::invalid_input(format!("n*p overflows usize: n={n}, p={p}"))
        })?;
        if values.len() != expected_len {
            return Err(ClaError::invalid_input(format!(
                "values length mismatch: got {}, expected n*p={expected_len}",
                values.len()
            )));
        }
        if labels.len() != n {
            return Err(ClaError::invalid_input(format!(
                "labels length mismatch: got {}, expected n={n}",
                labels.len()
            )));
        }
        if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
            return Err(ClaError::invalid_input(format!(
                "non-finite feature value at row={}, col={}",
                idx / p,
                idx % p
            )));
        }

        Ok(Self {
            values,
            n,
            p,
            labels,
        })
    }

    /// Constructs a dataset from equal-length rows.
    pub fn from_rows(rows: &[Vec<f64>], labels: Vec<i64>) -> Result<Self, ClaError> {
        let p = rows.first().map_or(0, Vec::len);
        let mut values = Vec::with_capacity(rows.len() * p);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != p {
                return Err(ClaError::invalid_input(format!(
                    "ragged rows: row {i} has {} features, expected {p}",
                    row.len()
                )));
            }
            values.extend_from_slice(row);
        }
        Self::new(values, rows.len(), p, labels)
    }

    pub fn n_samples(&self) -> usize {
        self.n
    }

    pub fn n_features(&self) -> usize {
        self.p
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.p..(i + 1) * self.p]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks_exact(self.p)
    }

    /// Copies feature `j` into a new vector.
    pub fn column(&self, j: usize) -> Vec<f64> {
        self.rows().map(|row| row[j]).collect()
    }

    /// Distinct labels in ascending order.
    pub fn classes(&self) -> Vec<i64> {
        self.class_counts().into_keys().collect()
    }

    pub fn class_counts(&self) -> BTreeMap<i64, usize> {
        let mut counts = BTreeMap::new();
        for &label in &self.labels {
            *counts.entry(label).or_insert(0) += 1;
        }
        counts
    }

    /// Per-feature values of the rows labeled `label`, one vector per feature.
    pub fn class_columns(&self, label: i64) -> Vec<Vec<f64>> {
        let mut columns = vec![Vec::new(); self.p];
        for (row, &y) in self.rows().zip(&self.labels) {
            if y == label {
                for (column, &value) in columns.iter_mut().zip(row) {
                    column.push(value);
                }
            }
        }
        columns
    }

    /// Rows labeled `label`, keeping their original labels.
    pub fn subset_for_class(&self, label: i64) -> Dataset {
        let mut values = Vec::new();
        let mut n = 0;
        for row in self
            .rows()
            .zip(&self.labels)
            .filter_map(|(row, &y)| (y == label).then_some(row))
        {
            values.extend_from_slice(row);
            n += 1;
        }
        Dataset {
            values,
            n,
            p: self.p,
            labels: vec![label; n],
        }
    }

    /// Same features with a replacement label vector.
    pub fn with_labels(&self, labels: Vec<i64>) -> Result<Dataset, ClaError> {
        if labels.len() != self.n {
            return Err(ClaError::invalid_input(format!(
                "labels length mismatch: got {}, expected n={}",
                labels.len(),
                self.n
            )));
        }
        Ok(Dataset {
            values: self.values.clone(),
            n: self.n,
            p: self.p,
            labels,
        })
    }

    /// Per-feature mean; zero for an empty dataset.
    pub fn column_means(&self) -> Vec<f64> {
        let mut means = vec![0.0; self.p];
        if self.n == 0 {
            return means;
        }
        for row in self.rows() {
            for (mean, &value) in means.iter_mut().zip(row) {
                *mean += value;
            }
        }
        let n = self.n as f64;
        means.iter_mut().for_each(|mean| *mean /= n);
        means
    }

    /// Per-feature population standard deviation (divisor `n`).
    pub fn column_stds(&self) -> Vec<f64> {
        let means = self.column_means();
        let mut sums = vec![0.0; self.p];
        if self.n == 0 {
            return sums;
        }
        for row in self.rows() {
            for ((sum, &value), &mean) in sums.iter_mut().zip(row).zip(&means) {
                let delta = value - mean;
                *sum += delta * delta;
            }
        }
        let n = self.n as f64;
        sums.into_iter().map(|sum| (sum / n).sqrt()).collect()
    }

    /// Indices of the `count` largest entries of a per-feature metric, descending.
    ///
    /// NaN entries sort last; ties keep the lower index first.
    pub fn top_features(metric: &[f64], count: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..metric.len()).collect();
        order.sort_by(|&a, &b| {
            let (x, y) = (metric[a], metric[b]);
            match (x.is_nan(), y.is_nan()) {
                (true, true) => a.cmp(&b),
                (true, false) => std::cmp::Ordering::Greater,
                (false, true) => std::cmp::Ordering::Less,
                (false, false) => y.total_cmp(&x).then(a.cmp(&b)),
            }
        });
        order.truncate(count);
        order
    }

    /// Projects the dataset onto the given feature indices, in the given order.
    pub fn select_features(&self, indices: &[usize]) -> Result<Dataset, ClaError> {
        if indices.is_empty() {
            return Err(ClaError::invalid_input("feature selection must be non-empty"));
        }
        if let Some(&bad) = indices.iter().find(|&&j| j >= self.p) {
            return Err(ClaError::invalid_input(format!(
                "feature index {bad} out of range for p={}",
                self.p
            )));
        }
        let mut values = Vec::with_capacity(self.n * indices.len());
        for row in self.rows() {
            values.extend(indices.iter().map(|&j| row[j]));
        }
        Ok(Dataset {
            values,
            n: self.n,
            p: indices.len(),
            labels: self.labels.clone(),
        })
    }
}
