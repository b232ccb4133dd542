// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Small dense linear algebra for the meta-learners. Matrices here are a few
//! dozen columns wide at most, so everything is direct and unblocked.

use cla_core::ClaError;
use nalgebra::{DMatrix, DVector, Dyn, SVD, SymmetricEigen};

/// Row-major dense matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, ClaError> {
        let expected = rows.checked_mul(cols).ok_or_else(|| {
            ClaError::invalid_input(format!("matrix shape overflows: {rows}x{cols}"))
        })?;
        if data.len() != expected {
            return Err(ClaError::invalid_input(format!(
                "matrix data length mismatch: got {}, expected {rows}x{cols}={expected}",
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Builds a matrix whose columns are the given equal-length sequences.
    pub fn from_columns(columns: &[&[f64]], rows: usize) -> Result<Self, ClaError> {
        let cols = columns.len();
        let mut data = vec![0.0; rows * cols];
        for (j, column) in columns.iter().enumerate() {
            if column.len() != rows {
                return Err(ClaError::invalid_input(format!(
                    "column {j} has {} rows, expected {rows}",
                    column.len()
                )));
            }
            for (i, &value) in column.iter().enumerate() {
                data[i * cols + j] = value;
            }
        }
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.cols + j]
    }

    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.cols + j] = value;
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn row_iter(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact(0) panics; zero-width matrices yield empty rows instead.
        let empty: &[f64] = &[];
        self.data
            .chunks_exact(self.cols.max(1))
            .chain(std::iter::repeat(empty))
            .take(self.rows)
    }

    pub fn column(&self, j: usize) -> Vec<f64> {
        (0..self.rows).map(|i| self.get(i, j)).collect()
    }

    /// Applies `f` to every entry in place.
    pub fn map_in_place(&mut self, f: impl Fn(f64) -> f64) {
        self.data.iter_mut().for_each(|v| *v = f(*v));
    }

    pub(crate) fn to_dmatrix(&self) -> DMatrix<f64> {
        DMatrix::from_row_slice(self.rows, self.cols, &self.data)
    }

    /// Per-column means.
    pub fn column_means(&self) -> Vec<f64> {
        let mut means = vec![0.0; self.cols];
        if self.rows == 0 {
            return means;
        }
        for row in self.row_iter() {
            for (mean, &v) in means.iter_mut().zip(row) {
                *mean += v;
            }
        }
        means.iter_mut().for_each(|m| *m /= self.rows as f64);
        means
    }
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Scatter matrix `sum_i (x_i - center)(x_i - center)^T` over the given rows.
pub(crate) fn scatter<'a>(
    rows: impl Iterator<Item = &'a [f64]>,
    center: &[f64],
) -> DMatrix<f64> {
    let p = center.len();
    let mut centered = Vec::new();
    for row in rows {
        centered.extend(row.iter().zip(center).map(|(x, m)| x - m));
    }
    let n = if p == 0 { 0 } else { centered.len() / p };
    let centered = DMatrix::from_row_slice(n, p, &centered);
    centered.transpose() * centered
}

/// Eigen-decomposition of a symmetric matrix, sorted by eigenvalue.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SortedEigen {
    /// Eigenvalues in descending order.
    pub(crate) values: Vec<f64>,
    /// `vectors[k]` is the unit eigenvector of `values[k]`.
    pub(crate) vectors: Vec<Vec<f64>>,
}

pub(crate) fn symmetric_eigen(a: DMatrix<f64>) -> Result<SortedEigen, ClaError> {
    if !a.is_square() {
        return Err(ClaError::invalid_input("eigen-decomposition needs a square matrix"));
    }
    if a.iter().any(|v| !v.is_finite()) {
        return Err(ClaError::numerical_issue(
            "eigen-decomposition input contains non-finite values",
        ));
    }
    let eigen = SymmetricEigen::new(a);
    let mut order: Vec<usize> = (0..eigen.eigenvalues.len()).collect();
    order.sort_by(|&i, &j| eigen.eigenvalues[j].total_cmp(&eigen.eigenvalues[i]));
    Ok(SortedEigen {
        values: order.iter().map(|&k| eigen.eigenvalues[k]).collect(),
        vectors: order
            .iter()
            .map(|&k| eigen.eigenvectors.column(k).iter().copied().collect())
            .collect(),
    })
}

fn decompose(a: DMatrix<f64>, rel_tol: f64) -> Result<(SVD<f64, Dyn, Dyn>, f64), ClaError> {
    if a.iter().any(|v| !v.is_finite()) {
        return Err(ClaError::numerical_issue("SVD input contains non-finite values"));
    }
    let svd = SVD::new(a, true, true);
    let largest = svd.singular_values.iter().fold(0.0_f64, |acc, v| acc.max(*v));
    Ok((svd, rel_tol * largest))
}

/// Moore-Penrose pseudo-inverse; singular values at or below
/// `rel_tol * largest_singular_value` are treated as zero.
pub(crate) fn pinv(a: DMatrix<f64>, rel_tol: f64) -> Result<DMatrix<f64>, ClaError> {
    let (svd, eps) = decompose(a, rel_tol)?;
    svd.pseudo_inverse(eps)
        .map_err(|err| ClaError::numerical_issue(format!("pseudo-inverse failed: {err}")))
}

/// Minimum-norm least-squares solution of `a x = b`.
pub(crate) fn lstsq(a: DMatrix<f64>, b: &DVector<f64>, rel_tol: f64) -> Result<DVector<f64>, ClaError> {
    let (svd, eps) = decompose(a, rel_tol)?;
    svd.solve(b, eps)
        .map_err(|err| ClaError::numerical_issue(format!("least-squares solve failed: {err}")))
}
