// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use cla_core::{ClaError, Dataset};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Draws two Gaussian classes separated by `md` standard deviations.
///
/// Class 0 is centered at `mu - s*md/2`, class 1 at `mu + s*md/2`, both with
/// diagonal covariance `diag(s²)`. Rows are `nobs` class-0 draws followed by
/// `nobs` class-1 draws. `nobs == 0` yields an empty dataset.
pub fn generate_two_class<R: Rng + ?Sized>(
    mu: &[f64],
    s: &[f64],
    md: f64,
    nobs: usize,
    rng: &mut R,
) -> Result<Dataset, ClaError> {
    if mu.len() != s.len() {
        return Err(ClaError::invalid_config(format!(
            "mu and s length mismatch: mu={}, s={}",
            mu.len(),
            s.len()
        )));
    }
    let p = mu.len();
    let mut values = Vec::with_capacity(2 * nobs * p);
    let mut labels = Vec::with_capacity(2 * nobs);
    for (label, sign) in [(0_i64, -1.0), (1_i64, 1.0)] {
        for _ in 0..nobs {
            for (&m, &sd) in mu.iter().zip(s) {
                let z: f64 = StandardNormal.sample(rng);
                values.push(m + sign * sd * md / 2.0 + sd * z);
            }
            labels.push(label);
        }
    }
    Dataset::new(values, 2 * nobs, p, labels)
}

#[cfg(test)]
mod tests {
    use super::generate_two_class;
    use cla_core::seeded_rng;

    #[test]
    fn shapes_and_labels_follow_class_blocks() {
        let mut rng = seeded_rng(Some(1));
        let dataset = generate_two_class(&[0.0, 5.0, -1.0], &[1.0, 2.0, 0.5], 2.0, 4, &mut rng)
            .expect("generation should succeed");
        assert_eq!(dataset.n_samples(), 8);
        assert_eq!(dataset.n_features(), 3);
        assert_eq!(dataset.labels(), &[0, 0, 0, 0, 1, 1, 1, 1]);
    }

    #[test]
    fn class_means_sit_at_half_distance() {
        let mut rng = seeded_rng(Some(2));
        let dataset = generate_two_class(&[10.0], &[2.0], 3.0, 5_000, &mut rng)
            .expect("generation should succeed");
        let low = dataset.subset_for_class(0).column_means()[0];
        let high = dataset.subset_for_class(1).column_means()[0];
        // expected 10 -/+ 2*3/2 = 7 and 13; standard error is 2/sqrt(5000)
        assert!((low - 7.0).abs() < 0.15, "low={low}");
        assert!((high - 13.0).abs() < 0.15, "high={high}");
        let spread = dataset.subset_for_class(0).column_stds()[0];
        assert!((spread - 2.0).abs() < 0.1, "spread={spread}");
    }

    #[test]
    fn zero_distance_and_zero_std_are_degenerate_but_valid() {
        let mut rng = seeded_rng(Some(3));
        let dataset =
            generate_two_class(&[1.5], &[0.0], 4.0, 3, &mut rng).expect("generation");
        assert!(dataset.values().iter().all(|&v| v == 1.5));
    }

    #[test]
    fn empty_draw_does_not_fail() {
        let mut rng = seeded_rng(Some(4));
        let dataset = generate_two_class(&[0.0, 0.0], &[1.0, 1.0], 1.0, 0, &mut rng)
            .expect("empty generation");
        assert_eq!(dataset.n_samples(), 0);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let mut rng = seeded_rng(Some(5));
        let err = generate_two_class(&[0.0, 0.0], &[1.0], 1.0, 3, &mut rng)
            .expect_err("mismatch should fail");
        assert_eq!(err.code(), "invalid_config");
    }

    #[test]
    fn same_seed_reproduces_draws() {
        let a = generate_two_class(&[0.0], &[1.0], 1.0, 10, &mut seeded_rng(Some(9)))
            .expect("generation");
        let b = generate_two_class(&[0.0], &[1.0], 1.0, 10, &mut seeded_rng(Some(9)))
            .expect("generation");
        assert_eq!(a, b);
    }
}
