// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use cla_core::ClaError;
use serde::{Deserialize, Serialize};

/// Range and orientation of a decomposition axis over the training grid.
///
/// Raw scores map linearly onto `[0, 1]` with flat tails: `x_min` maps to 0
/// and `x_max` to 1 when `slope` is true, the reverse otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScaleCalibration {
    pub x_min: f64,
    pub x_max: f64,
    /// True when the projection grows with between-class distance.
    pub slope: bool,
}

impl ScaleCalibration {
    /// Fits the range of `projections` and compares the projection at the
    /// largest distance (`far_index`) with the one at the first grid point.
    pub fn fit(projections: &[f64], far_index: usize) -> Result<Self, ClaError> {
        if projections.is_empty() {
            return Err(ClaError::invalid_input("calibration needs at least one projection"));
        }
        if far_index >= projections.len() {
            return Err(ClaError::invalid_input(format!(
                "calibration far_index={far_index} out of range for {} projections",
                projections.len()
            )));
        }
        if let Some(bad) = projections.iter().find(|v| !v.is_finite()) {
            return Err(ClaError::numerical_issue(format!(
                "calibration projections must be finite; got {bad}"
            )));
        }
        let x_min = projections.iter().copied().fold(f64::INFINITY, f64::min);
        let x_max = projections.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Ok(Self {
            x_min,
            x_max,
            slope: projections[far_index] > projections[0],
        })
    }

    fn endpoints(&self) -> (f64, f64) {
        if self.slope {
            (0.0, 1.0)
        } else {
            (1.0, 0.0)
        }
    }

    /// Maps a raw projection into `[0, 1]`; non-finite input is treated as 0.
    pub fn apply(&self, raw: f64) -> f64 {
        let raw = if raw.is_finite() { raw } else { 0.0 };
        let (at_min, at_max) = self.endpoints();
        if raw < self.x_min {
            return at_min;
        }
        if raw >= self.x_max {
            return at_max;
        }
        let fraction = (raw - self.x_min) / (self.x_max - self.x_min);
        at_min + fraction * (at_max - at_min)
    }
}

#[cfg(test)]
mod tests {
    use super::ScaleCalibration;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tol={tol}"
        );
    }

    #[test]
    fn fit_records_range_and_orientation() {
        let rising = ScaleCalibration::fit(&[-1.0, 0.5, 2.0, 3.0], 3).expect("fit");
        assert_eq!(rising.x_min, -1.0);
        assert_eq!(rising.x_max, 3.0);
        assert!(rising.slope);

        let falling = ScaleCalibration::fit(&[3.0, 1.0, -2.0], 2).expect("fit");
        assert!(!falling.slope);
    }

    #[test]
    fn equal_endpoints_are_not_rising() {
        let flat = ScaleCalibration::fit(&[1.0, 5.0, 1.0], 2).expect("fit");
        assert!(!flat.slope);
    }

    #[test]
    fn fit_rejects_bad_input() {
        assert!(ScaleCalibration::fit(&[], 0).is_err());
        assert!(ScaleCalibration::fit(&[1.0], 1).is_err());
        let err = ScaleCalibration::fit(&[1.0, f64::NAN], 1).expect_err("nan");
        assert_eq!(err.code(), "numerical_issue");
    }

    #[test]
    fn apply_interpolates_and_clamps_rising() {
        let cal = ScaleCalibration {
            x_min: -2.0,
            x_max: 2.0,
            slope: true,
        };
        assert_close(cal.apply(-2.0), 0.0, 0.0);
        assert_close(cal.apply(0.0), 0.5, 1e-12);
        assert_close(cal.apply(2.0), 1.0, 0.0);
        assert_close(cal.apply(-100.0), 0.0, 0.0);
        assert_close(cal.apply(100.0), 1.0, 0.0);
    }

    #[test]
    fn apply_reverses_for_falling_axis() {
        let cal = ScaleCalibration {
            x_min: 0.0,
            x_max: 4.0,
            slope: false,
        };
        assert_close(cal.apply(0.0), 1.0, 0.0);
        assert_close(cal.apply(1.0), 0.75, 1e-12);
        assert_close(cal.apply(4.0), 0.0, 0.0);
        assert_close(cal.apply(-1.0), 1.0, 0.0);
        assert_close(cal.apply(9.0), 0.0, 0.0);
    }

    #[test]
    fn degenerate_range_splits_at_the_point() {
        let cal = ScaleCalibration {
            x_min: 1.0,
            x_max: 1.0,
            slope: true,
        };
        assert_eq!(cal.apply(0.5), 0.0);
        assert_eq!(cal.apply(1.0), 1.0);
        assert_eq!(cal.apply(7.0), 1.0);
    }

    #[test]
    fn non_finite_raw_scores_are_zeroed() {
        let cal = ScaleCalibration {
            x_min: -1.0,
            x_max: 1.0,
            slope: true,
        };
        assert_close(cal.apply(f64::NAN), 0.5, 1e-12);
        assert_close(cal.apply(f64::INFINITY), 0.5, 1e-12);
    }
}
