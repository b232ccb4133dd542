// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::{ClaError, Dataset, MetricSet};

/// Computes named classifiability metrics for a labeled dataset.
///
/// Implementations should return an error for datasets they cannot score
/// (for example fewer than two classes). Callers treat such errors as a
/// failed trial rather than aborting the run.
pub trait MetricProvider {
    fn compute(&self, dataset: &Dataset) -> Result<MetricSet, ClaError>;

    /// Short identifier used in logs and diagnostics.
    fn name(&self) -> &'static str {
        "custom"
    }
}

impl<F> MetricProvider for F
where
    F: Fn(&Dataset) -> Result<MetricSet, ClaError>,
{
    fn compute(&self, dataset: &Dataset) -> Result<MetricSet, ClaError> {
        self(dataset)
    }
}
