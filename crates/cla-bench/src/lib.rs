// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Shared fixtures for the criterion benches.

use cla_core::{ClaError, Dataset, ExecutionContext, seeded_rng};
use cla_metrics::BuiltinMetricProvider;
use cla_unify::{
    AtomMetricConfig, AtomMetricTable, DistanceGrid, FilteredMetricSet, calculate_atom_metrics,
    filter_metrics, generate_two_class,
};

pub const BENCH_SEED: u64 = 0x00c1_a55e_ed00_0001;

/// Two unit-variance classes with `dims` features and `nobs` rows per class.
pub fn two_class_dataset(dims: usize, distance: f64, nobs: usize) -> Result<Dataset, ClaError> {
    let mu = vec![0.0; dims];
    let s = vec![1.0; dims];
    generate_two_class(&mu, &s, distance, nobs, &mut seeded_rng(Some(BENCH_SEED)))
}

pub fn builtin_atom_table(dims: usize, repeat: usize, nobs: usize) -> Result<AtomMetricTable, ClaError> {
    let config = AtomMetricConfig::unit_variance(dims, DistanceGrid::standard(), repeat, nobs);
    calculate_atom_metrics(
        &config,
        &BuiltinMetricProvider::default(),
        &mut seeded_rng(Some(BENCH_SEED)),
        &ExecutionContext::new(),
    )
}

/// Atom table over the standard grid, filtered at the default threshold.
pub fn filtered_training_set(dims: usize, repeat: usize, nobs: usize) -> Result<FilteredMetricSet, ClaError> {
    let table = builtin_atom_table(dims, repeat, nobs)?;
    filter_metrics(&table, Some(0.5))
}
