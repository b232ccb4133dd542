// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::config::{AtomMetricConfig, DistanceGrid};
use crate::synth::generate_two_class;
use cla_core::{ClaError, ExecutionContext, MetricProvider};
use rand::Rng;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Reserved key under which a table exposes its distance grid.
pub const DISTANCE_KEY: &str = "d";

/// Aggregated atom metrics, one value per grid point for every metric key.
#[derive(Clone, Debug, PartialEq)]
pub struct AtomMetricTable {
    grid: DistanceGrid,
    columns: BTreeMap<String, Vec<f64>>,
}

impl AtomMetricTable {
    /// Validates that every column matches the grid length and that `"d"` is not a metric.
    pub fn new(grid: DistanceGrid, columns: BTreeMap<String, Vec<f64>>) -> Result<Self, ClaError> {
        grid.validate()?;
        if columns.contains_key(DISTANCE_KEY) {
            return Err(ClaError::invalid_input(format!(
                "metric key '{DISTANCE_KEY}' is reserved for the distance grid"
            )));
        }
        if let Some((key, values)) = columns.iter().find(|(_, v)| v.len() != grid.len()) {
            return Err(ClaError::invalid_input(format!(
                "metric '{key}' has {} values, expected grid length {}",
                values.len(),
                grid.len()
            )));
        }
        Ok(Self { grid, columns })
    }

    pub fn grid(&self) -> &DistanceGrid {
        &self.grid
    }

    /// The distance grid values (the `"d"` column).
    pub fn d(&self) -> &[f64] {
        self.grid.values()
    }

    /// Number of grid points.
    pub fn len(&self) -> usize {
        self.grid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grid.is_empty()
    }

    pub fn n_metrics(&self) -> usize {
        self.columns.len()
    }

    /// Metric keys in sorted order, excluding `"d"`.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Values for `key`; `"d"` returns the grid.
    pub fn column(&self, key: &str) -> Option<&[f64]> {
        if key == DISTANCE_KEY {
            return Some(self.grid.values());
        }
        self.columns.get(key).map(Vec::as_slice)
    }

    pub fn columns(&self) -> &BTreeMap<String, Vec<f64>> {
        &self.columns
    }

    /// Sub-table restricted to `keys`; unknown keys are an error.
    pub fn select(&self, keys: &[String]) -> Result<AtomMetricTable, ClaError> {
        let mut columns = BTreeMap::new();
        for key in keys {
            let values = self.columns.get(key).ok_or_else(|| {
                ClaError::invalid_input(format!("metric '{key}' is not in the atom table"))
            })?;
            columns.insert(key.clone(), values.clone());
        }
        Ok(Self {
            grid: self.grid.clone(),
            columns,
        })
    }

    /// Bitwise comparison that treats identical NaN payloads as equal.
    pub fn bitwise_eq(&self, other: &Self) -> bool {
        let same = |a: &[f64], b: &[f64]| {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
        };
        same(self.d(), other.d())
            && self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|((ka, va), (kb, vb))| ka == kb && same(va, vb))
    }
}

/// Row-wise builder that back-fills keys first seen at a later grid point.
struct TableBuilder {
    rows: usize,
    columns: BTreeMap<String, Vec<f64>>,
}

impl TableBuilder {
    fn new() -> Self {
        Self {
            rows: 0,
            columns: BTreeMap::new(),
        }
    }

    fn push_row(&mut self, row: BTreeMap<String, f64>) {
        for (key, values) in self.columns.iter_mut() {
            values.push(row.get(key).copied().unwrap_or(f64::NAN));
        }
        for (key, value) in row {
            if !self.columns.contains_key(&key) {
                let mut values = vec![f64::NAN; self.rows];
                values.push(value);
                self.columns.insert(key, values);
            }
        }
        self.rows += 1;
    }

    fn finish(self, grid: DistanceGrid) -> Result<AtomMetricTable, ClaError> {
        AtomMetricTable::new(grid, self.columns)
    }
}

/// Mean after dropping `floor(n/10)` values from each end when `n > 10`.
///
/// Returns NaN for an empty slice.
pub fn trimmed_mean(values: &[f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }
    if n <= 10 {
        return values.iter().sum::<f64>() / n as f64;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let trim = n / 10;
    let kept = &sorted[trim..n - trim];
    kept.iter().sum::<f64>() / kept.len() as f64
}

/// Trial counters gathered while building a table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AtomRunStats {
    pub trials: usize,
    pub failed_trials: usize,
}

/// Builds the atom-metric table for `config`.
pub fn calculate_atom_metrics<P, R>(
    config: &AtomMetricConfig,
    provider: &P,
    rng: &mut R,
    ctx: &ExecutionContext<'_>,
) -> Result<AtomMetricTable, ClaError>
where
    P: MetricProvider + ?Sized,
    R: Rng + ?Sized,
{
    calculate_atom_metrics_with_stats(config, provider, rng, ctx).map(|(table, _)| table)
}

/// Like [`calculate_atom_metrics`], also reporting trial counters.
///
/// A trial whose provider call fails contributes nothing; every key is
/// aggregated over the trials that actually produced it.
pub fn calculate_atom_metrics_with_stats<P, R>(
    config: &AtomMetricConfig,
    provider: &P,
    rng: &mut R,
    ctx: &ExecutionContext<'_>,
) -> Result<(AtomMetricTable, AtomRunStats), ClaError>
where
    P: MetricProvider + ?Sized,
    R: Rng + ?Sized,
{
    config.validate()?;
    let total = config.grid.len() * config.repeat;
    let mut stats = AtomRunStats::default();
    let mut builder = TableBuilder::new();

    info!(
        grid_points = config.grid.len(),
        repeat = config.repeat,
        nobs = config.nobs,
        dims = config.dims(),
        provider = provider.name(),
        "computing atom metrics"
    );

    for &md in config.grid.values() {
        let mut samples: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for _ in 0..config.repeat {
            let dataset = generate_two_class(&config.mu, &config.s, md, config.nobs, rng)?;
            stats.trials += 1;
            match provider.compute(&dataset) {
                Ok(metrics) => {
                    for (key, value) in metrics.scalars() {
                        samples.entry(key.to_string()).or_default().push(value);
                    }
                }
                Err(err) => {
                    stats.failed_trials += 1;
                    debug!(md, error = %err, "atom trial failed");
                }
            }
            ctx.report_progress(stats.trials as f32 / total as f32);
        }

        let row = samples
            .into_iter()
            .map(|(key, values)| (key, trimmed_mean(&values)))
            .collect();
        builder.push_row(row);
    }

    if stats.failed_trials > 0 {
        warn!(
            failed = stats.failed_trials,
            trials = stats.trials,
            "some atom trials failed"
        );
    }
    ctx.record_scalar("unify.atom.trials_failed", stats.failed_trials as f64);

    let table = builder.finish(config.grid.clone())?;
    debug!(metrics = table.n_metrics(), "atom table complete");
    Ok((table, stats))
}

/// Atom metrics for zero-mean unit-variance data in `dims` dimensions.
pub fn simulate<P, R>(
    grid: DistanceGrid,
    repeat: usize,
    nobs: usize,
    dims: usize,
    provider: &P,
    rng: &mut R,
    ctx: &ExecutionContext<'_>,
) -> Result<AtomMetricTable, ClaError>
where
    P: MetricProvider + ?Sized,
    R: Rng + ?Sized,
{
    let config = AtomMetricConfig::unit_variance(dims, grid, repeat, nobs);
    calculate_atom_metrics(&config, provider, rng, ctx)
}
