// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use cla_core::{ClaError, Dataset};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::cache::PayloadCodec;

/// Meta-learner strategy, addressed by its string tag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    #[serde(rename = "meta.linear")]
    Linear,
    #[serde(rename = "meta.logistic")]
    Logistic,
    #[default]
    #[serde(rename = "decompose.pca")]
    Pca,
    #[serde(rename = "decompose.lda")]
    Lda,
}

impl Method {
    pub const ALL: [Method; 4] = [Method::Linear, Method::Logistic, Method::Pca, Method::Lda];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linear => "meta.linear",
            Self::Logistic => "meta.logistic",
            Self::Pca => "decompose.pca",
            Self::Lda => "decompose.lda",
        }
    }

    /// Decomposition strategies carry a scale calibration.
    pub fn is_decomposition(self) -> bool {
        matches!(self, Self::Pca | Self::Lda)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ClaError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|method| method.as_str() == raw)
            .ok_or_else(|| {
                ClaError::invalid_config(format!(
                    "unsupported method '{raw}'; expected one of: meta.linear, meta.logistic, decompose.pca, decompose.lda"
                ))
            })
    }
}

/// Ordered standardized between-class distances.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistanceGrid(Vec<f64>);

impl DistanceGrid {
    /// Validates that the grid is non-empty, finite and non-negative.
    pub fn new(values: Vec<f64>) -> Result<Self, ClaError> {
        let grid = Self(values);
        grid.validate()?;
        Ok(grid)
    }

    /// `num` evenly spaced points from `start` to `stop` inclusive.
    pub fn linspace(start: f64, stop: f64, num: usize) -> Result<Self, ClaError> {
        if num == 0 {
            return Err(ClaError::invalid_config("grid size must be >= 1"));
        }
        if num == 1 {
            return Self::new(vec![start]);
        }
        let step = (stop - start) / (num - 1) as f64;
        let mut values: Vec<f64> = (0..num).map(|i| start + step * i as f64).collect();
        values[num - 1] = stop;
        Self::new(values)
    }

    /// The default calibration grid: 0 to 6 in 13 points.
    pub fn standard() -> Self {
        Self((0..13).map(|i| f64::from(i) * 0.5).collect())
    }

    pub fn validate(&self) -> Result<(), ClaError> {
        if self.0.is_empty() {
            return Err(ClaError::invalid_config("distance grid must be non-empty"));
        }
        if let Some(bad) = self.0.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(ClaError::invalid_config(format!(
                "distance grid values must be finite and >= 0.0; got {bad}"
            )));
        }
        Ok(())
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Index of the largest distance; the last one wins on ties.
    pub fn argmax(&self) -> usize {
        let mut best = 0;
        for (i, v) in self.0.iter().enumerate() {
            if *v >= self.0[best] {
                best = i;
            }
        }
        best
    }
}

impl Default for DistanceGrid {
    fn default() -> Self {
        Self::standard()
    }
}

/// Parameters of one atom-metric table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AtomMetricConfig {
    pub mu: Vec<f64>,
    pub s: Vec<f64>,
    pub grid: DistanceGrid,
    pub repeat: usize,
    pub nobs: usize,
}

impl AtomMetricConfig {
    pub const DEFAULT_REPEAT: usize = 5;
    pub const DEFAULT_NOBS: usize = 100;

    /// Mean and population standard deviation taken from `dataset`, default grid and sizes.
    pub fn from_dataset(dataset: &Dataset) -> Self {
        Self {
            mu: dataset.column_means(),
            s: dataset.column_stds(),
            grid: DistanceGrid::standard(),
            repeat: Self::DEFAULT_REPEAT,
            nobs: Self::DEFAULT_NOBS,
        }
    }

    /// Zero mean and unit deviation in `dims` dimensions.
    pub fn unit_variance(dims: usize, grid: DistanceGrid, repeat: usize, nobs: usize) -> Self {
        Self {
            mu: vec![0.0; dims],
            s: vec![1.0; dims],
            grid,
            repeat,
            nobs,
        }
    }

    pub fn dims(&self) -> usize {
        self.mu.len()
    }

    pub fn validate(&self) -> Result<(), ClaError> {
        if self.mu.is_empty() {
            return Err(ClaError::invalid_config("mu must have at least one feature"));
        }
        if self.mu.len() != self.s.len() {
            return Err(ClaError::invalid_config(format!(
                "mu and s length mismatch: mu={}, s={}",
                self.mu.len(),
                self.s.len()
            )));
        }
        if let Some(bad) = self.mu.iter().find(|v| !v.is_finite()) {
            return Err(ClaError::invalid_config(format!("mu must be finite; got {bad}")));
        }
        if let Some(bad) = self.s.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(ClaError::invalid_config(format!(
                "s must be finite and >= 0.0; got {bad}"
            )));
        }
        if self.repeat == 0 {
            return Err(ClaError::invalid_config("repeat must be >= 1"));
        }
        self.grid.validate()
    }

    /// Lowercase hex SHA-256 of the canonical JSON encoding.
    pub fn config_key(&self) -> Result<String, ClaError> {
        let canonical = serde_json::to_vec(self).map_err(|err| {
            ClaError::invalid_config(format!("atom config canonical encoding failed: {err}"))
        })?;
        let digest = Sha256::digest(&canonical);
        Ok(digest.iter().map(|byte| format!("{byte:02x}")).collect())
    }
}

/// Meta-learner hyperparameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetaLearnerConfig {
    /// Distances at or above this are positive for the logistic learner.
    pub logistic_cutoff: f64,
    /// Distances at or above this are positive for the LDA learner.
    pub lda_cutoff: f64,
    pub pca_components: usize,
    /// Inverse L2 regularization strength of the logistic learner.
    pub logistic_c: f64,
    pub logistic_max_iter: usize,
    pub logistic_tol: f64,
}

impl Default for MetaLearnerConfig {
    fn default() -> Self {
        Self {
            logistic_cutoff: 2.0,
            lda_cutoff: 3.0,
            pca_components: 3,
            logistic_c: 1.0,
            logistic_max_iter: 1000,
            logistic_tol: 1e-8,
        }
    }
}

impl MetaLearnerConfig {
    pub fn validate(&self) -> Result<(), ClaError> {
        for (name, value) in [
            ("logistic_cutoff", self.logistic_cutoff),
            ("lda_cutoff", self.lda_cutoff),
        ] {
            if !value.is_finite() {
                return Err(ClaError::invalid_config(format!(
                    "{name} must be finite; got {value}"
                )));
            }
        }
        if self.pca_components == 0 {
            return Err(ClaError::invalid_config("pca_components must be >= 1"));
        }
        if !self.logistic_c.is_finite() || self.logistic_c <= 0.0 {
            return Err(ClaError::invalid_config(format!(
                "logistic_c must be finite and > 0.0; got {}",
                self.logistic_c
            )));
        }
        if self.logistic_max_iter == 0 {
            return Err(ClaError::invalid_config("logistic_max_iter must be >= 1"));
        }
        if !self.logistic_tol.is_finite() || self.logistic_tol <= 0.0 {
            return Err(ClaError::invalid_config(format!(
                "logistic_tol must be finite and > 0.0; got {}",
                self.logistic_tol
            )));
        }
        Ok(())
    }
}

/// Optional replacements for the data-derived atom configuration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AtomOverrides {
    pub mu: Option<Vec<f64>>,
    pub s: Option<Vec<f64>>,
    pub grid: Option<DistanceGrid>,
    pub repeat: Option<usize>,
    pub nobs: Option<usize>,
}

impl AtomOverrides {
    pub fn apply(&self, mut config: AtomMetricConfig) -> AtomMetricConfig {
        if let Some(mu) = &self.mu {
            config.mu.clone_from(mu);
        }
        if let Some(s) = &self.s {
            config.s.clone_from(s);
        }
        if let Some(grid) = &self.grid {
            config.grid = grid.clone();
        }
        if let Some(repeat) = self.repeat {
            config.repeat = repeat;
        }
        if let Some(nobs) = self.nobs {
            config.nobs = nobs;
        }
        config
    }
}

/// Orchestrator configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalyzeConfig {
    pub method: Method,
    pub use_filter: bool,
    /// R² threshold applied when `use_filter` is set.
    pub filter_threshold: f64,
    /// Artifact to load, or to create when missing.
    pub cache_path: Option<PathBuf>,
    /// Directory for timestamp-named artifacts when `cache_path` is unset.
    pub cache_dir: PathBuf,
    pub payload_codec: PayloadCodec,
    pub in_class_repeat: usize,
    pub seed: Option<u64>,
    pub atom: AtomOverrides,
    pub meta: MetaLearnerConfig,
}

impl Default for AnalyzeConfig {
    fn default() -> Self {
        Self {
            method: Method::default(),
            use_filter: true,
            filter_threshold: 0.5,
            cache_path: None,
            cache_dir: PathBuf::from("."),
            payload_codec: PayloadCodec::Bincode,
            in_class_repeat: 3,
            seed: None,
            atom: AtomOverrides::default(),
            meta: MetaLearnerConfig::default(),
        }
    }
}

impl AnalyzeConfig {
    /// Threshold handed to the metric filter; `None` keeps every metric.
    pub fn effective_threshold(&self) -> Option<f64> {
        self.use_filter.then_some(self.filter_threshold)
    }

    pub fn validate(&self) -> Result<(), ClaError> {
        if !self.filter_threshold.is_finite() {
            return Err(ClaError::invalid_config(format!(
                "filter_threshold must be finite; got {}",
                self.filter_threshold
            )));
        }
        if self.in_class_repeat == 0 {
            return Err(ClaError::invalid_config("in_class_repeat must be >= 1"));
        }
        self.meta.validate()
    }
}
