// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Collapses a vector of atom metrics into one calibrated classifiability score.
//!
//! The pipeline draws synthetic two-class data over a grid of standardized
//! separations, measures atom metrics with a [`cla_core::MetricProvider`],
//! keeps the metrics that track the separation, trains a meta-learner on them
//! and applies it to a real dataset. [`analyze`] runs the whole thing.

pub mod analyze;
pub mod atom;
pub mod cache;
pub mod calibrate;
pub mod config;
pub mod evaluate;
pub mod filter;
pub mod linalg;
pub mod meta;
pub mod synth;

pub use analyze::{AnalysisReport, Analyzer, analyze};
pub use atom::{
    AtomMetricTable, AtomRunStats, DISTANCE_KEY, calculate_atom_metrics,
    calculate_atom_metrics_with_stats, simulate, trimmed_mean,
};
pub use cache::{
    ATOM_TABLE_FILE_EXTENSION, AtomMetricCache, AtomTableArtifact,
    CURRENT_ATOM_TABLE_SCHEMA_VERSION, MIN_SUPPORTED_ATOM_TABLE_SCHEMA_VERSION, PayloadCodec,
    StoredAtomTable, decode_artifact, encode_artifact, load_atom_table_file,
    save_atom_table_file, timestamped_file_name, validate_atom_table_schema_version,
};
pub use calibrate::ScaleCalibration;
pub use config::{
    AnalyzeConfig, AtomMetricConfig, AtomOverrides, DistanceGrid, MetaLearnerConfig, Method,
};
pub use evaluate::{
    EVALUATION_INFINITY, UnifiedMetricEvaluator, metric_vector, sanitize_metric_value,
    sanitize_metric_vector,
};
pub use filter::{
    FilteredMetricSet, distance_correlations, filter_metrics, pearson_r, r_squared,
    strongly_correlated,
};
pub use linalg::Matrix;
pub use meta::{
    LdaMetaModel, LinearMetaModel, LogisticMetaModel, MetaLearner, MetaModel, PcaMetaModel,
    sanitize_training_matrix, sanitize_training_value,
};
pub use synth::generate_two_class;
