// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Shared types for classifiability analysis: datasets, metric sets, the
//! provider contract, errors and run diagnostics.

pub mod dataset;
pub mod diagnostics;
pub mod error;
pub mod execution_context;
pub mod metric;
pub mod observability;
pub mod provider;
pub mod repro;

pub use dataset::Dataset;
pub use diagnostics::{DIAGNOSTICS_SCHEMA_VERSION, Diagnostics};
pub use error::ClaError;
pub use execution_context::ExecutionContext;
pub use metric::{MetricSet, MetricValue};
pub use observability::{ProgressSink, TelemetrySink};
pub use provider::MetricProvider;
pub use repro::{derive_seed, seeded_rng};
