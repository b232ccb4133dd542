// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use std::borrow::Cow;

/// Diagnostics schema version for analysis run metadata.
pub const DIAGNOSTICS_SCHEMA_VERSION: u32 = 1;

/// Structured diagnostics captured from one analysis run.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostics {
    pub n: usize,
    pub p: usize,
    pub schema_version: u32,
    pub engine_version: Option<String>,
    pub runtime_ms: Option<u64>,
    pub notes: Vec<String>,
    pub warnings: Vec<String>,
    pub method: Cow<'static, str>,
    pub provider: Cow<'static, str>,
    pub seed: Option<u64>,
    pub config_key: Option<String>,
    pub grid_len: usize,
    pub metric_count: usize,
    pub selected_count: usize,
    pub training_score: Option<f64>,
    pub explained_variance_ratio: Option<Vec<f64>>,
    pub failed_trials: usize,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            n: 0,
            p: 0,
            schema_version: DIAGNOSTICS_SCHEMA_VERSION,
            engine_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            runtime_ms: None,
            notes: vec![],
            warnings: vec![],
            method: Cow::Borrowed(""),
            provider: Cow::Borrowed(""),
            seed: None,
            config_key: None,
            grid_len: 0,
            metric_count: 0,
            selected_count: 0,
            training_score: None,
            explained_variance_ratio: None,
            failed_trials: 0,
        }
    }
}

impl Diagnostics {
    /// Appends a warning message.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Appends an informational note.
    pub fn note(&mut self, message: impl Into<String>) {
        self.notes.push(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::{DIAGNOSTICS_SCHEMA_VERSION, Diagnostics};
    use std::borrow::Cow;

    #[test]
    fn diagnostics_default_sets_schema_and_engine_version() {
        let diagnostics = Diagnostics::default();
        assert_eq!(diagnostics.schema_version, DIAGNOSTICS_SCHEMA_VERSION);
        assert_eq!(
            diagnostics.engine_version,
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn diagnostics_default_sets_expected_empty_and_none_fields() {
        let diagnostics = Diagnostics::default();
        assert_eq!(diagnostics.n, 0);
        assert_eq!(diagnostics.p, 0);
        assert_eq!(diagnostics.method, Cow::Borrowed(""));
        assert!(diagnostics.runtime_ms.is_none());
        assert!(diagnostics.notes.is_empty());
        assert!(diagnostics.warnings.is_empty());
        assert!(diagnostics.seed.is_none());
        assert!(diagnostics.config_key.is_none());
        assert!(diagnostics.training_score.is_none());
        assert!(diagnostics.explained_variance_ratio.is_none());
        assert_eq!(diagnostics.failed_trials, 0);
    }

    #[test]
    fn warn_and_note_append_in_order() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.warn("first");
        diagnostics.warn("second");
        diagnostics.note("info");
        assert_eq!(diagnostics.warnings, vec!["first", "second"]);
        assert_eq!(diagnostics.notes, vec!["info"]);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn diagnostics_serde_roundtrip() {
        let mut diagnostics = Diagnostics {
            n: 200,
            p: 4,
            method: Cow::Borrowed("decompose.pca"),
            seed: Some(9),
            explained_variance_ratio: Some(vec![0.8, 0.15, 0.05]),
            ..Diagnostics::default()
        };
        diagnostics.warn("cache key mismatch");
        let encoded = serde_json::to_string(&diagnostics).expect("diagnostics should serialize");
        let decoded: Diagnostics =
            serde_json::from_str(&encoded).expect("diagnostics should deserialize");
        assert_eq!(decoded, diagnostics);
    }
}
