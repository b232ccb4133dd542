// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

/// One metric value: a scalar or a per-feature vector.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
#[derive(Clone, Debug, PartialEq)]
pub enum MetricValue {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl MetricValue {
    /// Returns the scalar payload, or `None` for vector metrics.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(value) => Some(*value),
            Self::Vector(_) => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar(_))
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<f64>> for MetricValue {
    fn from(values: Vec<f64>) -> Self {
        Self::Vector(values)
    }
}

/// Named metric values keyed by dotted metric name, iterated in key order.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricSet {
    entries: BTreeMap<String, MetricValue>,
}

impl MetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a metric.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetricValue>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&MetricValue> {
        self.entries.get(key)
    }

    /// Scalar value for `key`; `None` when absent or vector-valued.
    pub fn scalar(&self, key: &str) -> Option<f64> {
        self.entries.get(key).and_then(MetricValue::as_scalar)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Scalar-valued entries only, in key order.
    pub fn scalars(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries
            .iter()
            .filter_map(|(k, v)| v.as_scalar().map(|s| (k.as_str(), s)))
    }

    /// Moves every entry of `other` into `self`, replacing duplicates.
    pub fn merge(&mut self, other: MetricSet) {
        self.entries.extend(other.entries);
    }

    /// Serializes the set as a JSON object; non-finite values become `null`.
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> Result<String, crate::ClaError> {
        serde_json::to_string(self).map_err(|err| {
            crate::ClaError::invalid_input(format!("metric set JSON encode failed: {err}"))
        })
    }
}

impl FromIterator<(String, MetricValue)> for MetricSet {
    fn from_iter<I: IntoIterator<Item = (String, MetricValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MetricSet, MetricValue};

    #[test]
    fn keys_iterate_in_sorted_order() {
        let mut set = MetricSet::new();
        set.insert("test.KS", 0.1);
        set.insert("classification.ACC", 0.9);
        set.insert("correlation.r", 0.5);
        let keys: Vec<&str> = set.keys().collect();
        assert_eq!(keys, vec!["classification.ACC", "correlation.r", "test.KS"]);
    }

    #[test]
    fn scalars_skips_vector_metrics() {
        let mut set = MetricSet::new();
        set.insert("test.ES", vec![0.1, 0.2]);
        set.insert("test.ES.max", 0.2);
        let scalars: Vec<(&str, f64)> = set.scalars().collect();
        assert_eq!(scalars, vec![("test.ES.max", 0.2)]);
        assert_eq!(set.scalar("test.ES"), None);
        assert!(set.get("test.ES").is_some_and(|v| !v.is_scalar()));
    }

    #[test]
    fn merge_replaces_duplicates() {
        let mut left = MetricSet::new();
        left.insert("a", 1.0);
        let mut right = MetricSet::new();
        right.insert("a", 2.0);
        right.insert("b", MetricValue::Scalar(3.0));
        left.merge(right);
        assert_eq!(left.len(), 2);
        assert_eq!(left.scalar("a"), Some(2.0));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn to_json_writes_flat_object() {
        let mut set = MetricSet::new();
        set.insert("b", vec![1.0, 2.0]);
        set.insert("a", 0.5);
        let json = set.to_json().expect("metric set should encode");
        assert_eq!(json, r#"{"a":0.5,"b":[1.0,2.0]}"#);
    }
}
