// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Built-in atom metrics for two-class datasets.
//!
//! [`BuiltinMetricProvider`] emits dotted metric names grouped in families
//! (`classification.*`, `correlation.*`, `test.*`). A family that cannot be
//! computed on a degenerate dataset is left out of the result instead of
//! failing the whole call.

mod naive_bayes;
mod stats;

use cla_core::{ClaError, Dataset, MetricProvider, MetricSet, derive_seed, seeded_rng};
use naive_bayes::{GaussianNb, bayes_error_rate, classification_report};
pub use stats::spearman;
use tracing::debug;

/// Scalar keys the built-in provider can emit, in sorted order.
pub const SCALAR_KEYS: &[&str] = &[
    "classification.ACC",
    "classification.AP",
    "classification.BER",
    "classification.Brier",
    "classification.CochranQ",
    "classification.CochranQ.T",
    "classification.CrossEntropy",
    "classification.F1_Score",
    "classification.Jaccard",
    "classification.Kappa",
    "classification.McNemar",
    "classification.McNemar.CHI2",
    "classification.Mean_KLD",
    "classification.PR_AUC",
    "classification.Precision",
    "classification.ROC_AUC",
    "classification.Recall",
    "correlation.IG.max",
    "correlation.r.max",
    "correlation.r.p.min",
    "correlation.rho.max",
    "correlation.rho.p.min",
    "test.ANOVA.F.max",
    "test.ANOVA.min",
    "test.ANOVA.min.log10",
    "test.CHISQ.CHI2.max",
    "test.CHISQ.min",
    "test.CHISQ.min.log10",
    "test.ES.max",
    "test.KS.D.max",
    "test.KS.min",
    "test.KS.min.log10",
    "test.MANOVA",
    "test.MANOVA.F",
    "test.MANOVA.Hotelling",
    "test.MANOVA.Pillai",
    "test.MANOVA.Roy",
    "test.MANOVA.Wilks",
    "test.MANOVA.log10",
    "test.MWW.U.min",
    "test.MWW.min",
    "test.MWW.min.log10",
];

/// Per-feature vector keys the built-in provider can emit, in sorted order.
pub const VECTOR_KEYS: &[&str] = &[
    "correlation.IG",
    "correlation.r",
    "correlation.r.p",
    "correlation.r2",
    "correlation.rho",
    "correlation.rho.p",
    "test.ANOVA",
    "test.ANOVA.F",
    "test.CHISQ",
    "test.CHISQ.CHI2",
    "test.ES",
    "test.KS",
    "test.KS.D",
    "test.MWW",
    "test.MWW.U",
];

/// Tuning knobs for [`BuiltinMetricProvider`].
#[derive(Clone, Debug, PartialEq)]
pub struct BuiltinMetricConfig {
    /// Uniform draws used by the Bayes error estimate.
    pub ber_samples: usize,
    /// Half-width of the sampling box, in class standard deviations.
    pub ber_n_sigma: f64,
    /// Seed of the Bayes error sampler; fixed so the provider is deterministic.
    pub ber_seed: u64,
}

impl Default for BuiltinMetricConfig {
    fn default() -> Self {
        Self {
            ber_samples: 10_000,
            ber_n_sigma: 10.0,
            ber_seed: 0x5EED_0BE2,
        }
    }
}

impl BuiltinMetricConfig {
    pub fn validate(&self) -> Result<(), ClaError> {
        if self.ber_samples == 0 {
            return Err(ClaError::invalid_config("ber_samples must be >= 1"));
        }
        if !self.ber_n_sigma.is_finite() || self.ber_n_sigma <= 0.0 {
            return Err(ClaError::invalid_config(format!(
                "ber_n_sigma must be finite and > 0.0; got {}",
                self.ber_n_sigma
            )));
        }
        Ok(())
    }
}

/// Deterministic two-class metric battery.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuiltinMetricProvider {
    config: BuiltinMetricConfig,
}

impl BuiltinMetricProvider {
    pub fn new(config: BuiltinMetricConfig) -> Result<Self, ClaError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BuiltinMetricConfig {
        &self.config
    }

    /// Every scalar key this provider can emit.
    pub fn metric_keys() -> &'static [&'static str] {
        SCALAR_KEYS
    }

    fn classification(
        &self,
        dataset: &Dataset,
        columns: [&[Vec<f64>]; 2],
        positive: i64,
        out: &mut MetricSet,
    ) -> Result<(), ClaError> {
        let model = GaussianNb::fit(columns, dataset)?;
        let truth: Vec<bool> = dataset.labels().iter().map(|&y| y == positive).collect();
        let probabilities: Vec<f64> = dataset.rows().map(|row| model.posterior(row)).collect();
        let report = classification_report(&truth, &probabilities);
        out.insert("classification.ACC", report.accuracy);
        out.insert("classification.Kappa", report.kappa);
        out.insert("classification.F1_Score", report.f1);
        out.insert("classification.Jaccard", report.jaccard);
        out.insert("classification.Precision", report.precision);
        out.insert("classification.Recall", report.recall);
        out.insert("classification.Brier", report.brier);
        out.insert("classification.CrossEntropy", report.cross_entropy);
        out.insert("classification.ROC_AUC", report.roc_auc);
        out.insert("classification.Mean_KLD", report.mean_kld);
        out.insert("classification.AP", report.average_precision);
        out.insert("classification.PR_AUC", report.pr_auc);

        let predicted: Vec<bool> = probabilities.iter().map(|&p| p > 0.5).collect();
        let (chi2, p) = stats::mcnemar(&truth, &predicted)?;
        out.insert("classification.McNemar", p);
        out.insert("classification.McNemar.CHI2", chi2);
        let (q, p) = stats::cochran_q(&truth, &predicted)?;
        out.insert("classification.CochranQ", p);
        out.insert("classification.CochranQ.T", q);

        let mut rng = seeded_rng(Some(derive_seed(self.config.ber_seed, 0)));
        match bayes_error_rate(
            &model,
            columns,
            self.config.ber_samples,
            self.config.ber_n_sigma,
            &mut rng,
        ) {
            Ok(ber) => out.insert("classification.BER", ber),
            Err(err) => debug!(error = %err, "BER omitted"),
        }
        Ok(())
    }

    fn correlation(&self, dataset: &Dataset, out: &mut MetricSet) -> Result<(), ClaError> {
        let y: Vec<f64> = dataset.labels().iter().map(|&label| label as f64).collect();
        let p = dataset.n_features();
        let (mut rs, mut r_ps) = (Vec::with_capacity(p), Vec::with_capacity(p));
        let (mut rhos, mut rho_ps) = (Vec::with_capacity(p), Vec::with_capacity(p));
        for j in 0..p {
            let x = dataset.column(j);
            let (r, r_p) = stats::pearson(&x, &y)?;
            let (rho, rho_p) = stats::spearman(&x, &y)?;
            rs.push(r);
            r_ps.push(r_p);
            rhos.push(rho);
            rho_ps.push(rho_p);
        }
        let abs = |values: &[f64]| values.iter().map(|v| v.abs()).collect::<Vec<_>>();
        out.insert("correlation.r.max", stats::nan_max(&abs(&rs)));
        out.insert("correlation.r.p.min", stats::nan_min(&r_ps));
        out.insert("correlation.rho.max", stats::nan_max(&abs(&rhos)));
        out.insert("correlation.rho.p.min", stats::nan_min(&rho_ps));
        out.insert(
            "correlation.r2",
            rs.iter().map(|r| r * r).collect::<Vec<_>>(),
        );
        out.insert("correlation.r", rs);
        out.insert("correlation.r.p", r_ps);
        out.insert("correlation.rho", rhos);
        out.insert("correlation.rho.p", rho_ps);
        Ok(())
    }

    fn information_gain(columns: [&[Vec<f64>]; 2], out: &mut MetricSet) -> Result<(), ClaError> {
        let ig = columns[0]
            .iter()
            .zip(columns[1])
            .map(|(a, b)| stats::mutual_information(a, b))
            .collect::<Result<Vec<_>, _>>()?;
        out.insert("correlation.IG.max", stats::nan_max(&ig));
        out.insert("correlation.IG", ig);
        Ok(())
    }

    /// Joint test on the first two features; a single feature falls back to ANOVA.
    fn manova(columns: [&[Vec<f64>]; 2], out: &mut MetricSet) -> Result<(), ClaError> {
        let result = stats::manova(columns[0], columns[1])?;
        out.insert("test.MANOVA", result.p);
        out.insert("test.MANOVA.log10", result.p.log10());
        out.insert("test.MANOVA.F", result.f);
        out.insert("test.MANOVA.Wilks", result.wilks);
        out.insert("test.MANOVA.Pillai", result.pillai);
        out.insert("test.MANOVA.Hotelling", result.hotelling_lawley);
        out.insert("test.MANOVA.Roy", result.roy);
        Ok(())
    }

    fn effect_size(columns: [&[Vec<f64>]; 2], out: &mut MetricSet) -> Result<(), ClaError> {
        let es = stats::cohen_d(columns[0], columns[1])?;
        out.insert("test.ES.max", stats::nan_max(&es));
        out.insert("test.ES", es);
        Ok(())
    }

    /// Shared shape of the per-feature hypothesis tests: a statistic vector,
    /// a p-value vector, and their summary scalars.
    fn feature_test(
        columns: [&[Vec<f64>]; 2],
        prefix: &str,
        statistic: &str,
        statistic_is_max: bool,
        test: fn(&[f64], &[f64]) -> Result<(f64, f64), ClaError>,
        out: &mut MetricSet,
    ) -> Result<(), ClaError> {
        let mut statistics = Vec::with_capacity(columns[0].len());
        let mut ps = Vec::with_capacity(columns[0].len());
        for (a, b) in columns[0].iter().zip(columns[1]) {
            let (s, p) = test(a, b)?;
            statistics.push(s);
            ps.push(p);
        }
        let p_min = stats::nan_min(&ps);
        out.insert(format!("{prefix}.min"), p_min);
        out.insert(format!("{prefix}.min.log10"), p_min.log10());
        if statistic_is_max {
            out.insert(
                format!("{prefix}.{statistic}.max"),
                stats::nan_max(&statistics),
            );
        } else {
            out.insert(
                format!("{prefix}.{statistic}.min"),
                stats::nan_min(&statistics),
            );
        }
        out.insert(format!("{prefix}.{statistic}"), statistics);
        out.insert(prefix.to_string(), ps);
        Ok(())
    }
}

fn record_family(family: &str, result: Result<(), ClaError>) {
    if let Err(err) = result {
        debug!(family, error = %err, "metric family omitted");
    }
}

impl MetricProvider for BuiltinMetricProvider {
    fn compute(&self, dataset: &Dataset) -> Result<MetricSet, ClaError> {
        let classes = dataset.classes();
        if classes.len() != 2 {
            return Err(ClaError::invalid_input(format!(
                "built-in metrics need exactly 2 classes; got {}",
                classes.len()
            )));
        }
        let first = dataset.class_columns(classes[0]);
        let second = dataset.class_columns(classes[1]);
        let columns: [&[Vec<f64>]; 2] = [&first, &second];

        let mut out = MetricSet::new();
        record_family(
            "classification",
            self.classification(dataset, columns, classes[1], &mut out),
        );
        record_family("correlation", self.correlation(dataset, &mut out));
        record_family("correlation.IG", Self::information_gain(columns, &mut out));
        record_family("test.ES", Self::effect_size(columns, &mut out));
        record_family(
            "test.ANOVA",
            Self::feature_test(columns, "test.ANOVA", "F", true, stats::anova_two, &mut out),
        );
        record_family(
            "test.MWW",
            Self::feature_test(columns, "test.MWW", "U", false, stats::mann_whitney, &mut out),
        );
        record_family(
            "test.KS",
            Self::feature_test(columns, "test.KS", "D", true, stats::ks_two_sample, &mut out),
        );
        record_family(
            "test.CHISQ",
            Self::feature_test(columns, "test.CHISQ", "CHI2", true, stats::chi_square, &mut out),
        );
        record_family("test.MANOVA", Self::manova(columns, &mut out));
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "builtin"
    }
}

#[cfg(test)]
mod tests {
    use super::{BuiltinMetricConfig, BuiltinMetricProvider, SCALAR_KEYS, VECTOR_KEYS};
    use cla_core::{Dataset, MetricProvider, seeded_rng};
    use rand::Rng;
    use rand_distr::{Distribution, Normal};

    fn gaussian_pair(md: f64, nobs: usize, p: usize, seed: u64) -> Dataset {
        let mut rng = seeded_rng(Some(seed));
        let normal = Normal::new(0.0, 1.0).expect("valid normal");
        let mut values = Vec::with_capacity(2 * nobs * p);
        let mut labels = Vec::with_capacity(2 * nobs);
        for (label, shift) in [(0_i64, -md / 2.0), (1, md / 2.0)] {
            for _ in 0..nobs {
                for _ in 0..p {
                    values.push(shift + normal.sample(&mut rng));
                }
                labels.push(label);
            }
        }
        Dataset::new(values, 2 * nobs, p, labels).expect("valid dataset")
    }

    #[test]
    fn key_tables_are_sorted() {
        let mut sorted = SCALAR_KEYS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, SCALAR_KEYS);
        let mut sorted = VECTOR_KEYS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, VECTOR_KEYS);
        assert_eq!(BuiltinMetricProvider::metric_keys().len(), 42);
        assert_eq!(VECTOR_KEYS.len(), 15);
    }

    #[test]
    fn config_validate_rejects_bad_values() {
        let bad = BuiltinMetricConfig {
            ber_samples: 0,
            ..BuiltinMetricConfig::default()
        };
        assert!(BuiltinMetricProvider::new(bad).is_err());
        let bad = BuiltinMetricConfig {
            ber_n_sigma: f64::NAN,
            ..BuiltinMetricConfig::default()
        };
        assert!(BuiltinMetricProvider::new(bad).is_err());
    }

    #[test]
    fn emits_every_key_on_well_posed_data() {
        let dataset = gaussian_pair(2.0, 50, 3, 11);
        let provider = BuiltinMetricProvider::default();
        let metrics = provider.compute(&dataset).expect("metrics should compute");
        for key in SCALAR_KEYS {
            let value = metrics.scalar(key);
            assert!(value.is_some(), "missing scalar {key}");
        }
        for key in VECTOR_KEYS {
            let value = metrics.get(key).expect("vector key present");
            assert!(!value.is_scalar(), "{key} should be a vector");
        }
        assert_eq!(provider.name(), "builtin");
    }

    #[test]
    fn separated_classes_score_high_accuracy() {
        let dataset = gaussian_pair(4.0, 200, 2, 5);
        let metrics = BuiltinMetricProvider::default()
            .compute(&dataset)
            .expect("metrics should compute");
        let acc = metrics.scalar("classification.ACC").expect("ACC present");
        assert!(acc > 0.9, "acc={acc}");
        let auc = metrics.scalar("classification.ROC_AUC").expect("AUC present");
        assert!(auc > 0.95, "auc={auc}");
        let ks_p = metrics.scalar("test.KS.min").expect("KS present");
        assert!(ks_p < 1e-6, "ks_p={ks_p}");
        let ig = metrics.scalar("correlation.IG.max").expect("IG present");
        assert!(ig > 0.3 && ig < 1.0, "ig={ig}");
        let manova_p = metrics.scalar("test.MANOVA").expect("MANOVA present");
        assert!(manova_p < 1e-6, "manova_p={manova_p}");
        let chisq_p = metrics.scalar("test.CHISQ.min").expect("CHISQ present");
        assert!(chisq_p < 1e-3, "chisq_p={chisq_p}");
    }

    #[test]
    fn single_feature_manova_matches_anova() {
        let dataset = gaussian_pair(1.0, 30, 1, 3);
        let metrics = BuiltinMetricProvider::default()
            .compute(&dataset)
            .expect("metrics should compute");
        let manova_f = metrics.scalar("test.MANOVA.F").expect("MANOVA F");
        let anova_f = metrics.scalar("test.ANOVA.F.max").expect("ANOVA F");
        assert!((manova_f - anova_f).abs() <= 1e-9 * anova_f.max(1.0));
        let manova_p = metrics.scalar("test.MANOVA").expect("MANOVA p");
        let anova_p = metrics.scalar("test.ANOVA.min").expect("ANOVA p");
        assert!((manova_p - anova_p).abs() <= 1e-9, "{manova_p} vs {anova_p}");
    }

    #[test]
    fn compute_is_deterministic() {
        let dataset = gaussian_pair(1.0, 30, 2, 21);
        let provider = BuiltinMetricProvider::default();
        let first = provider.compute(&dataset).expect("first");
        let second = provider.compute(&dataset).expect("second");
        assert_eq!(
            first.scalar("classification.BER").map(f64::to_bits),
            second.scalar("classification.BER").map(f64::to_bits)
        );
    }

    #[test]
    fn single_class_is_rejected() {
        let dataset = Dataset::from_rows(&[vec![1.0], vec![2.0]], vec![3, 3]).expect("valid");
        let err = BuiltinMetricProvider::default()
            .compute(&dataset)
            .expect_err("one class");
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn degenerate_families_are_omitted() {
        // singleton classes: effect size and BER need two samples per class
        let dataset = Dataset::from_rows(&[vec![0.0], vec![1.0]], vec![0, 1]).expect("valid");
        let metrics = BuiltinMetricProvider::default()
            .compute(&dataset)
            .expect("partial metrics");
        assert!(metrics.scalar("test.ES.max").is_none());
        assert!(metrics.scalar("classification.BER").is_none());
        assert!(metrics.scalar("test.KS.D.max").is_some());
        assert!(metrics.scalar("classification.ACC").is_some());
    }

    #[test]
    fn random_labels_keep_metrics_finite_in_unit_range() {
        let mut rng = seeded_rng(Some(99));
        let base = gaussian_pair(0.0, 40, 2, 8);
        let labels: Vec<i64> = (0..base.n_samples())
            .map(|_| i64::from(rng.gen::<f64>() > 0.5))
            .collect();
        let dataset = base.with_labels(labels).expect("relabel");
        let metrics = BuiltinMetricProvider::default()
            .compute(&dataset)
            .expect("metrics");
        for key in ["classification.ACC", "classification.BER", "test.KS.min"] {
            let value = metrics.scalar(key).expect("key present");
            assert!((0.0..=1.0).contains(&value), "{key}={value}");
        }
    }
}
