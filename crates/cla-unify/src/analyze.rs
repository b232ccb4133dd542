// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::atom::{AtomMetricTable, calculate_atom_metrics_with_stats};
use crate::cache::{load_atom_table_file, save_atom_table_file, timestamped_file_name};
use crate::config::{AnalyzeConfig, AtomMetricConfig, Method};
use crate::evaluate::UnifiedMetricEvaluator;
use crate::filter::filter_metrics;
use crate::meta::MetaModel;
use cla_core::{ClaError, Dataset, Diagnostics, ExecutionContext, MetricProvider, seeded_rng};
use rand::Rng;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Everything one analysis run produced.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisReport {
    /// Unified score of the dataset's real class split.
    pub between_class: f64,
    /// Unified score of each class under random relabeling.
    pub in_class: BTreeMap<i64, f64>,
    /// Artifact the atom table was loaded from or saved to.
    pub cache_path: PathBuf,
    pub method: Method,
    pub selected_keys: Vec<String>,
    /// R² against distance for every metric in the atom table.
    pub r2: BTreeMap<String, f64>,
    pub model: MetaModel,
    pub diagnostics: Diagnostics,
}

/// Runs the calibration pipeline against one provider and configuration.
pub struct Analyzer<'a, P: MetricProvider + ?Sized> {
    provider: &'a P,
    config: AnalyzeConfig,
    ctx: ExecutionContext<'a>,
}

impl<'a, P: MetricProvider + ?Sized> Analyzer<'a, P> {
    pub fn new(provider: &'a P, config: AnalyzeConfig) -> Result<Self, ClaError> {
        config.validate()?;
        Ok(Self {
            provider,
            config,
            ctx: ExecutionContext::new(),
        })
    }

    pub fn with_context(mut self, ctx: ExecutionContext<'a>) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn config(&self) -> &AnalyzeConfig {
        &self.config
    }

    /// Loads or computes the atom table, trains the meta-model and scores `dataset`.
    pub fn run(&self, dataset: &Dataset) -> Result<AnalysisReport, ClaError> {
        let started = Instant::now();
        let config = &self.config;
        let atom_config = config.atom.apply(AtomMetricConfig::from_dataset(dataset));
        atom_config.validate()?;
        let config_key = atom_config.config_key()?;

        let mut diagnostics = Diagnostics {
            n: dataset.n_samples(),
            p: dataset.n_features(),
            method: Cow::Borrowed(config.method.as_str()),
            provider: Cow::Borrowed(self.provider.name()),
            seed: config.seed,
            config_key: Some(config_key.clone()),
            grid_len: atom_config.grid.len(),
            ..Diagnostics::default()
        };
        info!(
            n = dataset.n_samples(),
            p = dataset.n_features(),
            method = %config.method,
            config_key = %config_key,
            "analysis started"
        );

        let mut rng = seeded_rng(config.seed);
        let (table, cache_path) =
            self.load_or_compute(&atom_config, &config_key, &mut rng, &mut diagnostics)?;
        diagnostics.metric_count = table.n_metrics();

        let filtered = filter_metrics(&table, config.effective_threshold())?;
        diagnostics.selected_count = filtered.keys.len();
        if filtered.keys.is_empty() {
            diagnostics.warn("no atom metric passed the filter");
        }
        if table.n_metrics() == 0 {
            return Err(ClaError::numerical_issue(
                "no atom metrics available for training; every atom trial failed",
            ));
        }

        let model = MetaModel::train(config.method, &filtered.matrix, table.d(), &config.meta)?;
        self.log_model(&model, &mut diagnostics);

        let evaluator = UnifiedMetricEvaluator::new(&model, &filtered.keys, self.provider)?;
        let between_class = evaluator.between_class(dataset)?;
        let in_class = evaluator.in_class(dataset, config.in_class_repeat, &mut rng)?;
        self.ctx.record_scalar("unify.between_class", between_class);
        info!(between_class, classes = in_class.len(), "analysis finished");

        diagnostics.runtime_ms = u64::try_from(started.elapsed().as_millis()).ok();
        Ok(AnalysisReport {
            between_class,
            in_class,
            cache_path,
            method: config.method,
            selected_keys: filtered.keys,
            r2: filtered.r2,
            model,
            diagnostics,
        })
    }

    fn load_or_compute<R: Rng + ?Sized>(
        &self,
        atom_config: &AtomMetricConfig,
        config_key: &str,
        rng: &mut R,
        diagnostics: &mut Diagnostics,
    ) -> Result<(AtomMetricTable, PathBuf), ClaError> {
        let target = match &self.config.cache_path {
            Some(path) if path.exists() => match load_atom_table_file(path, None) {
                Ok(stored) => {
                    if stored.config_key != config_key {
                        warn!(
                            path = %path.display(),
                            expected = config_key,
                            found = %stored.config_key,
                            "cached atom table was built for another configuration; using it anyway"
                        );
                        diagnostics.warn(format!(
                            "atom table at '{}' was built for config_key={}",
                            path.display(),
                            stored.config_key
                        ));
                    }
                    diagnostics.note(format!("atom table loaded from '{}'", path.display()));
                    return Ok((stored.table, path.clone()));
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "atom table load failed; recomputing");
                    diagnostics.warn(format!(
                        "atom table at '{}' was unreadable ({err}); recomputed",
                        path.display()
                    ));
                    path.clone()
                }
            },
            Some(path) => path.clone(),
            None => self.config.cache_dir.join(timestamped_file_name()),
        };

        let (table, stats) =
            calculate_atom_metrics_with_stats(atom_config, self.provider, rng, &self.ctx)?;
        diagnostics.failed_trials = stats.failed_trials;
        if stats.failed_trials > 0 {
            diagnostics.warn(format!(
                "{} of {} atom trials failed",
                stats.failed_trials, stats.trials
            ));
        }

        ensure_parent_dir(&target)?;
        save_atom_table_file(&target, atom_config, &table, self.config.payload_codec)?;
        diagnostics.note(format!("atom table saved to '{}'", target.display()));
        Ok((table, target))
    }

    fn log_model(&self, model: &MetaModel, diagnostics: &mut Diagnostics) {
        if let Some(score) = model.training_score() {
            info!(method = %model.method(), score, "meta-learner training score");
            self.ctx.record_scalar("unify.train.score", score);
            diagnostics.training_score = Some(score);
        }
        if let Some(ratio) = model.explained_variance_ratio() {
            info!(method = %model.method(), ratio = ?ratio, "explained variance ratio");
            diagnostics.explained_variance_ratio = Some(ratio.to_vec());
        }
        if let Some(calibration) = model.calibration() {
            info!(
                x_min = calibration.x_min,
                x_max = calibration.x_max,
                slope = calibration.slope,
                "scale calibration fitted"
            );
        }
        match model {
            MetaModel::Linear(linear) => debug!(
                coefficients = ?linear.coefficients,
                intercept = linear.intercept,
                "linear meta-learner"
            ),
            MetaModel::Logistic(logistic) => debug!(
                coefficients = ?logistic.coefficients,
                intercept = logistic.intercept,
                iterations = logistic.iterations,
                "logistic meta-learner"
            ),
            MetaModel::Pca(_) | MetaModel::Lda(_) => {}
        }
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), ClaError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            std::fs::create_dir_all(parent).map_err(|err| {
                ClaError::resource_limit(format!(
                    "failed creating cache directory '{}': {err}",
                    parent.display()
                ))
            })
        }
        _ => Ok(()),
    }
}

/// One-call pipeline with default configuration.
///
/// `method` is parsed before any work starts, so an unknown tag fails
/// without computing or writing anything.
pub fn analyze<P: MetricProvider + ?Sized>(
    dataset: &Dataset,
    provider: &P,
    use_filter: bool,
    method: &str,
    cache_path: Option<&Path>,
) -> Result<AnalysisReport, ClaError> {
    let method: Method = method.parse()?;
    let config = AnalyzeConfig {
        method,
        use_filter,
        cache_path: cache_path.map(Path::to_path_buf),
        ..AnalyzeConfig::default()
    };
    Analyzer::new(provider, config)?.run(dataset)
}
