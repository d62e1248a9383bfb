//! K-fold cross-validation over a candidate grid.

use crate::data::dataset::{DataView, Dataset};
use crate::data::folds::FoldAssignment;
use crate::data::normalize::Normalization;
use crate::error::SolError;
use crate::learner::{LearnerFactory, LearnerHandle, LearnerSpec};
use crate::logging::LogContext;
use crate::tuning::cache::CvCache;
use crate::tuning::params::HyperparamSet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::Instrument;

/// Validation score of one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvResult {
    pub mean_accuracy: f64,
    pub fold_accuracies: Vec<f64>,
    pub params: HyperparamSet,
}

impl CvResult {
    pub fn from_folds(params: HyperparamSet, fold_accuracies: Vec<f64>) -> Self {
        let mean_accuracy = if fold_accuracies.is_empty() {
            0.0
        } else {
            fold_accuracies.iter().sum::<f64>() / fold_accuracies.len() as f64
        };
        Self {
            mean_accuracy,
            fold_accuracies,
            params,
        }
    }
}

/// Order results best first. Equal means keep their enumeration order.
pub fn rank_results(results: &mut [CvResult]) {
    results.sort_by(|a, b| b.mean_accuracy.total_cmp(&a.mean_accuracy));
}

#[derive(Debug, Clone)]
pub struct CvOptions {
    pub algorithm: String,
    pub batch_size: usize,
    pub buffer_depth: usize,
    /// Training passes per fold. Validation always runs one pass.
    pub passes: usize,
    pub normalization: Normalization,
    /// Upper bound on concurrently running (candidate, fold) units.
    pub max_workers: usize,
}

impl CvOptions {
    pub fn default_workers() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Results of a search, and whether they came from the cache.
#[derive(Debug, Clone)]
pub struct CvOutcome {
    pub results: Vec<CvResult>,
    pub from_cache: bool,
}

impl CvOutcome {
    pub fn best(&self) -> Option<&CvResult> {
        self.results.first()
    }
}

pub struct CrossValidator {
    dataset: Arc<Dataset>,
    folds: FoldAssignment,
    /// (training, validation) per fold, shared by every candidate.
    views: Vec<(DataView, DataView)>,
    candidates: Vec<HyperparamSet>,
    factory: Arc<dyn LearnerFactory>,
    options: CvOptions,
}

impl CrossValidator {
    pub fn new(
        dataset: Arc<Dataset>,
        fold_count: usize,
        candidates: Vec<HyperparamSet>,
        factory: Arc<dyn LearnerFactory>,
        options: CvOptions,
    ) -> Result<Self, SolError> {
        let folds = FoldAssignment::split(dataset.sample_count(), fold_count)?;
        if candidates.is_empty() {
            return Err(SolError::config("cross-validation needs at least one candidate"));
        }
        if options.max_workers == 0 {
            return Err(SolError::config("cv worker count must be at least 1"));
        }
        let views = (0..folds.fold_count())
            .map(|f| {
                (
                    folds.training_view(&dataset, f),
                    folds.validation_view(&dataset, f),
                )
            })
            .collect();
        Ok(Self {
            dataset,
            folds,
            views,
            candidates,
            factory,
            options,
        })
    }

    /// `<work_dir>/cv-<algorithm>.toml`
    pub fn cache_path(&self) -> PathBuf {
        self.dataset
            .work_dir()
            .join(format!("cv-{}.toml", self.options.algorithm))
    }

    pub fn candidates(&self) -> &[HyperparamSet] {
        &self.candidates
    }

    /// Evaluate every candidate on every fold and rank the results.
    ///
    /// Units run concurrently up to `max_workers`. The first failing unit fails
    /// the whole search and the units still pending are aborted.
    pub async fn run(&self, ctx: &LogContext) -> Result<Vec<CvResult>, SolError> {
        let span = ctx.stage("cross_validation");
        let k = self.folds.fold_count();
        tracing::info!(
            parent: &span,
            candidates = self.candidates.len(),
            folds = k,
            workers = self.options.max_workers,
            "Starting cross-validation"
        );

        let semaphore = Arc::new(Semaphore::new(self.options.max_workers));
        let mut units = Vec::with_capacity(self.candidates.len() * k);

        for (c, params) in self.candidates.iter().enumerate() {
            for fold in 0..k {
                let (train, valid) = self.views[fold].clone();
                let factory = Arc::clone(&self.factory);
                let spec = self.learner_spec();
                let params = params.clone();
                let passes = self.options.passes;
                let sem = Arc::clone(&semaphore);
                let unit_span =
                    tracing::debug_span!(parent: &span, "unit", candidate = c, fold);

                let handle = tokio::spawn(
                    async move {
                        let _permit = sem
                            .acquire_owned()
                            .await
                            .map_err(|_| SolError::training("worker pool closed"))?;
                        let mut learner =
                            LearnerHandle::open(factory.as_ref(), spec, params, None)?;
                        learner.train_on(train, passes).await?;
                        learner.evaluate_on(valid).await
                    }
                    .instrument(unit_span),
                );
                units.push((c, fold, handle));
            }
        }

        let mut scores = vec![vec![0.0; k]; self.candidates.len()];
        let mut pending = units.into_iter();
        while let Some((c, fold, handle)) = pending.next() {
            let unit = format!(
                "candidate {} ({}), fold {}",
                c + 1,
                self.candidates[c],
                fold + 1
            );
            let outcome = match handle.await {
                Ok(result) => result.map_err(|e| e.in_unit(&unit)),
                Err(join) => Err(SolError::training(format!("{unit}: task failed: {join}"))),
            };
            match outcome {
                Ok(accuracy) => {
                    tracing::debug!(parent: &span, candidate = c, fold, accuracy, "Fold finished");
                    scores[c][fold] = accuracy;
                }
                Err(e) => {
                    for (_, _, rest) in pending {
                        rest.abort();
                    }
                    tracing::warn!(parent: &span, error = %e, "Cross-validation failed");
                    return Err(e);
                }
            }
        }

        let mut results: Vec<CvResult> = self
            .candidates
            .iter()
            .cloned()
            .zip(scores)
            .map(|(params, folds)| CvResult::from_folds(params, folds))
            .collect();
        rank_results(&mut results);

        if let Some(best) = results.first() {
            tracing::info!(
                parent: &span,
                best = %best.params,
                accuracy = best.mean_accuracy,
                "Cross-validation finished"
            );
        }
        Ok(results)
    }

    /// Use cached results when present, otherwise run and store them.
    ///
    /// With `retrain` the cache is ignored and overwritten.
    pub async fn resolve(
        &self,
        cache_path: &Path,
        retrain: bool,
        ctx: &LogContext,
    ) -> Result<CvOutcome, SolError> {
        if !retrain && cache_path.exists() {
            let cache = CvCache::load(cache_path)?;
            if cache.algorithm != self.options.algorithm
                || cache.dataset != self.dataset.name()
                || cache.folds != self.folds.fold_count()
            {
                tracing::warn!(
                    parent: ctx.span(),
                    path = %cache_path.display(),
                    cached_algorithm = %cache.algorithm,
                    cached_dataset = %cache.dataset,
                    cached_folds = cache.folds,
                    "Cached results were produced under different settings"
                );
            }
            return Ok(CvOutcome {
                results: cache.results,
                from_cache: true,
            });
        }

        let results = self.run(ctx).await?;
        CvCache::new(
            self.options.algorithm.clone(),
            self.dataset.name(),
            self.folds.fold_count(),
            results.clone(),
        )
        .save(cache_path)?;
        Ok(CvOutcome {
            results,
            from_cache: false,
        })
    }

    fn learner_spec(&self) -> LearnerSpec {
        LearnerSpec {
            algorithm: self.options.algorithm.clone(),
            class_count: self.dataset.class_count(),
            batch_size: self.options.batch_size,
            buffer_depth: self.options.buffer_depth,
            normalization: self.options.normalization,
        }
    }
}
