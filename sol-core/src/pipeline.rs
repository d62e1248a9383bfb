//! End-to-end training run: optional grid search, final training, model save.

use crate::config::TrainConfig;
use crate::data::dataset::{DataView, Dataset};
use crate::data::folds::FoldAssignment;
use crate::data::reader::{DatasetReader, FileReader};
use crate::error::SolError;
use crate::learner::{BuiltinLearners, LearnerFactory, LearnerHandle, LearnerSpec, ModelArtifact};
use crate::logging::LogContext;
use crate::tuning::cv::CrossValidator;
use crate::tuning::grid::{expand_grid, parse_ranges};
use crate::tuning::params::HyperparamSet;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// What to train on and where to put the result.
#[derive(Debug, Clone)]
pub struct TrainingRequest {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    /// Previously saved model to continue from.
    pub warm_start: Option<PathBuf>,
    pub config: TrainConfig,
}

impl TrainingRequest {
    pub fn new(input: impl Into<PathBuf>, config: TrainConfig) -> Self {
        Self {
            input: input.into(),
            output: None,
            warm_start: None,
            config,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    pub dataset: String,
    pub algorithm: String,
    pub params: HyperparamSet,
    /// `1 - online error rate` over the final training run.
    pub accuracy: f64,
    pub elapsed_secs: f64,
    pub sparsity: f64,
    pub samples: usize,
    pub model: Option<ModelArtifact>,
    pub cv_from_cache: bool,
}

pub struct TrainingPipeline {
    request: TrainingRequest,
    reader: Arc<dyn DatasetReader>,
    factory: Arc<dyn LearnerFactory>,
}

impl TrainingPipeline {
    pub fn new(request: TrainingRequest) -> Self {
        Self {
            request,
            reader: Arc::new(FileReader),
            factory: Arc::new(BuiltinLearners),
        }
    }

    pub fn with_reader(mut self, reader: Arc<dyn DatasetReader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_factory(mut self, factory: Arc<dyn LearnerFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn request(&self) -> &TrainingRequest {
        &self.request
    }

    pub async fn run(&self, ctx: &LogContext) -> Result<TrainingSummary, SolError> {
        let config = &self.request.config;
        config.validate()?;

        // Everything that can be checked without touching data goes first.
        let ranges = parse_ranges(config.cv.as_slice())?;
        let overrides = HyperparamSet::parse_overrides(config.params.as_slice())?;
        let candidates = if ranges.is_empty() {
            None
        } else {
            FoldAssignment::check_fold_count(config.fold_count)?;
            Some(expand_grid(&ranges, &overrides)?)
        };

        let dataset = self.load_dataset().instrument(ctx.stage("dataset")).await?;

        let mut cv_from_cache = false;
        let params = if let Some(candidates) = candidates {
            let cv = CrossValidator::new(
                Arc::clone(&dataset),
                config.fold_count,
                candidates,
                Arc::clone(&self.factory),
                config.cv_options(),
            )?;
            let outcome = cv.resolve(&cv.cache_path(), config.retrain, ctx).await?;
            cv_from_cache = outcome.from_cache;
            let best = outcome
                .best()
                .ok_or_else(|| SolError::training("cross-validation produced no results"))?;
            tracing::info!(
                parent: ctx.span(),
                params = %best.params,
                accuracy = best.mean_accuracy,
                cached = cv_from_cache,
                "Best parameters"
            );
            best.params.overlay(&overrides)
        } else {
            overrides.clone()
        };

        let span = ctx.stage("train");
        let spec = LearnerSpec {
            algorithm: config.algorithm.clone(),
            class_count: dataset.class_count(),
            batch_size: config.batch_size,
            buffer_depth: config.buffer_depth,
            normalization: config.normalization,
        };
        let mut learner = LearnerHandle::open(
            self.factory.as_ref(),
            spec,
            params.clone(),
            self.request.warm_start.as_deref(),
        )?;

        tracing::info!(parent: &span, params = %params, passes = config.passes, "Training");
        let started = Instant::now();
        let accuracy = learner
            .train_on(DataView::all(Arc::clone(&dataset)), config.passes)
            .instrument(span.clone())
            .await?;
        let elapsed_secs = started.elapsed().as_secs_f64();
        let sparsity = learner.sparsity();

        let model = match &self.request.output {
            Some(path) => Some(learner.save(path)?),
            None => None,
        };

        tracing::info!(
            parent: &span,
            accuracy,
            elapsed_secs,
            sparsity,
            "Training finished"
        );

        Ok(TrainingSummary {
            dataset: dataset.name().to_string(),
            algorithm: config.algorithm.clone(),
            params,
            accuracy,
            elapsed_secs,
            sparsity,
            samples: dataset.sample_count(),
            model,
            cv_from_cache,
        })
    }

    async fn load_dataset(&self) -> Result<Arc<Dataset>, SolError> {
        let reader = Arc::clone(&self.reader);
        let path = self.request.input.clone();
        let data_type = self.request.config.data_type;
        let cache_dir = self.request.config.cache_dir.clone();
        let display = path.display().to_string();

        let dataset = tokio::task::spawn_blocking(move || {
            Dataset::load(&path, data_type, reader.as_ref(), cache_dir.as_deref())
        })
        .await
        .map_err(|e| SolError::dataset(&display, format!("reader task failed: {e}")))??;
        Ok(Arc::new(dataset))
    }
}
