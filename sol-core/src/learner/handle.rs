//! Scoped learner handle.
//!
//! The handle owns exactly one learner and releases it when dropped, whether the
//! surrounding work finished or bailed out with `?`.

use crate::data::dataset::DataView;
use crate::data::feeder::{FeedOptions, MiniBatchFeeder};
use crate::data::normalize::Normalization;
use crate::error::SolError;
use crate::learner::{Learner, LearnerFactory};
use crate::tuning::params::HyperparamSet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::runtime::{Handle, RuntimeFlavor};

/// Fixed configuration of one handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerSpec {
    pub algorithm: String,
    pub class_count: usize,
    pub batch_size: usize,
    pub buffer_depth: usize,
    pub normalization: Normalization,
}

impl LearnerSpec {
    fn feed_options(&self, passes: usize) -> FeedOptions {
        FeedOptions {
            batch_size: self.batch_size,
            buffer_depth: self.buffer_depth,
            passes,
            normalization: self.normalization,
        }
    }
}

/// On-disk form of a trained model.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelFile {
    algorithm: String,
    class_count: usize,
    normalization: Normalization,
    params: HyperparamSet,
    state: serde_json::Value,
}

/// A saved model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub path: PathBuf,
    pub algorithm: String,
    pub sparsity: f64,
}

pub struct LearnerHandle {
    spec: LearnerSpec,
    params: HyperparamSet,
    learner: Box<dyn Learner>,
}

impl LearnerHandle {
    /// Create the learner, optionally restoring a previously saved model.
    pub fn open(
        factory: &dyn LearnerFactory,
        spec: LearnerSpec,
        params: HyperparamSet,
        warm_start: Option<&Path>,
    ) -> Result<Self, SolError> {
        let learner = factory.create(&spec.algorithm, spec.class_count, &params)?;
        let mut handle = Self {
            spec,
            params,
            learner,
        };
        if let Some(path) = warm_start {
            handle.restore(path)?;
        }
        tracing::debug!(
            algorithm = %handle.spec.algorithm,
            params = %handle.params,
            "Opened learner"
        );
        Ok(handle)
    }

    pub fn spec(&self) -> &LearnerSpec {
        &self.spec
    }

    pub fn params(&self) -> &HyperparamSet {
        &self.params
    }

    /// Consume `feed`, updating on every batch. Returns `1 - online error rate`.
    pub async fn train_on_feed(&mut self, mut feed: MiniBatchFeeder) -> Result<f64, SolError> {
        let mut seen = 0usize;
        let mut mistakes = 0usize;
        while let Some(batch) = feed.next_batch().await? {
            mistakes += compute(|| self.learner.train_batch(&batch))?;
            seen += batch.len();
        }
        accuracy(seen, mistakes)
    }

    /// Consume `feed` without updating. Returns `1 - error rate`.
    pub async fn evaluate(&self, mut feed: MiniBatchFeeder) -> Result<f64, SolError> {
        let mut seen = 0usize;
        let mut mistakes = 0usize;
        while let Some(batch) = feed.next_batch().await? {
            mistakes += compute(|| self.learner.evaluate_batch(&batch))?;
            seen += batch.len();
        }
        accuracy(seen, mistakes)
    }

    /// Train for `passes` passes over `view` using this handle's feed settings.
    pub async fn train_on(&mut self, view: DataView, passes: usize) -> Result<f64, SolError> {
        let feed = MiniBatchFeeder::spawn(view, self.spec.feed_options(passes))?;
        self.train_on_feed(feed).await
    }

    /// Evaluate one pass over `view` using this handle's feed settings.
    pub async fn evaluate_on(&self, view: DataView) -> Result<f64, SolError> {
        let feed = MiniBatchFeeder::spawn(view, self.spec.feed_options(1))?;
        self.evaluate(feed).await
    }

    pub fn sparsity(&self) -> f64 {
        self.learner.sparsity()
    }

    /// Write the model to `path`. The file only appears once fully written.
    pub fn save(&self, path: &Path) -> Result<ModelArtifact, SolError> {
        let file = ModelFile {
            algorithm: self.spec.algorithm.clone(),
            class_count: self.spec.class_count,
            normalization: self.spec.normalization,
            params: self.params.clone(),
            state: self.learner.export_state()?,
        };
        let content = serde_json::to_string_pretty(&file)
            .map_err(|e| SolError::persist(path.display(), e))?;

        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let tmp = path.with_extension("tmp");
            std::fs::write(&tmp, &content)?;
            std::fs::rename(&tmp, path)
        };
        write().map_err(|e| SolError::persist(path.display(), e))?;

        tracing::info!(path = %path.display(), "Saved model");
        Ok(ModelArtifact {
            path: path.to_path_buf(),
            algorithm: self.spec.algorithm.clone(),
            sparsity: self.sparsity(),
        })
    }

    fn restore(&mut self, path: &Path) -> Result<(), SolError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SolError::conflict(format!("cannot read warm-start model {}: {e}", path.display()))
        })?;
        let file: ModelFile = serde_json::from_str(&content).map_err(|e| {
            SolError::conflict(format!("{} is not a saved model: {e}", path.display()))
        })?;

        if file.algorithm != self.spec.algorithm {
            return Err(SolError::conflict(format!(
                "model {} was trained with '{}' but '{}' was requested",
                path.display(),
                file.algorithm,
                self.spec.algorithm
            )));
        }
        if file.class_count != self.spec.class_count {
            return Err(SolError::conflict(format!(
                "model {} has {} classes but the dataset has {}",
                path.display(),
                file.class_count,
                self.spec.class_count
            )));
        }
        if file.normalization != self.spec.normalization {
            return Err(SolError::conflict(format!(
                "model {} expects {} normalization but {} was requested",
                path.display(),
                file.normalization,
                self.spec.normalization
            )));
        }

        self.learner.import_state(file.state)?;
        tracing::info!(path = %path.display(), "Restored model");
        Ok(())
    }
}

impl Drop for LearnerHandle {
    fn drop(&mut self) {
        self.learner.release();
        tracing::trace!(algorithm = %self.spec.algorithm, "Released learner");
    }
}

/// Run learner updates off the async scheduler so feeders and sibling units keep
/// making progress. Current-thread runtimes cannot hand the worker off.
fn compute<T>(work: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|h| h.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(work),
        _ => work(),
    }
}

fn accuracy(seen: usize, mistakes: usize) -> Result<f64, SolError> {
    if seen == 0 {
        return Err(SolError::training("feed produced no samples"));
    }
    Ok(1.0 - mistakes as f64 / seen as f64)
}
