//! On-disk cache of cross-validation results.
//!
//! The file is TOML: a small header followed by one `[[results]]` table per
//! candidate, best first. Loading never falls back to recomputation; a file that
//! exists but is not well formed is reported as corrupt.

use crate::error::SolError;
use crate::tuning::cv::CvResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

const MEAN_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvCache {
    pub algorithm: String,
    pub dataset: String,
    pub folds: usize,
    pub created_at: DateTime<Utc>,
    pub results: Vec<CvResult>,
}

impl CvCache {
    pub fn new(
        algorithm: impl Into<String>,
        dataset: impl Into<String>,
        folds: usize,
        results: Vec<CvResult>,
    ) -> Self {
        Self {
            algorithm: algorithm.into(),
            dataset: dataset.into(),
            folds,
            created_at: Utc::now(),
            results,
        }
    }

    pub fn best(&self) -> Option<&CvResult> {
        self.results.first()
    }

    pub fn to_toml_string(&self) -> Result<String, SolError> {
        toml::to_string(self).map_err(|e| SolError::config(format!("cannot encode results: {e}")))
    }

    /// Parse and validate cache text. `origin` only labels errors.
    pub fn parse(text: &str, origin: &Path) -> Result<Self, SolError> {
        let cache: Self = toml::from_str(text)
            .map_err(|e| SolError::cache_corrupt(origin.display(), e.message().to_string()))?;
        cache.check(origin)?;
        Ok(cache)
    }

    pub fn load(path: &Path) -> Result<Self, SolError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SolError::cache_corrupt(path.display(), e.to_string()))?;
        let cache = Self::parse(&text, path)?;
        tracing::info!(
            path = %path.display(),
            candidates = cache.results.len(),
            "Loaded cross-validation cache"
        );
        Ok(cache)
    }

    /// Write atomically, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<(), SolError> {
        let content = self.to_toml_string()?;
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let tmp = path.with_extension("tmp");
            std::fs::write(&tmp, &content)?;
            std::fs::rename(&tmp, path)
        };
        write().map_err(|e| SolError::persist(path.display(), e))?;
        tracing::info!(path = %path.display(), "Saved cross-validation cache");
        Ok(())
    }

    fn check(&self, origin: &Path) -> Result<(), SolError> {
        let corrupt = |msg: String| SolError::cache_corrupt(origin.display(), msg);

        if self.results.is_empty() {
            return Err(corrupt("no results".to_string()));
        }
        for (i, r) in self.results.iter().enumerate() {
            let n = i + 1;
            if r.fold_accuracies.is_empty() {
                return Err(corrupt(format!("result {n} has no fold accuracies")));
            }
            if r.fold_accuracies.len() != self.folds {
                return Err(corrupt(format!(
                    "result {n} has {} fold accuracies, header says {} folds",
                    r.fold_accuracies.len(),
                    self.folds
                )));
            }
            let in_range = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
            if !in_range(r.mean_accuracy) || !r.fold_accuracies.iter().copied().all(in_range) {
                return Err(corrupt(format!("result {n} has an accuracy outside [0, 1]")));
            }
            let mean = r.fold_accuracies.iter().sum::<f64>() / r.fold_accuracies.len() as f64;
            if (mean - r.mean_accuracy).abs() > MEAN_TOLERANCE {
                return Err(corrupt(format!(
                    "result {n} mean {} does not match its folds ({mean})",
                    r.mean_accuracy
                )));
            }
        }
        if self
            .results
            .windows(2)
            .any(|w| w[0].mean_accuracy < w[1].mean_accuracy)
        {
            return Err(corrupt("results are not ordered best first".to_string()));
        }
        Ok(())
    }
}
