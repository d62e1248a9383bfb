//! Deterministic k-fold assignment.

use crate::data::dataset::{DataView, Dataset};
use crate::error::SolError;
use std::sync::Arc;

/// Sample `i` belongs to fold `i % k`.
///
/// The scheme depends only on `n` and `k`, so a cached search stays valid for the
/// same dataset and fold count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldAssignment {
    samples: usize,
    folds: usize,
}

impl FoldAssignment {
    /// Validate only the fold count, before the sample count is known.
    pub fn check_fold_count(folds: usize) -> Result<(), SolError> {
        if folds < 2 {
            return Err(SolError::InvalidFoldCount {
                folds,
                samples: 0,
                message: "at least 2 folds are required".to_string(),
            });
        }
        Ok(())
    }

    pub fn split(samples: usize, folds: usize) -> Result<Self, SolError> {
        Self::check_fold_count(folds).map_err(|_| SolError::InvalidFoldCount {
            folds,
            samples,
            message: "at least 2 folds are required".to_string(),
        })?;
        if folds > samples {
            return Err(SolError::InvalidFoldCount {
                folds,
                samples,
                message: "more folds than samples".to_string(),
            });
        }
        Ok(Self { samples, folds })
    }

    pub fn fold_count(&self) -> usize {
        self.folds
    }

    pub fn sample_count(&self) -> usize {
        self.samples
    }

    pub fn fold_of(&self, index: usize) -> usize {
        index % self.folds
    }

    pub fn fold_sizes(&self) -> Vec<usize> {
        let base = self.samples / self.folds;
        let extra = self.samples % self.folds;
        (0..self.folds)
            .map(|f| base + usize::from(f < extra))
            .collect()
    }

    /// Indices outside `fold`, ascending.
    pub fn training_indices(&self, fold: usize) -> Vec<usize> {
        (0..self.samples).filter(|&i| self.fold_of(i) != fold).collect()
    }

    /// Indices inside `fold`, ascending.
    pub fn validation_indices(&self, fold: usize) -> Vec<usize> {
        (fold..self.samples).step_by(self.folds).collect()
    }

    pub fn training_view(&self, dataset: &Arc<Dataset>, fold: usize) -> DataView {
        DataView::subset(dataset.clone(), self.training_indices(fold))
    }

    pub fn validation_view(&self, dataset: &Arc<Dataset>, fold: usize) -> DataView {
        DataView::subset(dataset.clone(), self.validation_indices(fold))
    }
}
