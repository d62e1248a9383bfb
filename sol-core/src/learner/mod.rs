//! Learner capability and the scoped handle that drives it.

pub mod handle;
pub mod linear;
pub mod registry;

pub use handle::{LearnerHandle, LearnerSpec, ModelArtifact};
pub use registry::BuiltinLearners;

use crate::data::feeder::Batch;
use crate::error::SolError;
use crate::tuning::params::HyperparamSet;

/// One trainable model instance.
pub trait Learner: Send + Sync {
    /// Update on every sample of `batch`, returning how many were mispredicted
    /// before their update.
    fn train_batch(&mut self, batch: &Batch) -> Result<usize, SolError>;

    /// Count mispredictions without touching the model.
    fn evaluate_batch(&self, batch: &Batch) -> Result<usize, SolError>;

    /// Fraction of weights that are exactly zero.
    fn sparsity(&self) -> f64;

    fn export_state(&self) -> Result<serde_json::Value, SolError>;

    fn import_state(&mut self, state: serde_json::Value) -> Result<(), SolError>;

    /// Free anything the learner holds outside its own memory. Called once by the
    /// owning handle when it goes out of scope.
    fn release(&mut self) {}
}

/// Creates learners by algorithm name.
pub trait LearnerFactory: Send + Sync {
    /// Fails with `SolError::Training` for unknown algorithms or parameters.
    fn create(
        &self,
        algorithm: &str,
        class_count: usize,
        params: &HyperparamSet,
    ) -> Result<Box<dyn Learner>, SolError>;
}
