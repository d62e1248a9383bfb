//! # sol-core
//!
//! Online-learning training pipeline: dataset loading, grid-search
//! cross-validation with a persistent results cache, a bounded mini-batch
//! feeder, and scoped learners.

pub mod config;
pub mod data;
pub mod error;
pub mod learner;
pub mod logging;
pub mod pipeline;
pub mod tuning;

pub use config::{ConfigOverrides, TrainConfig, load_config};
pub use data::{DataType, Dataset, Normalization};
pub use error::SolError;
pub use learner::{BuiltinLearners, Learner, LearnerFactory, LearnerHandle, ModelArtifact};
pub use logging::LogContext;
pub use pipeline::{TrainingPipeline, TrainingRequest, TrainingSummary};
pub use tuning::{CrossValidator, CvOutcome, CvResult, HyperparamSet, ParamRangeSpec};
