//! Datasets, fold splits and the mini-batch feeder.

pub mod dataset;
pub mod feeder;
pub mod folds;
pub mod normalize;
pub mod reader;

pub use dataset::{DataType, DataView, Dataset, Sample};
pub use feeder::{Batch, FeedOptions, MiniBatchFeeder};
pub use folds::FoldAssignment;
pub use normalize::Normalization;
pub use reader::{DatasetReader, FileReader, RawSample};
