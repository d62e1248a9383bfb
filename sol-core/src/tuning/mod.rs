//! Hyperparameter search: range grids, k-fold evaluation and the results cache.

pub mod cache;
pub mod cv;
pub mod grid;
pub mod params;

pub use cache::CvCache;
pub use cv::{CrossValidator, CvOptions, CvOutcome, CvResult};
pub use grid::{expand_grid, grid_size, parse_ranges};
pub use params::{HyperparamSet, MAX_GRID_SIZE, ParamRangeSpec};
