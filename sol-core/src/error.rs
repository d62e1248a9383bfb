//! Error types for the sol-core crate.
//!
//! Every failure carries the pipeline stage it came from, so callers can report
//! "which stage failed and why" without inspecting message text.

use thiserror::Error;

/// Top-level error type for training and cross-validation.
#[derive(Debug, Error)]
pub enum SolError {
    #[error("invalid range for '{param}': {message}")]
    InvalidRange { param: String, message: String },

    #[error("invalid parameter '{input}': {message}")]
    InvalidParam { input: String, message: String },

    #[error("invalid fold count {folds} for {samples} samples: {message}")]
    InvalidFoldCount {
        folds: usize,
        samples: usize,
        message: String,
    },

    #[error("failed to load dataset {path}: {message}")]
    DatasetLoad { path: String, message: String },

    #[error("training failed: {message}")]
    Training { message: String },

    #[error("corrupt results cache {path}: {message}")]
    CacheCorrupt { path: String, message: String },

    #[error("failed to write {path}: {message}")]
    Persist { path: String, message: String },

    #[error("conflicting configuration: {message}")]
    ConfigConflict { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl SolError {
    pub fn invalid_range(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRange {
            param: param.into(),
            message: message.into(),
        }
    }

    pub fn invalid_param(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParam {
            input: input.into(),
            message: message.into(),
        }
    }

    pub fn dataset(path: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Self::DatasetLoad {
            path: path.to_string(),
            message: message.into(),
        }
    }

    pub fn training(message: impl Into<String>) -> Self {
        Self::Training {
            message: message.into(),
        }
    }

    pub fn cache_corrupt(path: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Self::CacheCorrupt {
            path: path.to_string(),
            message: message.into(),
        }
    }

    pub fn persist(path: impl std::fmt::Display, message: impl std::fmt::Display) -> Self {
        Self::Persist {
            path: path.to_string(),
            message: message.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::ConfigConflict {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Pipeline stage that produced this error.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidRange { .. } | Self::InvalidParam { .. } => "expansion",
            Self::InvalidFoldCount { .. } => "splitting",
            Self::DatasetLoad { .. } => "dataset",
            Self::Training { .. } => "training",
            Self::CacheCorrupt { .. } => "cache",
            Self::Persist { .. } => "persist",
            Self::ConfigConflict { .. } | Self::Config { .. } => "config",
            Self::Io(_) | Self::Serde(_) => "io",
        }
    }

    /// Prefix a training error with the unit that raised it. Other kinds pass through.
    pub(crate) fn in_unit(self, unit: impl std::fmt::Display) -> Self {
        match self {
            Self::Training { message } => Self::Training {
                message: format!("{unit}: {message}"),
            },
            other => other,
        }
    }
}

impl From<figment::Error> for SolError {
    fn from(err: figment::Error) -> Self {
        Self::config(err.to_string())
    }
}
