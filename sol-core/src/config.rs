//! Training configuration.
//!
//! Layers, lowest precedence first: built-in defaults, the user config file
//! (`<config_dir>/sol/config.toml`), the workspace file (`.sol/config.toml`), an
//! explicit `--config` file, `SOL_*` environment variables, and finally values
//! given on the command line.

use crate::data::dataset::DataType;
use crate::data::feeder::FeedOptions;
use crate::data::normalize::Normalization;
use crate::error::SolError;
use crate::tuning::cv::CvOptions;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub algorithm: String,
    pub data_type: DataType,
    pub passes: usize,
    pub normalization: Normalization,
    pub batch_size: usize,
    /// Batches the feeder may queue ahead of the learner.
    pub buffer_depth: usize,
    pub fold_count: usize,
    /// Ranges to search, as `name=start:step:end`.
    pub cv: Vec<String>,
    /// Fixed parameters, as `name=value`.
    pub params: Vec<String>,
    /// Ignore and overwrite cached cross-validation results.
    pub retrain: bool,
    /// Concurrent cross-validation units. Defaults to the available parallelism.
    pub cv_workers: Option<usize>,
    /// Root for per-dataset work directories. Defaults to `.sol/` beside the input.
    pub cache_dir: Option<PathBuf>,
    pub log_level: String,
    pub log_file: PathBuf,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            algorithm: "ogd".to_string(),
            data_type: DataType::Svm,
            passes: 1,
            normalization: Normalization::None,
            batch_size: 256,
            buffer_depth: 2,
            fold_count: 5,
            cv: Vec::new(),
            params: Vec::new(),
            retrain: false,
            cv_workers: None,
            cache_dir: None,
            log_level: "info".to_string(),
            log_file: PathBuf::from("sol-train.log"),
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<(), SolError> {
        if self.algorithm.trim().is_empty() {
            return Err(SolError::config("algorithm must not be empty"));
        }
        self.feed_options().validate()?;
        if self.cv_workers == Some(0) {
            return Err(SolError::config("cv_workers must be at least 1"));
        }
        if self.log_level.trim().is_empty() {
            return Err(SolError::config("log_level must not be empty"));
        }
        Ok(())
    }

    pub fn feed_options(&self) -> FeedOptions {
        FeedOptions {
            batch_size: self.batch_size,
            buffer_depth: self.buffer_depth,
            passes: self.passes,
            normalization: self.normalization,
        }
    }

    pub fn cv_options(&self) -> CvOptions {
        CvOptions {
            algorithm: self.algorithm.clone(),
            batch_size: self.batch_size,
            buffer_depth: self.buffer_depth,
            passes: self.passes,
            normalization: self.normalization,
            max_workers: self.cv_workers.unwrap_or_else(CvOptions::default_workers),
        }
    }
}

/// Values supplied on the command line. Unset fields leave lower layers alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalization: Option<Normalization>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_depth: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fold_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cv: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrain: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cv_workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

/// Merge every configuration layer and validate the result.
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<TrainConfig, SolError> {
    let mut figment = Figment::from(Serialized::defaults(TrainConfig::default()));

    if let Some(dirs) = directories::ProjectDirs::from("dev", "sol", "sol") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".sol").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(SolError::config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        figment = figment.merge(Toml::file(path));
    }

    // SOL_BATCH_SIZE, SOL_CV_WORKERS, ...
    figment = figment.merge(Env::prefixed("SOL_").split("__"));
    figment = figment.merge(Serialized::defaults(overrides));

    let config: TrainConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}
