//! Dataset handle: a named, typed, immutable set of samples plus its metadata.

use crate::data::reader::{DatasetReader, RawSample};
use crate::error::SolError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// On-disk encoding of a training file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    #[default]
    Svm,
    #[serde(alias = "bin")]
    Binary,
    Csv,
}

impl FromStr for DataType {
    type Err = SolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "svm" | "libsvm" => Ok(Self::Svm),
            "bin" | "binary" => Ok(Self::Binary),
            "csv" => Ok(Self::Csv),
            other => Err(SolError::config(format!(
                "unknown data type '{other}' (expected svm, bin or csv)"
            ))),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Svm => "svm",
            Self::Binary => "bin",
            Self::Csv => "csv",
        })
    }
}

/// A sample with its label mapped to a class index in `[0, class_count)`.
///
/// Features are sparse `(index, value)` pairs with `index >= 1`; index 0 is reserved
/// for the learner's bias term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub label: usize,
    pub features: Vec<(u32, f32)>,
}

/// Immutable dataset shared read-only by folds and feeders.
#[derive(Debug)]
pub struct Dataset {
    name: String,
    path: PathBuf,
    data_type: DataType,
    labels: Vec<i32>,
    work_dir: PathBuf,
    samples: Arc<[Sample]>,
}

impl Dataset {
    /// Read `path` with `reader` and build the handle.
    ///
    /// The work directory is `<cache_dir>/<name>` when a cache directory is given,
    /// else `<parent of path>/.sol/<name>`. It is not created here.
    pub fn load(
        path: &Path,
        data_type: DataType,
        reader: &dyn DatasetReader,
        cache_dir: Option<&Path>,
    ) -> Result<Self, SolError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| SolError::dataset(path.display(), "path has no file name"))?;
        let raw = reader.read(path, data_type)?;
        let work_dir = match cache_dir {
            Some(dir) => dir.join(&name),
            None => path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(".sol")
                .join(&name),
        };

        let dataset = Self::from_raw(name, path.to_path_buf(), data_type, raw, work_dir);
        tracing::info!(
            dataset = %dataset.name,
            samples = dataset.sample_count(),
            classes = dataset.class_count(),
            data_type = %data_type,
            "Loaded dataset"
        );
        Ok(dataset)
    }

    /// Build a dataset from already-parsed samples, mapping raw labels to class
    /// indices in ascending label order.
    pub fn from_raw(
        name: impl Into<String>,
        path: PathBuf,
        data_type: DataType,
        raw: Vec<RawSample>,
        work_dir: PathBuf,
    ) -> Self {
        let labels: Vec<i32> = raw
            .iter()
            .map(|s| s.label)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let samples: Arc<[Sample]> = raw
            .into_iter()
            .map(|s| Sample {
                // labels holds every raw label, so the search always succeeds
                label: labels.binary_search(&s.label).unwrap_or_default(),
                features: s.features,
            })
            .collect();

        Self {
            name: name.into(),
            path,
            data_type,
            labels,
            work_dir,
            samples,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Number of distinct labels, never less than 1.
    pub fn class_count(&self) -> usize {
        self.labels.len().max(1)
    }

    /// Distinct raw labels; position is the class index.
    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

/// A read-only view over all or some samples of a shared dataset.
#[derive(Debug, Clone)]
pub struct DataView {
    dataset: Arc<Dataset>,
    indices: Option<Arc<[usize]>>,
}

impl DataView {
    pub fn all(dataset: Arc<Dataset>) -> Self {
        Self {
            dataset,
            indices: None,
        }
    }

    /// View over `indices`, in the given order. Out-of-range indices are dropped.
    pub fn subset(dataset: Arc<Dataset>, indices: impl Into<Arc<[usize]>>) -> Self {
        let indices: Arc<[usize]> = indices.into();
        let n = dataset.sample_count();
        let indices = if indices.iter().all(|&i| i < n) {
            indices
        } else {
            indices.iter().copied().filter(|&i| i < n).collect()
        };
        Self {
            dataset,
            indices: Some(indices),
        }
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    /// Selected positions, or `None` for a view over the whole dataset.
    pub fn indices(&self) -> Option<&Arc<[usize]>> {
        self.indices.as_ref()
    }

    pub fn len(&self) -> usize {
        match &self.indices {
            Some(idx) => idx.len(),
            None => self.dataset.sample_count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample at position `pos` of the view.
    pub fn get(&self, pos: usize) -> Option<&Sample> {
        let samples = self.dataset.samples();
        match &self.indices {
            Some(idx) => idx.get(pos).and_then(|&i| samples.get(i)),
            None => samples.get(pos),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> + '_ {
        (0..self.len()).filter_map(move |pos| self.get(pos))
    }
}
