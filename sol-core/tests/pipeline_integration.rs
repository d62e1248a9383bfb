//! Integration tests for the training pipeline.
//!
//! These run the full flow against LIBSVM files in a temp directory, with a
//! factory that counts how many learners get created.

use pretty_assertions::assert_eq;
use sol_core::data::reader::{DatasetReader, FileReader, RawSample};
use sol_core::learner::{BuiltinLearners, Learner, LearnerFactory};
use sol_core::{
    DataType, HyperparamSet, LogContext, SolError, TrainConfig, TrainingPipeline,
    TrainingRequest,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct CountingFactory {
    created: AtomicUsize,
}

impl CountingFactory {
    fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl LearnerFactory for CountingFactory {
    fn create(
        &self,
        algorithm: &str,
        class_count: usize,
        params: &HyperparamSet,
    ) -> Result<Box<dyn Learner>, SolError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        BuiltinLearners.create(algorithm, class_count, params)
    }
}

#[derive(Default)]
struct CountingReader {
    reads: AtomicUsize,
}

impl DatasetReader for CountingReader {
    fn read(&self, path: &Path, data_type: DataType) -> Result<Vec<RawSample>, SolError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        FileReader.read(path, data_type)
    }
}

/// 30 linearly separable samples on feature 1, with a constant feature 2.
fn write_dataset(dir: &Path) -> PathBuf {
    let path = dir.join("train.svm");
    let mut text = String::new();
    for i in 0..30 {
        if i % 2 == 0 {
            text.push_str(&format!("+1 1:{}.0 2:0.5\n", 1 + i % 3));
        } else {
            text.push_str(&format!("-1 1:-{}.0 2:0.5\n", 1 + i % 3));
        }
    }
    std::fs::write(&path, text).unwrap();
    path
}

fn cv_config(dir: &Path) -> TrainConfig {
    TrainConfig {
        algorithm: "ogd".into(),
        batch_size: 4,
        fold_count: 3,
        cv: vec!["eta=0.1:0.1:0.3".into()],
        cv_workers: Some(2),
        cache_dir: Some(dir.join("cache")),
        ..Default::default()
    }
}

fn pipeline(request: TrainingRequest, factory: Arc<CountingFactory>) -> TrainingPipeline {
    TrainingPipeline::new(request).with_factory(factory)
}

#[tokio::test]
async fn test_second_run_uses_cache() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_dataset(dir.path());
    let ctx = LogContext::new("integration");

    let factory = Arc::new(CountingFactory::default());
    let first = pipeline(TrainingRequest::new(&input, cv_config(dir.path())), factory.clone())
        .run(&ctx)
        .await
        .unwrap();
    assert!(!first.cv_from_cache);
    // 3 candidates x 3 folds, plus the final learner
    assert_eq!(factory.created(), 10);
    assert!(
        dir.path()
            .join("cache")
            .join("train.svm")
            .join("cv-ogd.toml")
            .exists()
    );

    let factory = Arc::new(CountingFactory::default());
    let second = pipeline(TrainingRequest::new(&input, cv_config(dir.path())), factory.clone())
        .run(&ctx)
        .await
        .unwrap();
    assert!(second.cv_from_cache);
    assert_eq!(factory.created(), 1);
    assert_eq!(second.params, first.params);
}

#[tokio::test]
async fn test_retrain_ignores_cache() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_dataset(dir.path());
    let ctx = LogContext::new("integration");

    pipeline(
        TrainingRequest::new(&input, cv_config(dir.path())),
        Arc::new(CountingFactory::default()),
    )
    .run(&ctx)
    .await
    .unwrap();

    let factory = Arc::new(CountingFactory::default());
    let config = TrainConfig {
        retrain: true,
        ..cv_config(dir.path())
    };
    let summary = pipeline(TrainingRequest::new(&input, config), factory.clone())
        .run(&ctx)
        .await
        .unwrap();
    assert!(!summary.cv_from_cache);
    assert_eq!(factory.created(), 10);
}

#[tokio::test]
async fn test_corrupt_cache_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_dataset(dir.path());
    let cache = dir.path().join("cache").join("train.svm");
    std::fs::create_dir_all(&cache).unwrap();
    std::fs::write(cache.join("cv-ogd.toml"), "algorithm = 3\n[[results]]\n").unwrap();

    let output = dir.path().join("model.json");
    let mut request = TrainingRequest::new(&input, cv_config(dir.path()));
    request.output = Some(output.clone());
    let factory = Arc::new(CountingFactory::default());

    let err = pipeline(request, factory.clone())
        .run(&LogContext::new("integration"))
        .await
        .unwrap_err();
    assert!(matches!(err, SolError::CacheCorrupt { .. }));
    assert_eq!(err.stage(), "cache");
    assert_eq!(factory.created(), 0);
    assert!(!output.exists());
}

#[tokio::test]
async fn test_zero_step_rejected_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_dataset(dir.path());
    let config = TrainConfig {
        cv: vec!["eta=0.1:0:0.3".into()],
        ..cv_config(dir.path())
    };
    let reader = Arc::new(CountingReader::default());
    let factory = Arc::new(CountingFactory::default());

    let err = TrainingPipeline::new(TrainingRequest::new(&input, config))
        .with_reader(reader.clone())
        .with_factory(factory.clone())
        .run(&LogContext::new("integration"))
        .await
        .unwrap_err();
    assert!(matches!(err, SolError::InvalidRange { .. }));
    assert_eq!(err.stage(), "expansion");
    assert_eq!(reader.reads.load(Ordering::SeqCst), 0);
    assert_eq!(factory.created(), 0);
}

#[tokio::test]
async fn test_oversized_range_rejected_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_dataset(dir.path());
    let config = TrainConfig {
        cv: vec!["eta=0:1e-300:1".into()],
        ..cv_config(dir.path())
    };
    let reader = Arc::new(CountingReader::default());
    let factory = Arc::new(CountingFactory::default());

    let err = TrainingPipeline::new(TrainingRequest::new(&input, config))
        .with_reader(reader.clone())
        .with_factory(factory.clone())
        .run(&LogContext::new("integration"))
        .await
        .unwrap_err();
    assert!(matches!(err, SolError::InvalidRange { .. }));
    assert_eq!(reader.reads.load(Ordering::SeqCst), 0);
    assert_eq!(factory.created(), 0);
}

#[tokio::test]
async fn test_fold_count_above_sample_count() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_dataset(dir.path());
    let config = TrainConfig {
        fold_count: 31,
        ..cv_config(dir.path())
    };
    let factory = Arc::new(CountingFactory::default());
    let err = pipeline(TrainingRequest::new(&input, config), factory.clone())
        .run(&LogContext::new("integration"))
        .await
        .unwrap_err();
    assert_eq!(err.stage(), "splitting");
    assert_eq!(factory.created(), 0);
}

#[tokio::test]
async fn test_model_saved_and_warm_started() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_dataset(dir.path());
    let model = dir.path().join("out").join("model.json");
    let config = TrainConfig {
        algorithm: "arow".into(),
        passes: 2,
        cache_dir: Some(dir.path().join("cache")),
        ..Default::default()
    };

    let mut request = TrainingRequest::new(&input, config.clone());
    request.output = Some(model.clone());
    let summary = TrainingPipeline::new(request)
        .run(&LogContext::new("integration"))
        .await
        .unwrap();
    let artifact = summary.model.unwrap();
    assert_eq!(artifact.path, model);
    assert_eq!(artifact.algorithm, "arow");
    assert!(model.exists());
    assert_eq!(summary.samples, 30);
    assert!(summary.accuracy > 0.8, "{}", summary.accuracy);

    let mut request = TrainingRequest::new(&input, config);
    request.warm_start = Some(model.clone());
    let resumed = TrainingPipeline::new(request)
        .run(&LogContext::new("integration"))
        .await
        .unwrap();
    assert!(resumed.accuracy >= 0.9, "{}", resumed.accuracy);
}

#[tokio::test]
async fn test_warm_start_algorithm_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_dataset(dir.path());
    let model = dir.path().join("model.json");
    let base = TrainConfig {
        cache_dir: Some(dir.path().join("cache")),
        ..Default::default()
    };

    let mut request = TrainingRequest::new(&input, base.clone());
    request.output = Some(model.clone());
    TrainingPipeline::new(request)
        .run(&LogContext::new("integration"))
        .await
        .unwrap();

    let other = dir.path().join("other.json");
    let mut request = TrainingRequest::new(
        &input,
        TrainConfig {
            algorithm: "perceptron".into(),
            ..base
        },
    );
    request.warm_start = Some(model);
    request.output = Some(other.clone());
    let err = TrainingPipeline::new(request)
        .run(&LogContext::new("integration"))
        .await
        .unwrap_err();
    assert!(matches!(err, SolError::ConfigConflict { .. }));
    assert!(!other.exists());
}

#[tokio::test]
async fn test_missing_warm_start_model_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_dataset(dir.path());
    let mut request = TrainingRequest::new(
        &input,
        TrainConfig {
            cache_dir: Some(dir.path().join("cache")),
            ..Default::default()
        },
    );
    request.warm_start = Some(dir.path().join("nope.json"));
    let err = TrainingPipeline::new(request)
        .run(&LogContext::new("integration"))
        .await
        .unwrap_err();
    assert_ne!(err.stage(), "io");
    assert!(err.to_string().contains("nope.json"), "{err}");
}

#[tokio::test]
async fn test_bad_parameter_fails_without_saving() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_dataset(dir.path());
    let output = dir.path().join("model.json");
    let config = TrainConfig {
        params: vec!["eta=-1".into()],
        cache_dir: Some(dir.path().join("cache")),
        ..Default::default()
    };
    let mut request = TrainingRequest::new(&input, config);
    request.output = Some(output.clone());

    let err = TrainingPipeline::new(request)
        .run(&LogContext::new("integration"))
        .await
        .unwrap_err();
    assert_eq!(err.stage(), "training");
    assert!(!output.exists());
}

#[tokio::test]
async fn test_missing_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrainConfig::default();
    let err = TrainingPipeline::new(TrainingRequest::new(dir.path().join("nope.svm"), config))
        .run(&LogContext::new("integration"))
        .await
        .unwrap_err();
    assert!(matches!(err, SolError::DatasetLoad { .. }));
    assert_eq!(err.stage(), "dataset");
}
