//! Mini-batch feeder with a bounded look-ahead buffer.
//!
//! A blocking producer walks the view once per pass and pushes batches into a
//! bounded channel. It reserves a channel slot before forming each batch, so at
//! most `buffer_depth` batches exist ahead of the consumer.

use crate::data::dataset::{DataView, Sample};
use crate::data::normalize::Normalization;
use crate::error::SolError;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Shape of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedOptions {
    pub batch_size: usize,
    pub buffer_depth: usize,
    pub passes: usize,
    pub normalization: Normalization,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            batch_size: 256,
            buffer_depth: 2,
            passes: 1,
            normalization: Normalization::None,
        }
    }
}

impl FeedOptions {
    pub fn validate(&self) -> Result<(), SolError> {
        if self.batch_size == 0 {
            return Err(SolError::config("batch size must be at least 1"));
        }
        if self.buffer_depth == 0 {
            return Err(SolError::config("buffer depth must be at least 1"));
        }
        if self.passes == 0 {
            return Err(SolError::config("pass count must be at least 1"));
        }
        Ok(())
    }
}

/// A group of consecutive samples from one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub pass: usize,
    pub samples: Vec<Sample>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Lazy, finite, non-restartable sequence of batches.
pub struct MiniBatchFeeder {
    rx: mpsc::Receiver<Batch>,
    producer: Option<JoinHandle<()>>,
    expected_samples: usize,
}

impl MiniBatchFeeder {
    /// Start producing batches over `view`. Must be called inside a tokio runtime.
    pub fn spawn(view: DataView, options: FeedOptions) -> Result<Self, SolError> {
        options.validate()?;
        let expected_samples = view.len() * options.passes;
        let (tx, rx) = mpsc::channel(options.buffer_depth);

        let runtime = tokio::runtime::Handle::current();
        let producer = tokio::task::spawn_blocking(move || {
            let batch_size = options.batch_size;
            for pass in 0..options.passes {
                for start in (0..view.len()).step_by(batch_size) {
                    let Ok(permit) = runtime.block_on(tx.reserve()) else {
                        tracing::trace!(pass, "Feed consumer went away, stopping producer");
                        return;
                    };
                    let end = (start + batch_size).min(view.len());
                    let samples = (start..end)
                        .filter_map(|pos| view.get(pos))
                        .map(|sample| {
                            let mut sample = sample.clone();
                            options.normalization.apply(&mut sample.features);
                            sample
                        })
                        .collect();
                    permit.send(Batch { pass, samples });
                }
            }
        });

        Ok(Self {
            rx,
            producer: Some(producer),
            expected_samples,
        })
    }

    /// Next batch, or `None` once every pass is exhausted.
    pub async fn next_batch(&mut self) -> Result<Option<Batch>, SolError> {
        if let Some(batch) = self.rx.recv().await {
            return Ok(Some(batch));
        }
        if let Some(producer) = self.producer.take() {
            producer
                .await
                .map_err(|e| SolError::training(format!("batch producer failed: {e}")))?;
        }
        Ok(None)
    }

    /// Batches produced but not yet consumed.
    pub fn queued(&self) -> usize {
        self.rx.len()
    }

    /// Total samples this feed will emit across all passes.
    pub fn expected_samples(&self) -> usize {
        self.expected_samples
    }
}
