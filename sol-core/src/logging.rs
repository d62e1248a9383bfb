//! Per-run logging context.

use tracing::Span;
use uuid::Uuid;

/// Identifies one training run and carries its root span.
///
/// Components receive this explicitly and open child spans for their stages, so
/// every event emitted during a run carries the same `run_id`.
#[derive(Debug, Clone)]
pub struct LogContext {
    run_id: Uuid,
    span: Span,
}

impl LogContext {
    pub fn new(label: &str) -> Self {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", run_id = %run_id, label);
        Self { run_id, span }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Child span for one stage of the run.
    pub fn stage(&self, name: &'static str) -> Span {
        tracing::info_span!(parent: &self.span, "stage", name)
    }
}
