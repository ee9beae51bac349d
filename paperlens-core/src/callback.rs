//! Progress notifications from a pipeline run.
//!
//! Every method has a no-op default so front-ends implement only what they
//! display. Callbacks are invoked inline on the pipeline task and must not block.

use crate::pipeline::{RunReport, SkipReason};

pub trait PipelineCallback: Send + Sync {
    /// Input files found, before any is processed.
    fn on_papers_found(&self, _total: usize) {}

    /// A paper finished; `skipped` is `None` when a record was produced.
    fn on_paper_done(&self, _paper: &str, _skipped: Option<&SkipReason>) {}

    /// The comparison stage is about to issue `calls` model calls.
    fn on_comparisons_planned(&self, _calls: usize) {}

    /// One comparison call finished.
    fn on_comparison_done(&self, _paper_a: &str, _paper_b: &str, _failed: bool) {}

    /// The run is over, whether or not tables were written.
    fn on_finished(&self, _report: &RunReport) {}
}

/// Callback that ignores every event.
pub struct NoOpCallback;

impl PipelineCallback for NoOpCallback {}
