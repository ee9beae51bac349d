//! Terminal progress for a pipeline run.

use indicatif::{ProgressBar, ProgressStyle};
use paperlens_core::{PipelineCallback, RunReport, SkipReason};

const TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// Drives one progress bar through the summary stage and then the comparison stage.
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template(TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            bar
        };
        Self { bar }
    }

    fn start_stage(&self, len: usize, message: &'static str) {
        self.bar.reset();
        self.bar.set_length(len as u64);
        self.bar.set_message(message);
    }

    #[cfg(test)]
    fn position(&self) -> (u64, Option<u64>) {
        (self.bar.position(), self.bar.length())
    }
}

impl PipelineCallback for ProgressReporter {
    fn on_papers_found(&self, total: usize) {
        self.start_stage(total, "papers");
    }

    fn on_paper_done(&self, paper: &str, skipped: Option<&SkipReason>) {
        if let Some(reason) = skipped {
            self.bar.println(format!("skipped {}: {}", paper, reason));
        }
        self.bar.inc(1);
    }

    fn on_comparisons_planned(&self, calls: usize) {
        self.start_stage(calls, "comparisons");
    }

    fn on_comparison_done(&self, paper_a: &str, paper_b: &str, failed: bool) {
        if failed {
            self.bar
                .println(format!("comparison failed: {} vs {}", paper_a, paper_b));
        }
        self.bar.inc(1);
    }

    fn on_finished(&self, _report: &RunReport) {
        self.bar.finish_and_clear();
    }
}
