//! Pairwise cross-comparison of summarized papers.

use crate::brain::Brain;
use crate::callback::{NoOpCallback, PipelineCallback};
use crate::config::ComparisonConfig;
use crate::normalize::normalize;
use crate::summarizer::PaperRecord;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Diagonal cell value; no model call is made for it.
pub const SAME_PAPER: &str = "Same paper.";

/// Cell value when the model call fails or returns nothing.
pub const COMPARISON_FAILED: &str = "Comparison failed.";

/// Square matrix of relationship statements indexed by paper name.
///
/// `cell(i, j)` describes paper `i` relative to paper `j`; the matrix is not
/// symmetric unless built with mirrored pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonMatrix {
    names: Vec<String>,
    cells: Vec<Vec<String>>,
    /// Model calls issued while filling the matrix.
    pub calls: usize,
    /// Calls that ended in [`COMPARISON_FAILED`].
    pub failures: usize,
}

impl ComparisonMatrix {
    /// A matrix with the diagonal filled and every other cell empty.
    fn with_diagonal(names: Vec<String>) -> Self {
        let n = names.len();
        let cells = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| {
                        if i == j {
                            SAME_PAPER.to_string()
                        } else {
                            String::new()
                        }
                    })
                    .collect()
            })
            .collect();
        Self {
            names,
            cells,
            calls: 0,
            failures: 0,
        }
    }

    /// Paper names in row (and column) order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&str> {
        self.cells.get(row)?.get(col).map(String::as_str)
    }

    /// Look a cell up by the row and column paper names.
    pub fn get_by_name(&self, row: &str, col: &str) -> Option<&str> {
        let i = self.names.iter().position(|n| n == row)?;
        let j = self.names.iter().position(|n| n == col)?;
        self.get(i, j)
    }

    /// Rows in order, each as a slice of cells.
    pub fn rows(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.cells.iter().map(Vec::as_slice))
    }
}

/// Fills a [`ComparisonMatrix`] by asking the model about each pair.
pub struct Comparator {
    brain: Arc<Brain>,
    config: ComparisonConfig,
    callback: Arc<dyn PipelineCallback>,
}

impl Comparator {
    pub fn new(brain: Arc<Brain>, config: ComparisonConfig) -> Self {
        Self {
            brain,
            config,
            callback: Arc::new(NoOpCallback),
        }
    }

    pub fn with_callback(mut self, callback: Arc<dyn PipelineCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// Model calls `compare_all` will issue for `n` papers.
    pub fn planned_calls(&self, n: usize) -> usize {
        let ordered = n * n.saturating_sub(1);
        if self.config.mirror_pairs {
            ordered / 2
        } else {
            ordered
        }
    }

    /// Compare every ordered pair of `records`, row-major.
    ///
    /// Failures never abort the run; they leave [`COMPARISON_FAILED`] in the
    /// cell. With `mirror_pairs` only pairs above the diagonal are queried.
    pub async fn compare_all(&self, records: &[PaperRecord]) -> ComparisonMatrix {
        let names = records.iter().map(|r| r.paper_name.clone()).collect();
        let mut matrix = ComparisonMatrix::with_diagonal(names);
        let n = records.len();

        info!(
            papers = n,
            calls = self.planned_calls(n),
            mirror = self.config.mirror_pairs,
            "Generating cross-comparison matrix"
        );
        self.callback.on_comparisons_planned(self.planned_calls(n));

        for i in 0..n {
            for j in 0..n {
                if i == j || (self.config.mirror_pairs && j < i) {
                    continue;
                }
                let cell = self.compare_pair(&records[i], &records[j]).await;
                let failed = cell == COMPARISON_FAILED;
                matrix.calls += 1;
                if failed {
                    matrix.failures += 1;
                }
                self.callback
                    .on_comparison_done(&records[i].paper_name, &records[j].paper_name, failed);
                if self.config.mirror_pairs {
                    matrix.cells[j][i] = cell.clone();
                }
                matrix.cells[i][j] = cell;
            }
        }

        info!(
            calls = matrix.calls,
            failures = matrix.failures,
            "Cross-comparison complete"
        );
        matrix
    }

    /// One model call for the ordered pair `(a, b)`; never fails.
    pub async fn compare_pair(&self, a: &PaperRecord, b: &PaperRecord) -> String {
        let prompt = match build_comparison_prompt(a, b) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(
                    paper_a = %a.paper_name,
                    paper_b = %b.paper_name,
                    error = %e,
                    "Failed to encode papers"
                );
                return COMPARISON_FAILED.to_string();
            }
        };

        match self
            .brain
            .complete_text(&prompt, self.config.temperature)
            .await
        {
            Ok(text) => {
                let text = normalize(&text).trim().to_string();
                if text.is_empty() {
                    warn!(
                        paper_a = %a.paper_name,
                        paper_b = %b.paper_name,
                        "Empty comparison response"
                    );
                    COMPARISON_FAILED.to_string()
                } else {
                    debug!(paper_a = %a.paper_name, paper_b = %b.paper_name, "Compared pair");
                    text
                }
            }
            Err(e) => {
                warn!(
                    paper_a = %a.paper_name,
                    paper_b = %b.paper_name,
                    error = %e,
                    "Error generating comparison"
                );
                COMPARISON_FAILED.to_string()
            }
        }
    }
}

/// Build the comparison prompt embedding both records as pretty JSON.
pub fn build_comparison_prompt(
    a: &PaperRecord,
    b: &PaperRecord,
) -> Result<String, serde_json::Error> {
    let paper_a = serde_json::to_string_pretty(a)?;
    let paper_b = serde_json::to_string_pretty(b)?;
    Ok(format!(
        "You are an expert academic research analyst. Compare the following two papers and \
         explain how they are similar or different in topics, methods, novelty, main findings, \
         and sector. Focus on analytical nuance.\n\n\
         Paper A:\n{paper_a}\n\n\
         Paper B:\n{paper_b}\n\n\
         Write a short statement of 2 to 4 full sentences explaining the relationship between \
         Paper A and Paper B. Return only the statement.\n"
    ))
}
