//! Pipeline driver: discover PDFs, summarize each, compare all pairs, write tables.
//!
//! Papers are processed one at a time and pairs one at a time; every model
//! call is awaited before the next is issued. Per-paper and per-pair failures
//! are logged and absorbed. Only an unreadable input directory or a failed
//! table write aborts the run.

use crate::brain::{Brain, CallStats, LlmProvider};
use crate::callback::{NoOpCallback, PipelineCallback};
use crate::comparator::{ComparisonMatrix, Comparator};
use crate::config::PaperlensConfig;
use crate::error::{PaperlensError, Result};
use crate::extract::{PdfReader, TextExtractor};
use crate::summarizer::{PaperRecord, Summarizer};
use crate::table;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Why a paper produced no record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// Extraction failed or the document had no pages.
    NoText,
    /// The model call failed or its response did not validate.
    Summary { message: String },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoText => write!(f, "no text could be extracted"),
            SkipReason::Summary { message } => write!(f, "summary failed: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedPaper {
    pub paper_name: String,
    pub reason: SkipReason,
}

/// Outcome of the comparison stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ComparisonStats {
    pub calls: usize,
    pub failures: usize,
}

/// What a run did. Produced even when no table was written.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub model: String,
    pub input_dir: PathBuf,
    /// PDF files found in the input directory.
    pub discovered: usize,
    /// Files that yielded non-empty text.
    pub extracted: usize,
    /// Files that produced a record.
    pub summarized: usize,
    pub skipped: Vec<SkippedPaper>,
    pub comparisons: ComparisonStats,
    /// Totals across every model call of the run.
    pub llm: CallStats,
    pub summary_table: Option<PathBuf>,
    pub comparison_table: Option<PathBuf>,
}

impl RunReport {
    fn new(model: &str, input_dir: &Path) -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            model: model.to_string(),
            input_dir: input_dir.to_path_buf(),
            discovered: 0,
            extracted: 0,
            summarized: 0,
            skipped: Vec::new(),
            comparisons: ComparisonStats::default(),
            llm: CallStats::default(),
            summary_table: None,
            comparison_table: None,
        }
    }

    /// True when both tables were written.
    pub fn tables_written(&self) -> bool {
        self.summary_table.is_some() && self.comparison_table.is_some()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// List the PDF files directly inside `dir` (extension match is case-insensitive).
///
/// With `sort` the result is ordered by file name; otherwise directory order is kept.
pub fn discover_pdfs(dir: &Path, sort: bool) -> Result<Vec<PathBuf>> {
    let input_dir_err = |source| PaperlensError::InputDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut pdfs = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(input_dir_err)? {
        let path = entry.map_err(input_dir_err)?.path();
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf && path.is_file() {
            pdfs.push(path);
        }
    }

    if sort {
        pdfs.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    }
    Ok(pdfs)
}

/// Display name of a paper: its file name.
fn paper_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// The batch analysis pipeline, built from explicit configuration and collaborators.
pub struct Pipeline {
    config: PaperlensConfig,
    brain: Arc<Brain>,
    extractor: TextExtractor,
    summarizer: Summarizer,
    comparator: Comparator,
    callback: Arc<dyn PipelineCallback>,
}

impl Pipeline {
    pub fn new(
        config: PaperlensConfig,
        provider: Arc<dyn LlmProvider>,
        reader: Arc<dyn PdfReader>,
    ) -> Self {
        let brain = Arc::new(
            Brain::new(provider, config.llm.retry.clone()).with_max_tokens(config.llm.max_tokens),
        );
        let extractor = TextExtractor::new(reader, config.paths.parsed_text_dir.clone());
        let summarizer = Summarizer::new(Arc::clone(&brain), config.summary.clone());
        let comparator = Comparator::new(Arc::clone(&brain), config.comparison.clone());

        Self {
            config,
            brain,
            extractor,
            summarizer,
            comparator,
            callback: Arc::new(NoOpCallback),
        }
    }

    /// Receive progress events during [`Pipeline::run`].
    pub fn with_callback(mut self, callback: Arc<dyn PipelineCallback>) -> Self {
        self.comparator = self.comparator.with_callback(Arc::clone(&callback));
        self.callback = callback;
        self
    }

    pub fn config(&self) -> &PaperlensConfig {
        &self.config
    }

    /// Run the whole batch.
    ///
    /// Returns a report even when no paper succeeded; in that case no table
    /// is written and existing output files are left untouched. The callback
    /// sees `on_finished` on a failed table write as well.
    pub async fn run(&self) -> Result<RunReport> {
        let paths = &self.config.paths;
        let mut report = RunReport::new(self.brain.model_name(), &paths.papers_dir);

        let inputs = discover_pdfs(&paths.papers_dir, self.config.run.sort_inputs)?;
        report.discovered = inputs.len();
        info!(
            dir = %paths.papers_dir.display(),
            count = inputs.len(),
            "Discovered PDF files"
        );
        self.callback.on_papers_found(inputs.len());

        let mut records: Vec<PaperRecord> = Vec::with_capacity(inputs.len());
        for path in &inputs {
            let name = paper_name(path);
            let outcome = self.process_paper(path, &name, &mut report).await;
            match outcome {
                Ok(record) => {
                    self.callback.on_paper_done(&name, None);
                    records.push(record);
                }
                Err(reason) => {
                    self.callback.on_paper_done(&name, Some(&reason));
                    report.skipped.push(SkippedPaper {
                        paper_name: name,
                        reason,
                    });
                }
            }
        }
        report.summarized = records.len();

        if records.is_empty() {
            warn!("No papers were successfully analyzed.");
            return Ok(self.finish(report));
        }

        let matrix = self.comparator.compare_all(&records).await;
        report.comparisons = ComparisonStats {
            calls: matrix.calls,
            failures: matrix.failures,
        };

        let written = self.write_tables(&records, &matrix, &mut report);
        let report = self.finish(report);
        written.map(|()| report)
    }

    /// Write both tables, recording each path in `report` once it is on disk.
    fn write_tables(
        &self,
        records: &[PaperRecord],
        matrix: &ComparisonMatrix,
        report: &mut RunReport,
    ) -> Result<()> {
        let paths = &self.config.paths;
        table::write_summary_table(&paths.summary_table, records)
            .inspect_err(|e| error!(error = %e, "Could not write the summary table"))?;
        report.summary_table = Some(paths.summary_table.clone());
        table::write_comparison_table(&paths.comparison_table, matrix)
            .inspect_err(|e| error!(error = %e, "Could not write the comparison matrix"))?;
        report.comparison_table = Some(paths.comparison_table.clone());
        Ok(())
    }

    async fn process_paper(
        &self,
        path: &Path,
        name: &str,
        report: &mut RunReport,
    ) -> std::result::Result<PaperRecord, SkipReason> {
        let text = self.extractor.extract(path).await;
        if text.is_empty() {
            warn!(paper = %name, "Skipping paper because no text could be extracted");
            return Err(SkipReason::NoText);
        }
        report.extracted += 1;

        self.summarizer.summarize(&text, name).await.map_err(|e| {
            warn!(paper = %name, error = %e, "Skipping paper because it could not be summarized");
            SkipReason::Summary {
                message: e.to_string(),
            }
        })
    }

    fn finish(&self, mut report: RunReport) -> RunReport {
        report.finished_at = Utc::now();
        report.llm = self.brain.stats();
        info!(
            summarized = report.summarized,
            skipped = report.skipped.len(),
            calls = report.llm.calls,
            tokens = report.llm.usage.total(),
            cost_usd = report.llm.cost_usd,
            "Run finished"
        );
        self.callback.on_finished(&report);
        report
    }
}
