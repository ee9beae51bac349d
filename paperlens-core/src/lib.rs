//! # Paperlens Core
//!
//! Core library for Paperlens, a batch analyzer for research-paper PDFs.
//! Provides text extraction, LLM-backed structured summaries, the pairwise
//! comparison matrix, CSV output, configuration, and the pipeline driver
//! that ties them together.

pub mod brain;
pub mod callback;
pub mod comparator;
pub mod config;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod pipeline;
pub mod providers;
pub mod summarizer;
pub mod table;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{Brain, CallStats, LlmProvider, MockLlmProvider};
pub use callback::{NoOpCallback, PipelineCallback};
pub use comparator::{COMPARISON_FAILED, ComparisonMatrix, Comparator, SAME_PAPER};
pub use config::{ConfigOverrides, PaperlensConfig};
pub use error::{PaperlensError, Result};
pub use extract::{PdfExtractReader, PdfReader, TextExtractor};
pub use normalize::normalize;
pub use pipeline::{ComparisonStats, Pipeline, RunReport, SkipReason, SkippedPaper};
pub use summarizer::{PaperRecord, Summarizer};
pub use types::{CompletionRequest, CompletionResponse, Message, Role, TokenUsage};
