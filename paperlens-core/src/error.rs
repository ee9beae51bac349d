//! Error types for the Paperlens core library.
//!
//! Uses `thiserror` for public API error types with structured error variants
//! covering LLM calls, PDF extraction, summary parsing, configuration, and
//! table output.

use std::path::PathBuf;

/// Top-level error type for the Paperlens core library.
#[derive(Debug, thiserror::Error)]
pub enum PaperlensError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Summary error: {0}")]
    Summary(#[from] SummaryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("Input directory {path} could not be read: {source}")]
    InputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from LLM provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Provider returned server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors from reading text out of a PDF.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("PDF extraction failed for {path}: {message}")]
    Pdf { path: PathBuf, message: String },

    #[error("Malformed PDF {path}: extraction panicked")]
    Malformed { path: PathBuf },

    #[error("Extraction task for {path} did not complete: {message}")]
    Task { path: PathBuf, message: String },
}

/// Errors from turning a model response into a summary record.
#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("Model call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Response is not valid JSON: {message}")]
    Parse { message: String, raw: String },

    #[error("Response JSON is a {found}, expected an object")]
    NotAnObject { found: String },

    #[error("Response is missing fields: {}", fields.join(", "))]
    MissingFields { fields: Vec<String> },

    #[error("Field '{field}' has unsupported value: {reason}")]
    InvalidField { field: String, reason: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors from writing the output tables.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("Failed to write {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A type alias for results using the top-level `PaperlensError`.
pub type Result<T> = std::result::Result<T, PaperlensError>;
