//! PDF text extraction with page markers and a plain-text side file.
//!
//! The PDF library sits behind [`PdfReader`] so the pipeline can be driven by
//! a stub in tests. [`PdfExtractReader`] is the production implementation on
//! top of `pdf-extract`, which panics on some malformed inputs; those panics
//! are caught and reported as [`ExtractError::Malformed`].

use crate::error::ExtractError;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Source of per-page text for a PDF file.
pub trait PdfReader: Send + Sync {
    /// Return the text of every page in document order.
    fn read_pages(&self, path: &Path) -> Result<Vec<String>, ExtractError>;
}

/// [`PdfReader`] backed by `pdf_extract::extract_text_from_mem_by_pages`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractReader;

impl PdfReader for PdfExtractReader {
    fn read_pages(&self, path: &Path) -> Result<Vec<String>, ExtractError> {
        let data = std::fs::read(path).map_err(|source| ExtractError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(&data)
        }));

        match result {
            Ok(Ok(pages)) => Ok(pages),
            Ok(Err(e)) => Err(ExtractError::Pdf {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(_) => Err(ExtractError::Malformed {
                path: path.to_path_buf(),
            }),
        }
    }
}

/// Join pages as `"\n--- Page <n> ---\n<text>"`, numbering from 1.
pub fn format_pages<S: AsRef<str>>(pages: &[S]) -> String {
    let capacity = pages.iter().map(|p| p.as_ref().len() + 24).sum();
    let mut out = String::with_capacity(capacity);
    for (i, page) in pages.iter().enumerate() {
        out.push_str(&format!("\n--- Page {} ---\n", i + 1));
        out.push_str(page.as_ref());
    }
    out
}

/// Side-file location for `pdf_path`.
///
/// `a.pdf` maps to `<dir>/a.txt`. Any other extension spelling keeps the full
/// file name (`a.PDF` maps to `<dir>/a.PDF.txt`), so `a.pdf` and `a.PDF` in
/// one folder get separate files.
pub fn side_file_path(parsed_text_dir: &Path, pdf_path: &Path) -> PathBuf {
    let base = if pdf_path.extension().is_some_and(|ext| ext == "pdf") {
        pdf_path.file_stem()
    } else {
        pdf_path.file_name()
    };
    let base = base
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    parsed_text_dir.join(format!("{base}.txt"))
}

/// Extracts page-marked text from PDFs and persists a copy per document.
pub struct TextExtractor {
    reader: Arc<dyn PdfReader>,
    parsed_text_dir: PathBuf,
}

impl TextExtractor {
    pub fn new(reader: Arc<dyn PdfReader>, parsed_text_dir: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            parsed_text_dir: parsed_text_dir.into(),
        }
    }

    /// Extract the text of `path`.
    ///
    /// Any failure is logged and yields an empty string, as does a document
    /// without pages. The side file is written only when there is text; a
    /// failure writing it is a warning and the text is still returned.
    pub async fn extract(&self, path: &Path) -> String {
        let pages = match self.read_pages_blocking(path).await {
            Ok(pages) => pages,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Error opening PDF");
                return String::new();
            }
        };

        debug!(path = %path.display(), pages = pages.len(), "Read PDF pages");
        let text = format_pages(&pages);
        if text.is_empty() {
            return text;
        }

        let side_file = side_file_path(&self.parsed_text_dir, path);
        match self.write_side_file(&side_file, &text).await {
            Ok(()) => info!(file = %side_file.display(), "Saved extracted text"),
            Err(e) => warn!(
                file = %side_file.display(),
                error = %e,
                "Failed to save extracted text"
            ),
        }
        text
    }

    async fn read_pages_blocking(&self, path: &Path) -> Result<Vec<String>, ExtractError> {
        let reader = Arc::clone(&self.reader);
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || reader.read_pages(&owned))
            .await
            .map_err(|e| ExtractError::Task {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
    }

    async fn write_side_file(&self, side_file: &Path, text: &str) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.parsed_text_dir).await?;
        tokio::fs::write(side_file, text).await
    }
}
