//! CSV output for summaries and the comparison matrix.

use crate::comparator::ComparisonMatrix;
use crate::error::TableError;
use crate::summarizer::PaperRecord;
use csv::WriterBuilder;
use indexmap::IndexSet;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Key column of the summary table and corner label of the matrix.
pub const PAPER_NAME_COLUMN: &str = "paper_name";

/// Summary table header: `paper_name`, then every field in first-seen order.
pub fn summary_header(records: &[PaperRecord]) -> Vec<String> {
    let mut columns: IndexSet<&str> = IndexSet::new();
    for record in records {
        columns.extend(record.fields.keys().map(String::as_str));
    }
    std::iter::once(PAPER_NAME_COLUMN)
        .chain(columns)
        .map(str::to_string)
        .collect()
}

/// Write the summary table to any writer. Missing values are blank.
pub fn write_summary<W: Write>(writer: W, records: &[PaperRecord]) -> csv::Result<()> {
    let header = summary_header(records);
    let mut wtr = WriterBuilder::new().from_writer(writer);
    wtr.write_record(&header)?;
    for record in records {
        let row = std::iter::once(record.paper_name.as_str()).chain(
            header[1..]
                .iter()
                .map(|column| record.get(column).unwrap_or("")),
        );
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the comparison matrix to any writer, with a `paper_name` corner cell.
pub fn write_matrix<W: Write>(writer: W, matrix: &ComparisonMatrix) -> csv::Result<()> {
    let mut wtr = WriterBuilder::new().from_writer(writer);
    wtr.write_record(
        std::iter::once(PAPER_NAME_COLUMN).chain(matrix.names().iter().map(String::as_str)),
    )?;
    for (name, cells) in matrix.rows() {
        wtr.write_record(std::iter::once(name).chain(cells.iter().map(String::as_str)))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the summary table to `path`, replacing any existing file.
pub fn write_summary_table(path: &Path, records: &[PaperRecord]) -> Result<(), TableError> {
    let file = create_output(path)?;
    write_summary(file, records).map_err(|source| TableError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), rows = records.len(), "Saved analytical summary");
    Ok(())
}

/// Write the comparison matrix to `path`, replacing any existing file.
pub fn write_comparison_table(path: &Path, matrix: &ComparisonMatrix) -> Result<(), TableError> {
    let file = create_output(path)?;
    write_matrix(file, matrix).map_err(|source| TableError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), papers = matrix.len(), "Saved cross-comparison matrix");
    Ok(())
}

fn create_output(path: &Path) -> Result<std::fs::File, TableError> {
    let io_err = |source| TableError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::File::create(path).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::{Brain, MockLlmProvider};
    use crate::comparator::Comparator;
    use crate::config::{ComparisonConfig, RetryConfig};
    use indexmap::IndexMap;
    use std::sync::Arc;

    fn record(name: &str, pairs: &[(&str, &str)]) -> PaperRecord {
        let fields: IndexMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PaperRecord::new(name, fields)
    }

    fn render(f: impl FnOnce(&mut Vec<u8>) -> csv::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    async fn matrix_for(names: &[&str]) -> ComparisonMatrix {
        let mock = Arc::new(MockLlmProvider::with_response("Related."));
        let retry = RetryConfig {
            max_retries: 0,
            ..Default::default()
        };
        let comparator = Comparator::new(
            Arc::new(Brain::new(mock, retry)),
            ComparisonConfig::default(),
        );
        let records: Vec<PaperRecord> = names.iter().map(|n| record(n, &[])).collect();
        comparator.compare_all(&records).await
    }

    #[test]
    fn test_summary_header_union_in_first_seen_order() {
        let records = vec![
            record("a.pdf", &[("year", "2020"), ("authors", "A")]),
            record("b.pdf", &[("authors", "B"), ("sector", "Energy")]),
        ];
        assert_eq!(
            summary_header(&records),
            vec!["paper_name", "year", "authors", "sector"]
        );
    }

    #[test]
    fn test_summary_missing_values_blank() {
        let records = vec![
            record("a.pdf", &[("year", "2020")]),
            record("b.pdf", &[("sector", "Energy")]),
        ];
        let out = render(|buf| write_summary(buf, &records));
        assert_eq!(
            out,
            "paper_name,year,sector\na.pdf,2020,\nb.pdf,,Energy\n"
        );
    }

    #[test]
    fn test_summary_quotes_multiline_values() {
        let records = vec![record(
            "a.pdf",
            &[("other_details", "• One, two.\n• Three.")],
        )];
        let out = render(|buf| write_summary(buf, &records));
        assert!(out.contains("\"• One, two.\n• Three.\""));
    }

    #[tokio::test]
    async fn test_matrix_layout() {
        let matrix = matrix_for(&["a.pdf", "b.pdf"]).await;
        let out = render(|buf| write_matrix(buf, &matrix));
        assert_eq!(
            out,
            "paper_name,a.pdf,b.pdf\na.pdf,Same paper.,Related.\nb.pdf,Related.,Same paper.\n"
        );
    }

    #[tokio::test]
    async fn test_tables_create_parents_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let summary = dir.path().join("out/nested/summary.csv");
        let matrix_path = dir.path().join("out/matrix.csv");
        std::fs::create_dir_all(dir.path().join("out")).unwrap();
        std::fs::write(&matrix_path, "stale contents that are much longer than the table").unwrap();

        write_summary_table(&summary, &[record("a.pdf", &[("year", "2020")])]).unwrap();
        write_comparison_table(&matrix_path, &matrix_for(&["a.pdf"]).await).unwrap();

        assert_eq!(
            std::fs::read_to_string(&summary).unwrap(),
            "paper_name,year\na.pdf,2020\n"
        );
        assert_eq!(
            std::fs::read_to_string(&matrix_path).unwrap(),
            "paper_name,a.pdf\na.pdf,Same paper.\n"
        );
    }
}
