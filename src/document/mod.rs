//! PDF text extraction.
//!
//! Uploaded bytes are written to a transient `.pdf` file, parsed with `lopdf`, and split into
//! one [`DocumentSegment`] per page. The transient file is removed before [`PdfExtractor::extract`]
//! returns, whether extraction succeeded or not.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while turning an uploaded PDF into text segments.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The transient file could not be created or written.
    #[error("Failed to stage uploaded PDF: {0}")]
    Staging(#[from] std::io::Error),
    /// The bytes could not be parsed as a PDF document.
    #[error("Failed to parse PDF: {0}")]
    Parse(String),
    /// Text could not be extracted from a page.
    #[error("Failed to extract text from page {page}: {reason}")]
    Page {
        /// Zero-based page index.
        page: u32,
        /// Reason reported by the PDF library.
        reason: String,
    },
    /// The blocking extraction task panicked or was cancelled.
    #[error("PDF extraction task failed: {0}")]
    Task(String),
}

/// Where a segment came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMetadata {
    /// Uploaded file name, or the transient path the PDF was read from.
    pub source: String,
    /// Zero-based page index.
    pub page: u32,
}

/// A unit of extracted text plus its source metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSegment {
    /// Extracted page text.
    pub text: String,
    /// Source file and page of the text.
    pub metadata: SegmentMetadata,
}

/// Extracts per-page text segments from PDF uploads.
#[derive(Debug, Clone, Default)]
pub struct PdfExtractor {
    temp_dir: Option<PathBuf>,
}

impl PdfExtractor {
    /// Create an extractor staging files in `temp_dir`, or the system temp dir when `None`.
    pub fn new(temp_dir: Option<PathBuf>) -> Self {
        Self { temp_dir }
    }

    /// Extract one segment per page from `content`.
    ///
    /// Parsing runs on the blocking pool. `file_name` becomes the segments' `source`; when it is
    /// absent the transient file path is recorded instead.
    pub async fn extract(
        &self,
        content: Vec<u8>,
        file_name: Option<String>,
    ) -> Result<Vec<DocumentSegment>, ExtractionError> {
        let temp_dir = self.temp_dir.clone();
        tokio::task::spawn_blocking(move || {
            extract_staged(&content, temp_dir.as_deref(), file_name.as_deref())
        })
        .await
        .map_err(|err| ExtractionError::Task(err.to_string()))?
    }
}

fn extract_staged(
    content: &[u8],
    temp_dir: Option<&Path>,
    file_name: Option<&str>,
) -> Result<Vec<DocumentSegment>, ExtractionError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("pdfchat-").suffix(".pdf");
    let mut staged = match temp_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    let path = staged.path().to_path_buf();
    tracing::debug!(path = %path.display(), bytes = content.len(), "Staged uploaded PDF");

    let result = staged
        .write_all(content)
        .and_then(|()| staged.flush())
        .map_err(ExtractionError::from)
        .and_then(|()| {
            let source = file_name
                .map(str::to_string)
                .unwrap_or_else(|| path.display().to_string());
            load_segments(&path, &source)
        });

    // Removal happens on every path; the guard's destructor covers unwinding too.
    match staged.close() {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed staged PDF"),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Failed to remove staged PDF")
        }
    }

    if let Ok(segments) = &result {
        tracing::info!(segments = segments.len(), "Loaded segments from PDF");
    }
    result
}

fn load_segments(path: &Path, source: &str) -> Result<Vec<DocumentSegment>, ExtractionError> {
    let document =
        lopdf::Document::load(path).map_err(|err| ExtractionError::Parse(err.to_string()))?;

    // `get_pages` is keyed by one-based page number, in page order.
    document
        .get_pages()
        .into_keys()
        .map(|page_number| {
            let page = page_number.saturating_sub(1);
            let text = document
                .extract_text(&[page_number])
                .map_err(|err| ExtractionError::Page {
                    page,
                    reason: err.to_string(),
                })?;
            Ok(DocumentSegment {
                text,
                metadata: SegmentMetadata {
                    source: source.to_string(),
                    page,
                },
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod fixtures;

#[cfg(test)]
mod tests {
    use super::fixtures::pdf_with_pages;
    use super::*;

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).expect("read temp dir").next().is_none()
    }

    #[tokio::test]
    async fn extracts_one_segment_per_page_in_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let extractor = PdfExtractor::new(Some(temp.path().to_path_buf()));
        let pdf = pdf_with_pages(&["First page", "Second page", "Third page"]);

        let segments = extractor
            .extract(pdf, Some("doc.pdf".into()))
            .await
            .expect("segments");

        assert_eq!(segments.len(), 3);
        for (index, segment) in segments.iter().enumerate() {
            assert_eq!(segment.metadata.page, index as u32);
            assert_eq!(segment.metadata.source, "doc.pdf");
        }
        assert!(segments[0].text.contains("First page"));
        assert!(segments[2].text.contains("Third page"));
        assert!(dir_is_empty(temp.path()), "staged file must be removed");
    }

    #[tokio::test]
    async fn source_defaults_to_staged_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let extractor = PdfExtractor::new(Some(temp.path().to_path_buf()));

        let segments = extractor
            .extract(pdf_with_pages(&["Only page"]), None)
            .await
            .expect("segments");

        let source = &segments[0].metadata.source;
        assert!(source.ends_with(".pdf"), "unexpected source {source}");
        assert!(source.starts_with(&temp.path().display().to_string()));
    }

    #[tokio::test]
    async fn malformed_pdf_fails_and_still_removes_staged_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let extractor = PdfExtractor::new(Some(temp.path().to_path_buf()));

        let error = extractor
            .extract(b"definitely not a pdf".to_vec(), Some("bad.pdf".into()))
            .await
            .expect_err("parse failure");

        assert!(matches!(error, ExtractionError::Parse(_)));
        assert!(dir_is_empty(temp.path()), "staged file must be removed");
    }

    #[tokio::test]
    async fn missing_temp_dir_surfaces_staging_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let missing = temp.path().join("does-not-exist");
        let extractor = PdfExtractor::new(Some(missing));

        let error = extractor
            .extract(pdf_with_pages(&["page"]), None)
            .await
            .expect_err("staging failure");

        assert!(matches!(error, ExtractionError::Staging(_)));
    }
}
