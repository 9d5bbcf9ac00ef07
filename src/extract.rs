//! PDF text extraction.
//!
//! Loads an uploaded PDF into page-level text blocks so the chunker can
//! attach page locators. Extraction failures surface as [`LoadError`];
//! the worker reports the job failed and the queue's retry policy decides
//! whether to redeliver.

use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read file: {0}")]
    Unreadable(#[from] std::io::Error),
    #[error("PDF extraction failed: {0}")]
    Parse(String),
}

/// Extract one text block per page, in page order.
pub fn load_pdf_pages(path: &Path) -> Result<Vec<String>, LoadError> {
    let bytes = std::fs::read(path)?;
    load_pdf_pages_from_mem(&bytes)
}

pub fn load_pdf_pages_from_mem(bytes: &[u8]) -> Result<Vec<String>, LoadError> {
    pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| LoadError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_unreadable() {
        let err = load_pdf_pages(Path::new("/nonexistent/file.pdf")).unwrap_err();
        assert!(matches!(err, LoadError::Unreadable(_)));
    }

    #[test]
    fn garbage_bytes_fail_to_parse() {
        let err = load_pdf_pages_from_mem(b"not a pdf").unwrap_err();
        assert!(matches!(err, LoadError::Parse(_)));
    }
}
