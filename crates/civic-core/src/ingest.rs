//! Document ingestion: turn uploaded bytes into plain policy text.
//!
//! Only text formats are decoded here. PDF and DOCX are recognised by
//! extension so they can be rejected up front with a clear error.

use std::path::Path;

use ring::digest;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("file too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("document is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("document contains no text")]
    Empty,

    #[error("failed to read {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

const TEXT_MIMES: &[&str] = &["text/plain", "text/markdown", "text/csv"];

/// Guess a MIME type from a file extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("txt" | "text") => "text/plain",
        Some("md" | "markdown") => "text/markdown",
        Some("csv") => "text/csv",
        Some("pdf") => "application/pdf",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("doc") => "application/msword",
        Some("html" | "htm") => "text/html",
        _ => "application/octet-stream",
    }
}

/// Extract plain text from document bytes.
///
/// The size check runs before anything else so oversized uploads are never
/// decoded. Line endings are normalised to `\n` and a UTF-8 BOM is dropped.
pub fn extract_text(bytes: &[u8], mime: &str, max_bytes: u64) -> Result<String, IngestError> {
    let size = bytes.len() as u64;
    if size > max_bytes {
        return Err(IngestError::FileTooLarge {
            size,
            limit: max_bytes,
        });
    }

    let base_mime = mime.split(';').next().unwrap_or(mime).trim();
    if !TEXT_MIMES.contains(&base_mime) {
        return Err(IngestError::UnsupportedFormat(base_mime.to_string()));
    }

    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let text = std::str::from_utf8(bytes)?;
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = text.trim();
    if text.is_empty() {
        return Err(IngestError::Empty);
    }

    tracing::debug!(mime = base_mime, bytes = size, "extracted document text");
    Ok(text.to_string())
}

/// Read a file from disk and extract its text.
///
/// The file size is checked from metadata before the contents are read.
pub fn extract_file(path: &Path, max_bytes: u64) -> Result<String, IngestError> {
    let io_err = |source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    };
    let size = std::fs::metadata(path).map_err(io_err)?.len();
    if size > max_bytes {
        return Err(IngestError::FileTooLarge {
            size,
            limit: max_bytes,
        });
    }
    let bytes = std::fs::read(path).map_err(io_err)?;
    extract_text(&bytes, mime_for_path(path), max_bytes)
}

/// Stable opaque identifier for a document, derived from its text.
///
/// `doc-` followed by the first 16 hex digits of the SHA-256 digest.
pub fn document_id(text: &str) -> String {
    let hash = digest::digest(&digest::SHA256, text.as_bytes());
    let hex: String = hash.as_ref()[..8]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    format!("doc-{hex}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn plain_text_is_normalised() {
        let text = extract_text(b"\xEF\xBB\xBFSection 1\r\nPurpose\r\n", "text/plain", 1024).unwrap();
        assert_eq!(text, "Section 1\nPurpose");
    }

    #[test]
    fn mime_parameters_are_ignored() {
        let text = extract_text(b"hello", "text/plain; charset=utf-8", 1024).unwrap();
        assert_eq!(text, "hello");
    }

    #[test]
    fn size_limit_checked_first() {
        let err = extract_text(&[0xFF; 32], "application/pdf", 16).unwrap_err();
        assert!(matches!(
            err,
            IngestError::FileTooLarge {
                size: 32,
                limit: 16
            }
        ));
    }

    #[test]
    fn pdf_is_unsupported() {
        let err = extract_text(b"%PDF-1.7", "application/pdf", 1024).unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFormat(m) if m == "application/pdf"));
    }

    #[test]
    fn invalid_utf8_and_empty() {
        assert!(matches!(
            extract_text(&[0xC3, 0x28], "text/plain", 1024),
            Err(IngestError::Encoding(_))
        ));
        assert!(matches!(
            extract_text(b"  \n ", "text/plain", 1024),
            Err(IngestError::Empty)
        ));
    }

    #[test]
    fn mime_lookup() {
        assert_eq!(mime_for_path(Path::new("policy.TXT")), "text/plain");
        assert_eq!(mime_for_path(Path::new("notes.md")), "text/markdown");
        assert_eq!(mime_for_path(Path::new("act.pdf")), "application/pdf");
        assert_eq!(mime_for_path(Path::new("blob")), "application/octet-stream");
    }

    #[test]
    fn extract_file_reads_text() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        writeln!(file, "DIGITAL PRIVACY PROTECTION ACT").unwrap();
        let text = extract_file(file.path(), 1024).unwrap();
        assert_eq!(text, "DIGITAL PRIVACY PROTECTION ACT");

        let err = extract_file(file.path(), 4).unwrap_err();
        assert!(matches!(err, IngestError::FileTooLarge { .. }));
    }

    #[test]
    fn document_id_is_stable() {
        let a = document_id("Section 1");
        assert_eq!(a, document_id("Section 1"));
        assert_ne!(a, document_id("Section 2"));
        assert_eq!(a.len(), "doc-".len() + 16);
    }
}
