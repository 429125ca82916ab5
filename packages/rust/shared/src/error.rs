//! Error types for Further.
//!
//! Library crates use [`FurtherError`] via `thiserror`.
//! The CLI wraps this with `color-eyre`; the HTTP layer maps it to status codes.

use std::path::PathBuf;

/// Classification of document-processing failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingKind {
    /// A chapter href, anchor, or title did not resolve.
    ChapterNotFound,
    /// A page number outside `1..=page_count`.
    PageOutOfRange,
    /// The container or page stream could not be read.
    Malformed,
}

/// Top-level error type for all Further operations.
#[derive(Debug, thiserror::Error)]
pub enum FurtherError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP transport error while talking to a catalog or download host.
    #[error("network error: {0}")]
    Network(String),

    /// A remote endpoint answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// Catalog payload (JSON or Atom) could not be decoded.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Extraction failure inside an EPUB or PDF.
    #[error("{message} (file={}, operation={operation})", path.display())]
    Processing {
        kind: ProcessingKind,
        message: String,
        path: PathBuf,
        operation: &'static str,
    },

    /// Requested path resolves outside the library root.
    #[error("access denied: {} is outside the allowed root", path.display())]
    Forbidden { path: PathBuf },

    /// Requested file or catalog entity does not exist.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// File type not handled by the requested operation.
    #[error("unsupported file type: {message}")]
    Unsupported { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Request parameter validation error.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// HTML-to-Markdown conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FurtherError>;

impl FurtherError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Create a processing error tied to a document and the failing operation.
    pub fn processing(
        kind: ProcessingKind,
        msg: impl Into<String>,
        path: impl Into<PathBuf>,
        operation: &'static str,
    ) -> Self {
        Self::Processing {
            kind,
            message: msg.into(),
            path: path.into(),
            operation,
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is a chapter/anchor lookup miss.
    pub fn is_chapter_not_found(&self) -> bool {
        matches!(
            self,
            Self::Processing {
                kind: ProcessingKind::ChapterNotFound,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = FurtherError::config("missing library root");
        assert_eq!(err.to_string(), "config error: missing library root");

        let err = FurtherError::validation("limit must be between 1 and 50");
        assert!(err.to_string().contains("between 1 and 50"));
    }

    #[test]
    fn processing_error_names_file_and_operation() {
        let err = FurtherError::processing(
            ProcessingKind::ChapterNotFound,
            "Anchor not found: sec2",
            "/library/book.epub",
            "chapter_lookup",
        );
        assert_eq!(
            err.to_string(),
            "Anchor not found: sec2 (file=/library/book.epub, operation=chapter_lookup)"
        );
        assert!(err.is_chapter_not_found());
    }

    #[test]
    fn http_status_display() {
        let err = FurtherError::HttpStatus {
            url: "https://gutendex.com/books/".into(),
            status: 503,
        };
        assert_eq!(err.to_string(), "HTTP 503 from https://gutendex.com/books/");
        assert!(!err.is_chapter_not_found());
    }
}
