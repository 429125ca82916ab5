//! Ebook format engines for Further.
//!
//! - [`epub`]: OPF metadata, navigation tree, chapter Markdown/plain text.
//! - [`pdf`]: Info metadata, outline, page text, styled page Markdown,
//!   chapter lookup by outline title.
//!
//! Both engines are synchronous; async callers run them on the blocking pool.

pub mod epub;
pub mod pdf;

pub use epub::{EpubDocument, EpubMetadata, TocNode, flatten_toc};
pub use pdf::{PdfChapter, PdfDocument, PdfTocEntry, chapter_page_range};
