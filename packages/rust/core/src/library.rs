//! The local ebook library: listing, sandboxed lookup, and per-format reads.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use further_formats::{EpubMetadata, PdfChapter, epub, pdf};
use further_shared::{FurtherError, Result, resolve_under_root};

/// Ebook files directly under the library root, by format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EbookListing {
    pub epub: Vec<String>,
    pub pdf: Vec<String>,
}

/// The two formats the library can read structurally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookFormat {
    Epub,
    Pdf,
}

impl BookFormat {
    /// Format by case-insensitive suffix, `None` for anything else.
    pub fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "epub" => Some(Self::Epub),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BookMetadata {
    Epub(EpubMetadata),
    Pdf(Map<String, Value>),
}

/// EPUB entries are `(title, href)`, PDF entries `(title, page)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BookToc {
    Epub(Vec<(String, String)>),
    Pdf(Vec<(String, u32)>),
}

/// A library rooted at one directory. Every relative path is resolved
/// inside the root before a file is opened.
#[derive(Debug, Clone)]
pub struct Library {
    root: PathBuf,
}

impl Library {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if it is missing.
    pub fn ensure_root(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| FurtherError::io(&self.root, e))
    }

    pub fn list(&self) -> Result<EbookListing> {
        list_ebooks(&self.root)
    }

    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        resolve_under_root(&self.root, relative)
    }

    fn resolve_format(&self, relative: &str) -> Result<(PathBuf, BookFormat)> {
        let path = self.resolve(relative)?;
        let format = BookFormat::of(&path)
            .ok_or_else(|| FurtherError::unsupported("Unsupported file type"))?;
        Ok((path, format))
    }

    fn resolve_as(&self, relative: &str, wanted: BookFormat) -> Result<PathBuf> {
        let path = self.resolve(relative)?;
        if BookFormat::of(&path) != Some(wanted) {
            let name = match wanted {
                BookFormat::Epub => "EPUB",
                BookFormat::Pdf => "PDF",
            };
            return Err(FurtherError::unsupported(format!("{name} required")));
        }
        Ok(path)
    }

    #[instrument(skip(self))]
    pub fn metadata(&self, relative: &str) -> Result<BookMetadata> {
        match self.resolve_format(relative)? {
            (path, BookFormat::Epub) => epub::read_metadata(&path).map(BookMetadata::Epub),
            (path, BookFormat::Pdf) => pdf::read_metadata(&path).map(BookMetadata::Pdf),
        }
    }

    #[instrument(skip(self))]
    pub fn toc(&self, relative: &str) -> Result<BookToc> {
        match self.resolve_format(relative)? {
            (path, BookFormat::Epub) => epub::read_toc(&path).map(BookToc::Epub),
            (path, BookFormat::Pdf) => pdf::read_toc(&path).map(BookToc::Pdf),
        }
    }

    pub fn epub_metadata(&self, relative: &str) -> Result<EpubMetadata> {
        epub::read_metadata(&self.resolve_as(relative, BookFormat::Epub)?)
    }

    pub fn pdf_metadata(&self, relative: &str) -> Result<Map<String, Value>> {
        pdf::read_metadata(&self.resolve_as(relative, BookFormat::Pdf)?)
    }

    pub fn epub_toc(&self, relative: &str) -> Result<Vec<(String, String)>> {
        epub::read_toc(&self.resolve_as(relative, BookFormat::Epub)?)
    }

    pub fn pdf_toc(&self, relative: &str) -> Result<Vec<(String, u32)>> {
        pdf::read_toc(&self.resolve_as(relative, BookFormat::Pdf)?)
    }

    /// Markdown for `chapter` (`href[#anchor]`) of an EPUB.
    #[instrument(skip(self))]
    pub fn epub_chapter_markdown(&self, relative: &str, chapter: &str) -> Result<String> {
        epub::chapter_markdown(&self.resolve_as(relative, BookFormat::Epub)?, chapter)
    }

    /// Text of the first PDF chapter whose title contains `title`.
    #[instrument(skip(self))]
    pub fn pdf_chapter_text(&self, relative: &str, title: &str) -> Result<PdfChapter> {
        pdf::chapter_by_title(&self.resolve_as(relative, BookFormat::Pdf)?, title)
    }
}

/// Names of `.epub` and `.pdf` files directly under `root`, sorted.
#[instrument]
pub fn list_ebooks(root: &Path) -> Result<EbookListing> {
    let entries = std::fs::read_dir(root).map_err(|e| FurtherError::io(root, e))?;

    let mut listing = EbookListing::default();
    for entry in entries {
        let entry = entry.map_err(|e| FurtherError::io(root, e))?;
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        match BookFormat::of(&path) {
            Some(BookFormat::Epub) => listing.epub.push(name),
            Some(BookFormat::Pdf) => listing.pdf.push(name),
            None => {}
        }
    }
    listing.epub.sort();
    listing.pdf.sort();
    debug!(epub = listing.epub.len(), pdf = listing.pdf.len(), "listed library");
    Ok(listing)
}
