//! Bounded summaries of downloaded books.

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use further_formats::{EpubDocument, PdfDocument, flatten_toc};
use further_shared::{FurtherError, Result};

/// Characters kept from files that are neither PDF nor EPUB.
pub const RAW_SUMMARY_CHARS: usize = 4096;

/// Bytes read from unknown formats; enough for [`RAW_SUMMARY_CHARS`] in any UTF-8.
const RAW_READ_BYTES: u64 = 4 * RAW_SUMMARY_CHARS as u64;

/// Outcome of parsing one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedBook {
    /// Path relative to the library root (file name when outside it).
    pub relative_path: String,
    /// `pdf`, `epub`, or the raw suffix without its dot.
    pub format: String,
    pub size_bytes: u64,
    pub summary: String,
}

/// Parse `path` off the async runtime. See [`parse_book_blocking`].
pub async fn parse_book(
    root: &Path,
    path: &Path,
    limit_pages: usize,
    limit_chapters: usize,
) -> Result<ParsedBook> {
    let root = root.to_path_buf();
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        parse_book_blocking(&root, &path, limit_pages, limit_chapters)
    })
    .await
    .map_err(|e| FurtherError::Conversion(format!("parse task failed: {e}")))?
}

/// Summarize a book, dispatching on its lowercased suffix.
///
/// - `.pdf`: text of the first `limit_pages` pages
/// - `.epub`: plaintext of the first `limit_chapters` toc entries; a chapter
///   that fails is skipped
/// - anything else: the first 4096 characters, invalid UTF-8 dropped
#[instrument(skip_all, fields(path = %path.display()))]
pub fn parse_book_blocking(
    root: &Path,
    path: &Path,
    limit_pages: usize,
    limit_chapters: usize,
) -> Result<ParsedBook> {
    let suffix = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let (format, summary) = match suffix.as_str() {
        "pdf" => ("pdf".to_string(), pdf_summary(path, limit_pages)?),
        "epub" => ("epub".to_string(), epub_summary(path, limit_chapters)?),
        _ => (suffix, raw_summary(path)?),
    };

    let size_bytes = std::fs::metadata(path)
        .map_err(|e| FurtherError::io(path, e))?
        .len();

    Ok(ParsedBook {
        relative_path: relative_to(root, path),
        format,
        size_bytes,
        summary,
    })
}

fn pdf_summary(path: &Path, limit_pages: usize) -> Result<String> {
    let doc = PdfDocument::open(path)?;
    let pages = (doc.page_count() as usize).min(limit_pages);
    let texts = (1..=pages as u32)
        .map(|page| doc.page_text(page).map(|t| t.trim().to_string()))
        .collect::<Result<Vec<_>>>()?;
    Ok(texts.join("\n\n"))
}

fn epub_summary(path: &Path, limit_chapters: usize) -> Result<String> {
    let mut doc = EpubDocument::open(path)?;
    let toc = flatten_toc(doc.toc());

    let mut texts = Vec::new();
    for (title, href) in toc.iter().take(limit_chapters) {
        match doc.chapter_plaintext(href) {
            Ok(text) => texts.push(text.trim().to_string()),
            Err(e) => warn!(chapter = %title, error = %e, "failed to parse EPUB chapter"),
        }
    }
    Ok(texts.join("\n\n"))
}

fn raw_summary(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path).map_err(|e| FurtherError::io(path, e))?;
    let mut bytes = Vec::new();
    file.take(RAW_READ_BYTES)
        .read_to_end(&mut bytes)
        .map_err(|e| FurtherError::io(path, e))?;

    Ok(String::from_utf8_lossy(&bytes)
        .chars()
        .filter(|&c| c != char::REPLACEMENT_CHARACTER)
        .take(RAW_SUMMARY_CHARS)
        .collect())
}

fn relative_to(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) => rel.to_string_lossy().into_owned(),
        Err(_) => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn unknown_format_is_truncated_to_4096_chars() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("notes.XYZ");
        std::fs::write(&path, vec![b'a'; 10_000]).expect("write");

        let parsed = parse_book_blocking(tmp.path(), &path, 3, 3).expect("parse");
        assert_eq!(parsed.format, "xyz");
        assert_eq!(parsed.size_bytes, 10_000);
        assert_eq!(parsed.summary.chars().count(), 4096);
        assert_eq!(parsed.relative_path, "notes.XYZ");
    }

    #[test]
    fn invalid_utf8_is_dropped() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("mixed.txt");
        let mut file = std::fs::File::create(&path).expect("create");
        file.write_all(b"ab\xff\xfecd").expect("write");

        let parsed = parse_book_blocking(tmp.path(), &path, 3, 3).expect("parse");
        assert_eq!(parsed.summary, "abcd");
        assert_eq!(parsed.format, "txt");
    }

    #[test]
    fn relative_path_under_root_keeps_subdirectories() {
        let root = Path::new("/library");
        assert_eq!(
            relative_to(root, Path::new("/library/downloaded/a.pdf")),
            "downloaded/a.pdf"
        );
        assert_eq!(relative_to(root, Path::new("/elsewhere/b.pdf")), "b.pdf");
    }

    #[test]
    fn epub_summary_skips_missing_chapters() {
        use zip::write::SimpleFileOptions;

        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("tiny.epub");
        let mut zip = zip::ZipWriter::new(std::fs::File::create(&path).expect("create"));
        let opts = SimpleFileOptions::default();
        let files = [
            ("mimetype", "application/epub+zip".to_string()),
            (
                "META-INF/container.xml",
                r#"<?xml version="1.0"?><container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container"><rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles></container>"#.to_string(),
            ),
            (
                "OEBPS/content.opf",
                r#"<?xml version="1.0"?><package xmlns="http://www.idpf.org/2007/opf" version="3.0"><metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>Tiny</dc:title></metadata><manifest><item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/><item id="c1" href="one.xhtml" media-type="application/xhtml+xml"/><item id="c3" href="three.xhtml" media-type="application/xhtml+xml"/></manifest><spine><itemref idref="c1"/><itemref idref="c3"/></spine></package>"#.to_string(),
            ),
            (
                "OEBPS/nav.xhtml",
                r#"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops"><body><nav epub:type="toc"><ol><li><a href="one.xhtml">One</a></li><li><a href="missing.xhtml">Two</a></li><li><a href="three.xhtml">Three</a></li></ol></nav></body></html>"#.to_string(),
            ),
            ("OEBPS/one.xhtml", "<html><body><p>First chapter</p></body></html>".to_string()),
            ("OEBPS/three.xhtml", "<html><body><p>Third chapter</p></body></html>".to_string()),
        ];
        for (name, body) in files {
            zip.start_file(name, opts).expect("start");
            zip.write_all(body.as_bytes()).expect("write");
        }
        zip.finish().expect("finish");

        let parsed = parse_book_blocking(tmp.path(), &path, 3, 3).expect("parse");
        assert_eq!(parsed.format, "epub");
        assert_eq!(parsed.summary, "First chapter\n\nThird chapter");

        let first_only = parse_book_blocking(tmp.path(), &path, 3, 1).expect("parse");
        assert_eq!(first_only.summary, "First chapter");
    }

    #[tokio::test]
    async fn async_parse_matches_blocking() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("plain.txt");
        std::fs::write(&path, "hello").expect("write");

        let parsed = parse_book(tmp.path(), &path, 1, 1).await.expect("parse");
        assert_eq!(parsed.summary, "hello");
        assert_eq!(parsed.size_bytes, 5);
    }
}
