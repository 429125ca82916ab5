//! PDF engine built on `lopdf`.

mod layout;
mod object;
mod outline;

use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};

use lopdf::{Document, Object, ObjectId};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use further_shared::{FurtherError, ProcessingKind, Result};

use self::object::{as_dict, as_number, get, inherited, text_of};

/// Info-dictionary keys reported in metadata, with their output names.
const INFO_KEYS: [(&[u8], &str); 9] = [
    (b"Title", "title"),
    (b"Author", "author"),
    (b"Subject", "subject"),
    (b"Keywords", "keywords"),
    (b"Creator", "creator"),
    (b"Producer", "producer"),
    (b"CreationDate", "creationDate"),
    (b"ModDate", "modDate"),
    (b"Trapped", "trapped"),
];

/// One flattened outline entry. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdfTocEntry {
    pub level: u32,
    pub title: String,
    pub page: u32,
}

/// Text of a chapter resolved through the outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdfChapter {
    pub content: String,
    pub pages: Vec<u32>,
}

/// Page span `[start, end)` of the first outline entry whose title contains
/// `title` (case-insensitive). The span ends at the next entry's page, or at
/// `last_page` for the final entry.
pub fn chapter_page_range(toc: &[(String, u32)], title: &str, last_page: u32) -> Option<Range<u32>> {
    let needle = title.to_lowercase();
    let idx = toc
        .iter()
        .position(|(entry, _)| entry.to_lowercase().contains(&needle))?;
    let start = toc[idx].1;
    let end = toc.get(idx + 1).map(|(_, page)| *page).unwrap_or(last_page);
    Some(start..end)
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A loaded PDF. The handle lives only as long as the operation using it.
pub struct PdfDocument {
    path: PathBuf,
    doc: Document,
    /// Page object ids in page order.
    pages: Vec<ObjectId>,
    file_size: u64,
}

impl PdfDocument {
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FurtherError::not_found(format!(
                "PDF file not found: {}",
                path.display()
            )));
        }
        let file_size = std::fs::metadata(path)
            .map_err(|e| FurtherError::io(path, e))?
            .len();
        let doc = Document::load(path).map_err(|e| {
            FurtherError::processing(
                ProcessingKind::Malformed,
                format!("cannot load PDF: {e}"),
                path,
                "open",
            )
        })?;
        let pages = doc.get_pages().into_values().collect::<Vec<_>>();
        debug!(pages = pages.len(), version = %doc.version, "opened PDF");

        Ok(Self {
            path: path.to_path_buf(),
            doc,
            pages,
            file_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Non-empty Info fields plus structural facts about the file.
    pub fn metadata(&self) -> Map<String, Value> {
        let mut meta = Map::new();
        meta.insert("format".into(), Value::from(format!("PDF {}", self.doc.version)));

        let info = self
            .doc
            .trailer
            .get(b"Info")
            .ok()
            .map(|obj| object::resolve(&self.doc, obj))
            .and_then(as_dict);
        if let Some(info) = info {
            for (key, name) in INFO_KEYS {
                if let Some(value) = get(&self.doc, info, key).and_then(text_of) {
                    let value = value.trim().to_string();
                    if !value.is_empty() {
                        meta.insert(name.into(), Value::from(value));
                    }
                }
            }
        }

        meta.insert("pages".into(), Value::from(self.page_count()));
        meta.insert("file_size".into(), Value::from(self.file_size));
        meta.insert("pdf_version".into(), Value::from(self.doc.version.clone()));
        meta.insert(
            "is_encrypted".into(),
            Value::from(self.doc.trailer.get(b"Encrypt").is_ok()),
        );
        if let Some((width, height)) = self.pages.first().and_then(|id| self.page_size(*id)) {
            meta.insert("page_width".into(), Value::from(width as f64));
            meta.insert("page_height".into(), Value::from(height as f64));
        }
        meta
    }

    fn page_size(&self, page_id: ObjectId) -> Option<(f32, f32)> {
        match inherited(&self.doc, page_id, b"MediaBox")? {
            Object::Array(rect) if rect.len() == 4 => {
                let nums: Vec<f32> = rect
                    .iter()
                    .filter_map(|o| as_number(object::resolve(&self.doc, o)))
                    .collect();
                (nums.len() == 4).then(|| ((nums[2] - nums[0]).abs(), (nums[3] - nums[1]).abs()))
            }
            _ => None,
        }
    }

    /// The outline flattened pre-order with nesting levels.
    pub fn toc_entries(&self) -> Vec<PdfTocEntry> {
        let page_numbers: HashMap<ObjectId, u32> = self
            .pages
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i as u32 + 1))
            .collect();
        outline::read_outline(&self.doc, &page_numbers)
    }

    /// `(title, page)` pairs of the outline.
    pub fn toc(&self) -> Vec<(String, u32)> {
        self.toc_entries()
            .into_iter()
            .map(|entry| (entry.title, entry.page))
            .collect()
    }

    fn page_id(&self, page: u32, operation: &'static str) -> Result<ObjectId> {
        page.checked_sub(1)
            .and_then(|i| self.pages.get(i as usize).copied())
            .ok_or_else(|| {
                FurtherError::processing(
                    ProcessingKind::PageOutOfRange,
                    format!("page {page} is outside 1..={}", self.page_count()),
                    &self.path,
                    operation,
                )
            })
    }

    /// Plain text of a 1-based page.
    pub fn page_text(&self, page: u32) -> Result<String> {
        self.page_id(page, "page_text")?;
        self.doc.extract_text(&[page]).map_err(|e| {
            FurtherError::processing(
                ProcessingKind::Malformed,
                format!("Failed to extract page text: {e}"),
                &self.path,
                "page_text",
            )
        })
    }

    /// Styled Markdown of a 1-based page.
    ///
    /// Pages set in composite fonts fall back to unstyled text lines.
    pub fn page_markdown(&self, page: u32) -> Result<String> {
        let page_id = self.page_id(page, "page_markdown")?;
        let lines = layout::page_lines(&self.doc, page_id).map_err(|e| {
            FurtherError::processing(
                ProcessingKind::Malformed,
                format!("Failed to read page content: {e}"),
                &self.path,
                "page_markdown",
            )
        })?;

        match lines {
            Some(lines) => Ok(layout::render_lines(&lines)),
            None => {
                debug!(page, "composite fonts on page, using plain text");
                let text = self.page_text(page)?;
                Ok(text
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
        }
    }

    /// Text of the first outline chapter whose title contains `title`.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn chapter_by_title(&self, title: &str) -> Result<PdfChapter> {
        let toc = self.toc();
        let range = chapter_page_range(&toc, title, self.page_count()).ok_or_else(|| {
            FurtherError::processing(
                ProcessingKind::ChapterNotFound,
                "Chapter not found",
                &self.path,
                "chapter_lookup",
            )
        })?;

        let pages: Vec<u32> = range.collect();
        let texts = pages
            .iter()
            .map(|page| self.page_text(*page))
            .collect::<Result<Vec<_>>>()?;
        info!(chapter = title, pages = pages.len(), "extracted PDF chapter");

        Ok(PdfChapter {
            content: texts.join("\n"),
            pages,
        })
    }
}

// ---------------------------------------------------------------------------
// Path-level operations
// ---------------------------------------------------------------------------

#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_metadata(path: &Path) -> Result<Map<String, Value>> {
    let meta = PdfDocument::open(path)?.metadata();
    info!(fields = meta.len(), "collected PDF metadata");
    Ok(meta)
}

#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_toc(path: &Path) -> Result<Vec<(String, u32)>> {
    Ok(PdfDocument::open(path)?.toc())
}

pub fn page_text(path: &Path, page: u32) -> Result<String> {
    PdfDocument::open(path)?.page_text(page)
}

pub fn page_markdown(path: &Path, page: u32) -> Result<String> {
    PdfDocument::open(path)?.page_markdown(page)
}

pub fn chapter_by_title(path: &Path, title: &str) -> Result<PdfChapter> {
    PdfDocument::open(path)?.chapter_by_title(title)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use lopdf::content::{Content, Operation};
    use lopdf::{Stream, dictionary};

    use super::*;

    fn text_op(font: &str, size: i64, y: i64, text: &str) -> Vec<Operation> {
        vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font.into(), size.into()]),
            Operation::new("Td", vec![72.into(), y.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ]
    }

    /// Four pages, outline Intro→1, Body→2, End→4, and three Type1 fonts.
    fn build_pdf(dir: &Path) -> PathBuf {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font = |doc: &mut Document, base: &str| {
            doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => base,
                "Encoding" => "WinAnsiEncoding",
            })
        };
        let regular = font(&mut doc, "Helvetica");
        let bold = font(&mut doc, "Helvetica-Bold");
        let oblique = font(&mut doc, "Helvetica-Oblique");
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => regular, "F2" => bold, "F3" => oblique },
        });

        let mut page_bodies: Vec<Vec<Operation>> = Vec::new();
        let mut first = text_op("F2", 18, 720, "Introduction");
        first.extend(vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 690.into()]),
            Operation::new("Tj", vec![Object::string_literal("Plain words ")]),
            Operation::new("Tf", vec!["F3".into(), 12.into()]),
            Operation::new("Tj", vec![Object::string_literal("slanted")]),
            Operation::new("ET", vec![]),
        ]);
        page_bodies.push(first);
        page_bodies.push(text_op("F1", 12, 700, "Body begins here"));
        page_bodies.push(text_op("F1", 12, 700, "Body continues"));
        page_bodies.push(text_op("F1", 12, 700, "The end"));

        let mut page_ids = Vec::new();
        for operations in page_bodies {
            let content = Content { operations };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().expect("encode")));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            page_ids.push(page_id);
        }

        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
            "Count" => page_ids.len() as i64,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let outlines_id = doc.new_object_id();
        let item_ids: Vec<ObjectId> = (0..3).map(|_| doc.new_object_id()).collect();
        let entries = [("Intro", 0), ("Body", 1), ("End", 3)];
        for (i, (title, page_idx)) in entries.iter().enumerate() {
            let mut item = dictionary! {
                "Title" => Object::string_literal(*title),
                "Parent" => outlines_id,
                "Dest" => vec![Object::Reference(page_ids[*page_idx]), "Fit".into()],
            };
            if i + 1 < item_ids.len() {
                item.set("Next", item_ids[i + 1]);
            }
            if i > 0 {
                item.set("Prev", item_ids[i - 1]);
            }
            doc.objects.insert(item_ids[i], Object::Dictionary(item));
        }
        doc.objects.insert(
            outlines_id,
            Object::Dictionary(dictionary! {
                "Type" => "Outlines",
                "First" => item_ids[0],
                "Last" => item_ids[2],
                "Count" => 3,
            }),
        );

        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal("Sample Book"),
            "Author" => Object::string_literal("A. Writer"),
            "Subject" => Object::string_literal(""),
        });
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "Outlines" => outlines_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let path = dir.join("sample.pdf");
        doc.save(&path).expect("save pdf");
        path
    }

    #[test]
    fn chapter_range_for_middle_entry() {
        let toc = vec![
            ("Intro".to_string(), 1),
            ("Body".to_string(), 5),
            ("End".to_string(), 20),
        ];
        let range = chapter_page_range(&toc, "body", 25).expect("match");
        assert_eq!(range, 5..20);
        assert_eq!(range.clone().last(), Some(19));
    }

    #[test]
    fn chapter_range_final_entry_ends_at_last_page() {
        let toc = vec![("Intro".to_string(), 1), ("Appendix".to_string(), 8)];
        assert_eq!(chapter_page_range(&toc, "APPEND", 10), Some(8..10));
        assert_eq!(chapter_page_range(&toc, "missing", 10), None);
    }

    #[test]
    fn metadata_reports_info_and_structure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = build_pdf(dir.path());

        let meta = read_metadata(&path).expect("metadata");
        assert_eq!(meta["title"], "Sample Book");
        assert_eq!(meta["author"], "A. Writer");
        assert!(meta.get("subject").is_none());
        assert_eq!(meta["pages"], 4);
        assert_eq!(meta["pdf_version"], "1.5");
        assert_eq!(meta["is_encrypted"], false);
        assert_eq!(meta["page_width"], 595.0);
        assert_eq!(meta["page_height"], 842.0);
        assert_eq!(
            meta["file_size"].as_u64(),
            Some(std::fs::metadata(&path).expect("stat").len())
        );
    }

    #[test]
    fn toc_maps_destinations_to_pages() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = build_pdf(dir.path());

        let toc = read_toc(&path).expect("toc");
        assert_eq!(
            toc,
            vec![
                ("Intro".to_string(), 1),
                ("Body".to_string(), 2),
                ("End".to_string(), 4)
            ]
        );
    }

    #[test]
    fn chapter_by_title_reads_page_span() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = build_pdf(dir.path());

        let chapter = chapter_by_title(&path, "bod").expect("chapter");
        assert_eq!(chapter.pages, vec![2, 3]);
        assert!(chapter.content.contains("Body begins here"));
        assert!(chapter.content.contains("Body continues"));
        assert!(!chapter.content.contains("The end"));
    }

    #[test]
    fn chapter_by_title_miss_is_lookup_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = build_pdf(dir.path());

        let err = chapter_by_title(&path, "epilogue").unwrap_err();
        assert!(err.is_chapter_not_found());
        assert!(err.to_string().contains("operation=chapter_lookup"));
    }

    #[test]
    fn page_markdown_styles_runs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = build_pdf(dir.path());

        let md = page_markdown(&path, 1).expect("markdown");
        assert_eq!(md, "**## Introduction**\nPlain words *slanted*");
    }

    #[test]
    fn page_out_of_range() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = build_pdf(dir.path());

        let err = page_text(&path, 5).unwrap_err();
        assert!(matches!(
            err,
            FurtherError::Processing {
                kind: ProcessingKind::PageOutOfRange,
                ..
            }
        ));
        assert!(page_text(&path, 0).is_err());
    }

    #[test]
    fn page_text_extracts_words() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = build_pdf(dir.path());

        let text = page_text(&path, 2).expect("text");
        assert!(text.contains("Body begins here"));
    }
}
