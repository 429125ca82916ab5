//! EPUB engine: container → OPF → navigation → chapter documents.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use roxmltree::ParsingOptions;
use scraper::{ElementRef, Html};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use zip::ZipArchive;
use zip::result::ZipError;

use further_shared::{FurtherError, ProcessingKind, Result};

const CONTAINER_PATH: &str = "META-INF/container.xml";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Dublin Core metadata of a publication. Absent fields are omitted on output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EpubMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub creator: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contributor: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subject: Vec<String>,
}

/// One entry of the navigation tree.
///
/// `href` is relative to the package document and may carry a `#fragment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocNode {
    pub title: String,
    pub href: String,
    pub children: Vec<TocNode>,
}

impl TocNode {
    pub fn new(title: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            href: href.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<TocNode>) -> Self {
        self.children = children;
        self
    }
}

/// Flatten a navigation tree pre-order into `(title, href)` pairs.
pub fn flatten_toc(nodes: &[TocNode]) -> Vec<(String, String)> {
    fn walk(nodes: &[TocNode], out: &mut Vec<(String, String)>) {
        for node in nodes {
            out.push((node.title.clone(), node.href.clone()));
            walk(&node.children, out);
        }
    }

    let mut out = Vec::new();
    walk(nodes, &mut out);
    out
}

#[derive(Debug, Clone)]
struct ManifestItem {
    id: String,
    /// Path inside the archive.
    zip_path: String,
    media_type: String,
    properties: String,
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// An opened EPUB archive with its package document already parsed.
pub struct EpubDocument {
    path: PathBuf,
    archive: ZipArchive<File>,
    opf_dir: String,
    manifest: Vec<ManifestItem>,
    metadata: EpubMetadata,
    toc: Vec<TocNode>,
}

impl EpubDocument {
    /// Open an EPUB and read its container, package document, and navigation.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FurtherError::not_found(format!(
                "EPUB file not found: {}",
                path.display()
            )));
        }

        let file = File::open(path).map_err(|e| FurtherError::io(path, e))?;
        let mut archive = ZipArchive::new(file).map_err(|e| malformed(path, format!("not a zip archive: {e}")))?;

        let container = read_entry(&mut archive, CONTAINER_PATH, path)?
            .ok_or_else(|| malformed(path, format!("missing {CONTAINER_PATH}")))?;
        let opf_path = rootfile_path(&container).map_err(|m| malformed(path, m))?;
        let opf_dir = parent_dir(&opf_path);

        let opf = read_entry(&mut archive, &opf_path, path)?
            .ok_or_else(|| malformed(path, format!("missing package document {opf_path}")))?;
        let package = parse_package(&opf, &opf_dir).map_err(|m| malformed(path, m))?;

        let mut toc = Vec::new();
        if let Some(nav) = package.manifest.iter().find(|item| {
            item.properties.split_whitespace().any(|p| p == "nav")
        }) {
            if let Some(html) = read_entry(&mut archive, &nav.zip_path, path)? {
                toc = parse_nav(&html, &parent_dir(&nav.zip_path), &opf_dir);
            }
        }
        if toc.is_empty() {
            let ncx = package
                .spine_toc
                .as_deref()
                .and_then(|id| package.manifest.iter().find(|item| item.id == id))
                .or_else(|| {
                    package
                        .manifest
                        .iter()
                        .find(|item| item.media_type == NCX_MEDIA_TYPE)
                });
            if let Some(ncx) = ncx {
                if let Some(xml) = read_entry(&mut archive, &ncx.zip_path, path)? {
                    toc = parse_ncx(&xml, &parent_dir(&ncx.zip_path), &opf_dir)
                        .unwrap_or_else(|m| {
                            warn!(error = %m, "unreadable NCX, table of contents is empty");
                            Vec::new()
                        });
                }
            }
        }

        debug!(
            opf = %opf_path,
            manifest = package.manifest.len(),
            toc = toc.len(),
            "opened EPUB"
        );

        Ok(Self {
            path: path.to_path_buf(),
            archive,
            opf_dir,
            manifest: package.manifest,
            metadata: package.metadata,
            toc,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &EpubMetadata {
        &self.metadata
    }

    /// The navigation tree, EPUB 3 nav preferred over NCX.
    pub fn toc(&self) -> &[TocNode] {
        &self.toc
    }

    /// Sanitized HTML for `href[#anchor]`.
    ///
    /// With an anchor, the output starts at the anchored element and runs to
    /// the end of the document.
    pub fn chapter_html(&mut self, chapter_href: &str) -> Result<String> {
        let (href, anchor) = match chapter_href.split_once('#') {
            Some((href, anchor)) => (href, Some(anchor)),
            None => (chapter_href, None),
        };

        let zip_path = resolve_href(&self.opf_dir, href);
        let in_manifest = self.manifest.iter().any(|item| item.zip_path == zip_path);
        if href.is_empty() || !in_manifest {
            return Err(self.lookup_error(format!("Chapter not found: {href}")));
        }

        let content = read_entry(&mut self.archive, &zip_path, &self.path)?
            .ok_or_else(|| self.lookup_error(format!("Chapter not found: {href}")))?;

        match anchor.filter(|a| !a.is_empty()) {
            Some(anchor) => {
                let sliced = further_markdown::html_from_anchor(&content, anchor)
                    .ok_or_else(|| self.lookup_error(format!("Anchor not found: {anchor}")))?;
                Ok(further_markdown::sanitize_html(&sliced))
            }
            None => Ok(further_markdown::sanitize_html(&content)),
        }
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn chapter_markdown(&mut self, chapter_href: &str) -> Result<String> {
        let html = self.chapter_html(chapter_href)?;
        further_markdown::to_markdown(&html)
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn chapter_plaintext(&mut self, chapter_href: &str) -> Result<String> {
        let html = self.chapter_html(chapter_href)?;
        Ok(further_markdown::to_plaintext(&html))
    }

    fn lookup_error(&self, message: String) -> FurtherError {
        FurtherError::processing(
            ProcessingKind::ChapterNotFound,
            message,
            &self.path,
            "chapter_lookup",
        )
    }
}

// ---------------------------------------------------------------------------
// Path-level operations
// ---------------------------------------------------------------------------

#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_metadata(path: &Path) -> Result<EpubMetadata> {
    let doc = EpubDocument::open(path)?;
    info!(title = ?doc.metadata.title, "collected EPUB metadata");
    Ok(doc.metadata)
}

/// Flattened `(title, href)` table of contents.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_toc(path: &Path) -> Result<Vec<(String, String)>> {
    let doc = EpubDocument::open(path)?;
    let entries = flatten_toc(doc.toc());
    info!(chapter_count = entries.len(), "extracted EPUB TOC entries");
    Ok(entries)
}

pub fn chapter_markdown(path: &Path, chapter_href: &str) -> Result<String> {
    EpubDocument::open(path)?.chapter_markdown(chapter_href)
}

pub fn chapter_plaintext(path: &Path, chapter_href: &str) -> Result<String> {
    EpubDocument::open(path)?.chapter_plaintext(chapter_href)
}

// ---------------------------------------------------------------------------
// Container and package parsing
// ---------------------------------------------------------------------------

struct Package {
    metadata: EpubMetadata,
    manifest: Vec<ManifestItem>,
    spine_toc: Option<String>,
}

fn xml_options() -> ParsingOptions {
    ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    }
}

fn rootfile_path(container: &str) -> std::result::Result<String, String> {
    let doc = roxmltree::Document::parse_with_options(container, xml_options())
        .map_err(|e| format!("invalid container.xml: {e}"))?;
    doc.descendants()
        .filter(|n| is_tag(n, "rootfile"))
        .find_map(|n| n.attribute("full-path"))
        .map(str::to_string)
        .ok_or_else(|| "container.xml names no rootfile".to_string())
}

fn parse_package(opf: &str, opf_dir: &str) -> std::result::Result<Package, String> {
    let doc = roxmltree::Document::parse_with_options(opf, xml_options())
        .map_err(|e| format!("invalid package document: {e}"))?;

    let mut metadata = EpubMetadata::default();
    if let Some(meta) = doc.descendants().find(|n| is_tag(n, "metadata")) {
        for node in meta
            .descendants()
            .filter(|n| n.is_element() && n.tag_name().namespace() == Some(DC_NS))
        {
            let value = node_text(&node);
            if value.is_empty() {
                continue;
            }
            match node.tag_name().name() {
                "title" => set_once(&mut metadata.title, value),
                "language" => set_once(&mut metadata.language, value),
                "identifier" => set_once(&mut metadata.identifier, value),
                "date" => set_once(&mut metadata.date, value),
                "publisher" => set_once(&mut metadata.publisher, value),
                "description" => set_once(&mut metadata.description, value),
                "creator" => metadata.creator.push(value),
                "contributor" => metadata.contributor.push(value),
                "subject" => metadata.subject.push(value),
                _ => {}
            }
        }
    }

    let manifest = doc
        .descendants()
        .filter(|n| is_tag(n, "item"))
        .filter_map(|n| {
            Some(ManifestItem {
                id: n.attribute("id")?.to_string(),
                zip_path: resolve_href(opf_dir, n.attribute("href")?),
                media_type: n.attribute("media-type").unwrap_or_default().to_string(),
                properties: n.attribute("properties").unwrap_or_default().to_string(),
            })
        })
        .collect();

    let spine_toc = doc
        .descendants()
        .find(|n| is_tag(n, "spine"))
        .and_then(|n| n.attribute("toc"))
        .map(str::to_string);

    Ok(Package {
        metadata,
        manifest,
        spine_toc,
    })
}

fn set_once(slot: &mut Option<String>, value: String) {
    if slot.is_none() {
        *slot = Some(value);
    }
}

fn is_tag(node: &roxmltree::Node, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name
}

fn node_text(node: &roxmltree::Node) -> String {
    let text: String = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    collapse_whitespace(&text)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Navigation parsing
// ---------------------------------------------------------------------------

/// EPUB 3 navigation document: `nav[epub:type~=toc] > ol > li`.
fn parse_nav(html: &str, nav_dir: &str, opf_dir: &str) -> Vec<TocNode> {
    let doc = Html::parse_document(html);
    let Some(nav) = doc
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| {
            el.value().name() == "nav"
                && el
                    .value()
                    .attr("epub:type")
                    .is_some_and(|t| t.split_whitespace().any(|t| t == "toc"))
        })
    else {
        return Vec::new();
    };

    let Some(list) = nav
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "ol")
    else {
        return Vec::new();
    };

    parse_nav_list(list, nav_dir, opf_dir)
}

fn parse_nav_list(list: ElementRef, nav_dir: &str, opf_dir: &str) -> Vec<TocNode> {
    list.children()
        .filter_map(ElementRef::wrap)
        .filter(|li| li.value().name() == "li")
        .filter_map(|li| {
            let label = li
                .children()
                .filter_map(ElementRef::wrap)
                .find(|el| matches!(el.value().name(), "a" | "span"))?;
            let title = collapse_whitespace(&label.text().collect::<String>());
            let href = label
                .value()
                .attr("href")
                .map(|h| toc_href(nav_dir, opf_dir, h))
                .unwrap_or_default();
            let children = li
                .children()
                .filter_map(ElementRef::wrap)
                .find(|el| el.value().name() == "ol")
                .map(|ol| parse_nav_list(ol, nav_dir, opf_dir))
                .unwrap_or_default();
            Some(TocNode::new(title, href).with_children(children))
        })
        .collect()
}

/// EPUB 2 NCX: `navMap > navPoint` with `navLabel/text` and `content@src`.
fn parse_ncx(xml: &str, ncx_dir: &str, opf_dir: &str) -> std::result::Result<Vec<TocNode>, String> {
    let doc = roxmltree::Document::parse_with_options(xml, xml_options())
        .map_err(|e| format!("invalid NCX: {e}"))?;
    let Some(nav_map) = doc.descendants().find(|n| is_tag(n, "navMap")) else {
        return Ok(Vec::new());
    };
    Ok(parse_nav_points(nav_map, ncx_dir, opf_dir))
}

fn parse_nav_points(parent: roxmltree::Node, ncx_dir: &str, opf_dir: &str) -> Vec<TocNode> {
    parent
        .children()
        .filter(|n| is_tag(n, "navPoint"))
        .map(|point| {
            let title = point
                .children()
                .find(|n| is_tag(n, "navLabel"))
                .map(|label| node_text(&label))
                .unwrap_or_default();
            let href = point
                .children()
                .find(|n| is_tag(n, "content"))
                .and_then(|n| n.attribute("src"))
                .map(|src| toc_href(ncx_dir, opf_dir, src))
                .unwrap_or_default();
            TocNode::new(title, href).with_children(parse_nav_points(point, ncx_dir, opf_dir))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Archive helpers
// ---------------------------------------------------------------------------

fn read_entry(archive: &mut ZipArchive<File>, name: &str, path: &Path) -> Result<Option<String>> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(malformed(path, format!("cannot read {name}: {e}"))),
    };
    let mut buf = Vec::new();
    entry
        .read_to_end(&mut buf)
        .map_err(|e| FurtherError::io(path, e))?;
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

fn malformed(path: &Path, message: impl Into<String>) -> FurtherError {
    FurtherError::processing(ProcessingKind::Malformed, message, path, "open")
}

/// Directory part of an archive path (`OEBPS/content.opf` → `OEBPS`).
fn parent_dir(zip_path: &str) -> String {
    zip_path
        .rsplit_once('/')
        .map(|(dir, _)| dir.to_string())
        .unwrap_or_default()
}

/// Resolve a relative href against an archive directory, folding `.` and `..`.
fn resolve_href(base_dir: &str, href: &str) -> String {
    let mut parts: Vec<&str> = base_dir.split('/').filter(|p| !p.is_empty()).collect();
    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Rebase a navigation href so it is relative to the package document.
fn toc_href(doc_dir: &str, opf_dir: &str, href: &str) -> String {
    let (target, fragment) = match href.split_once('#') {
        Some((target, fragment)) => (target, Some(fragment)),
        None => (href, None),
    };

    let full = resolve_href(doc_dir, target);
    let rebased = if opf_dir.is_empty() {
        full
    } else {
        full.strip_prefix(&format!("{opf_dir}/"))
            .map(str::to_string)
            .unwrap_or(full)
    };

    match fragment {
        Some(fragment) => format!("{rebased}#{fragment}"),
        None => rebased,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
