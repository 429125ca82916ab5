//! HTML sanitization and conversion for ebook chapters.
//!
//! Chapter documents pulled out of an EPUB are cleaned with [`sanitize_html`],
//! optionally cut at an anchor with [`html_from_anchor`], then rendered either
//! as Markdown ([`to_markdown`], via `htmd`) or as plain text ([`to_plaintext`]).

mod cleanup;

use scraper::{ElementRef, Html, Node};
use tracing::{debug, instrument};

use further_shared::{FurtherError, Result};

/// Elements removed outright, content included.
const STRIPPED_TAGS: [&str; 7] = ["script", "style", "img", "svg", "iframe", "video", "nav"];

// ---------------------------------------------------------------------------
// Sanitizer
// ---------------------------------------------------------------------------

/// Strip non-content markup from an HTML document.
///
/// Removes `script`, `style`, `img`, `svg`, `iframe`, `video`, `nav` and
/// comments, then every element without text (ignoring whitespace) unless it
/// is a `br` or still contains an `img`. The root `<html>` element is kept so
/// the result is always a well-formed document.
pub fn sanitize_html(html: &str) -> String {
    let mut doc = Html::parse_document(html);

    let doomed: Vec<_> = doc
        .tree
        .root()
        .descendants()
        .filter(|node| match node.value() {
            Node::Comment(_) => true,
            Node::Element(el) => STRIPPED_TAGS.contains(&el.name()),
            _ => false,
        })
        .map(|node| node.id())
        .collect();
    for id in doomed {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }

    let root_id = doc.root_element().id();
    let empty: Vec<_> = doc
        .root_element()
        .descendants()
        .filter(|node| node.id() != root_id)
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() != "br")
        .filter(|el| !el.text().any(|t| !t.trim().is_empty()))
        .filter(|el| {
            !el.descendants()
                .filter_map(ElementRef::wrap)
                .any(|d| d.value().name() == "img")
        })
        .map(|el| el.id())
        .collect();
    debug!(stripped = empty.len(), "removing empty elements");
    for id in empty {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }

    doc.root_element().html()
}

// ---------------------------------------------------------------------------
// Anchor slicing
// ---------------------------------------------------------------------------

/// Cut a document at the element whose `id` is `anchor`.
///
/// The result is the anchored element followed by every node after it in
/// document order: its following siblings, then the following siblings of
/// each ancestor. Each node is emitted once, so nested content is never
/// repeated. Returns `None` when no element carries the id.
pub fn html_from_anchor(html: &str, anchor: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let start = doc
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().id() == Some(anchor))?;

    let mut fragments = vec![start.html()];
    let mut node = *start;
    loop {
        let next = loop {
            if let Some(sibling) = node.next_sibling() {
                break Some(sibling);
            }
            match node.parent() {
                Some(parent) => node = parent,
                None => break None,
            }
        };
        let Some(next) = next else { break };
        node = next;

        match node.value() {
            Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(node) {
                    fragments.push(el.html());
                }
            }
            Node::Text(text) => {
                if !text.trim().is_empty() {
                    fragments.push(escape_text(text));
                }
            }
            _ => {}
        }
    }

    Some(fragments.join("\n"))
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

// ---------------------------------------------------------------------------
// Renderers
// ---------------------------------------------------------------------------

/// Convert (sanitized) HTML to Markdown, keeping links and images.
#[instrument(skip_all, fields(html_len = html.len()))]
pub fn to_markdown(html: &str) -> Result<String> {
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["head", "script", "style"])
        .build();

    let raw_markdown = converter
        .convert(html)
        .map_err(|e| FurtherError::Conversion(format!("htmd conversion failed: {e}")))?;

    debug!(raw_len = raw_markdown.len(), "htmd conversion complete");
    Ok(cleanup::run_pipeline(&raw_markdown))
}

/// Text content of an HTML document, one text node per line, trimmed.
pub fn to_plaintext(html: &str) -> String {
    let doc = Html::parse_document(html);
    let text = doc.root_element().text().collect::<Vec<_>>().join("\n");
    text.trim().to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
