//! Standard Ebooks via its OPDS (Atom) search feed.

use reqwest::Client;
use roxmltree::{Document, Node};
use tracing::{debug, instrument};

use further_shared::{
    BookFormatLink, DiscoveryBook, DiscoveryResponse, FurtherError, Result, Source,
};

use crate::CatalogAdapter;
use crate::http::{ATOM_ACCEPT, get_text};

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

/// Media types kept even when the link is not an acquisition link.
const BOOK_MEDIA_TYPES: [&str; 2] = ["application/epub+zip", "application/pdf"];

/// Standard Ebooks OPDS search adapter.
#[derive(Debug, Clone)]
pub struct StandardEbooksAdapter {
    client: Client,
    url: String,
}

impl StandardEbooksAdapter {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl CatalogAdapter for StandardEbooksAdapter {
    fn source(&self) -> Source {
        Source::StandardEbooks
    }

    #[instrument(skip(self), fields(source = "standard-ebooks"))]
    async fn search(&self, query: &str, limit: usize) -> Result<DiscoveryResponse> {
        let params = [("search", query.to_string())];
        let body = get_text(&self.client, &self.url, &params, ATOM_ACCEPT).await?;
        let books = parse_feed(&body, limit)?;
        debug!(count = books.len(), "standard ebooks results");

        let total = books.len() as u64;
        Ok(DiscoveryResponse::new(Source::StandardEbooks, query, books).with_total(Some(total)))
    }
}

/// Read the first `limit` Atom entries of `xml` as books.
fn parse_feed(xml: &str, limit: usize) -> Result<Vec<DiscoveryBook>> {
    let doc = Document::parse(xml)
        .map_err(|e| FurtherError::parse(format!("invalid Standard Ebooks feed: {e}")))?;

    Ok(doc
        .root_element()
        .children()
        .filter(|n| n.has_tag_name((ATOM_NS, "entry")))
        .take(limit)
        .map(entry_to_book)
        .collect())
}

fn entry_to_book(entry: Node<'_, '_>) -> DiscoveryBook {
    let mut book = DiscoveryBook::new(Source::StandardEbooks);
    book.title = child_text(entry, "title");
    book.authors = entry
        .children()
        .filter(|n| n.has_tag_name((ATOM_NS, "author")))
        .filter_map(|author| child_text(author, "name"))
        .collect();
    book.description = child_text(entry, "summary");
    book.source_id = child_text(entry, "id");
    book.download_links = entry
        .children()
        .filter(|n| n.has_tag_name((ATOM_NS, "link")))
        .filter_map(acquisition_link)
        .collect();
    book
}

fn acquisition_link(link: Node<'_, '_>) -> Option<BookFormatLink> {
    let href = link.attribute("href").filter(|h| !h.is_empty())?;
    let rel = link.attribute("rel").unwrap_or_default();
    let media_type = link.attribute("type");

    let is_acquisition = rel.to_lowercase().contains("acquisition");
    let is_book = media_type.is_some_and(|t| BOOK_MEDIA_TYPES.contains(&t));
    if !is_acquisition && !is_book {
        return None;
    }

    let mut out = BookFormatLink::new(media_type.unwrap_or(rel), href);
    out.label = (!rel.is_empty()).then(|| rel.to_string());
    Some(out)
}

fn child_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    node.children()
        .find(|n| n.has_tag_name((ATOM_NS, name)))
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
