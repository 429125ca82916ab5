//! Open Library catalog adapter.
//!
//! Open Library hosts no files itself; download links are synthesized from
//! the Internet Archive identifiers (`ia`) attached to each search document.

use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use further_shared::{BookFormatLink, DiscoveryBook, DiscoveryResponse, Result, Source};

use crate::CatalogAdapter;
use crate::http::get_json;
use crate::lenient;
use crate::query::build_query;

/// Archive identifiers per document that get download links.
const MAX_ARCHIVE_IDS: usize = 2;

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(rename = "numFound", default, deserialize_with = "lenient::integer")]
    num_found: Option<i64>,
    #[serde(default, deserialize_with = "lenient::items")]
    docs: Vec<Doc>,
}

#[derive(Debug, Deserialize)]
struct Doc {
    #[serde(default, deserialize_with = "lenient::first_string")]
    key: Option<String>,
    #[serde(default, deserialize_with = "lenient::first_string")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient::first_string")]
    subtitle: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    author_name: Vec<String>,
    #[serde(default, deserialize_with = "lenient::integer")]
    first_publish_year: Option<i64>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    ia: Vec<String>,
    #[serde(default)]
    publisher: Value,
}

/// Open Library `/search.json` adapter.
#[derive(Debug, Clone)]
pub struct OpenLibraryAdapter {
    client: Client,
    url: String,
    archive_base: String,
}

impl OpenLibraryAdapter {
    pub fn new(client: Client, url: impl Into<String>, archive_base: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            archive_base: archive_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn archive_links(&self, ia_id: &str) -> [BookFormatLink; 2] {
        let base = &self.archive_base;
        [
            BookFormatLink::new("pdf", format!("{base}/{ia_id}/{ia_id}.pdf")),
            BookFormatLink::new("epub", format!("{base}/{ia_id}/{ia_id}.epub")),
        ]
    }

    fn into_book(&self, doc: Doc) -> DiscoveryBook {
        let mut book = DiscoveryBook::new(Source::OpenLibrary);
        book.title = doc.title;
        book.authors = doc.author_name;
        book.year = doc.first_publish_year.and_then(|y| i32::try_from(y).ok());
        book.source_id = doc.key;
        book.description = doc.subtitle;
        book.download_links = doc
            .ia
            .iter()
            .take(MAX_ARCHIVE_IDS)
            .flat_map(|ia| self.archive_links(ia))
            .collect();

        let mut extra = Map::new();
        extra.insert("publishers".into(), doc.publisher);
        book.extra = Some(extra);
        book
    }
}

impl CatalogAdapter for OpenLibraryAdapter {
    fn source(&self) -> Source {
        Source::OpenLibrary
    }

    #[instrument(skip(self), fields(source = "openlibrary"))]
    async fn search(&self, query: &str, limit: usize) -> Result<DiscoveryResponse> {
        let refined = build_query(query, &[] as &[&str]);
        let params = [("q", refined), ("limit", limit.to_string())];
        let page: SearchPage = get_json(&self.client, &self.url, &params).await?;

        let books: Vec<DiscoveryBook> = page
            .docs
            .into_iter()
            .take(limit)
            .map(|doc| self.into_book(doc))
            .collect();
        debug!(count = books.len(), "openlibrary results");

        Ok(DiscoveryResponse::new(Source::OpenLibrary, query, books)
            .with_total(page.num_found.and_then(|n| u64::try_from(n).ok())))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::http::build_client;

    fn adapter(server: &MockServer) -> OpenLibraryAdapter {
        OpenLibraryAdapter::new(
            build_client(5).expect("client"),
            format!("{}/search.json", server.uri()),
            "https://archive.example/download/",
        )
    }

    #[tokio::test]
    async fn synthesizes_archive_links_for_two_identifiers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search.json"))
            .and(query_param("q", "introduction"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "numFound": 1234,
                "num_found": 1234,
                "docs": [
                    {
                        "key": "/works/OL1W",
                        "title": "An Introduction",
                        "subtitle": "for beginners",
                        "author_name": ["A. Author"],
                        "first_publish_year": 1901,
                        "ia": ["first_id", "second_id", "third_id"],
                        "publisher": ["Pub A", "Pub B"]
                    },
                    {"key": "/works/OL2W", "title": "No Scans"}
                ]
            })))
            .mount(&server)
            .await;

        let response = adapter(&server).search("Intro", 5).await.expect("search");
        assert_eq!(response.query, "Intro");
        assert_eq!(response.total_results, Some(1234));
        assert_eq!(response.books.len(), 2);

        let book = &response.books[0];
        assert_eq!(book.source_id.as_deref(), Some("/works/OL1W"));
        assert_eq!(book.description.as_deref(), Some("for beginners"));
        assert_eq!(book.year, Some(1901));
        let urls: Vec<&str> = book.download_links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://archive.example/download/first_id/first_id.pdf",
                "https://archive.example/download/first_id/first_id.epub",
                "https://archive.example/download/second_id/second_id.pdf",
                "https://archive.example/download/second_id/second_id.epub",
            ]
        );
        assert_eq!(book.extra.as_ref().expect("extra")["publishers"][0], "Pub A");

        assert!(response.books[1].download_links.is_empty());
    }

    #[tokio::test]
    async fn zero_results_is_empty_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"numFound": 0, "docs": []})))
            .mount(&server)
            .await;

        let response = adapter(&server).search("nothing", 5).await.expect("search");
        assert!(response.books.is_empty());
        assert_eq!(response.total_results, Some(0));
    }
}
