//! Project Gutenberg via the Gutendex JSON API.

use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use further_shared::{BookFormatLink, DiscoveryBook, DiscoveryResponse, Result, Source};

use crate::CatalogAdapter;
use crate::http::get_json;
use crate::lenient;

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default, deserialize_with = "lenient::integer")]
    count: Option<i64>,
    #[serde(default, deserialize_with = "lenient::items")]
    results: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default, deserialize_with = "lenient::first_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient::first_string")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient::items")]
    authors: Vec<Person>,
    #[serde(default, deserialize_with = "lenient::integer")]
    copyright_year: Option<i64>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    subjects: Vec<String>,
    /// MIME type → URL, in catalog order.
    #[serde(default, deserialize_with = "lenient::or_default")]
    formats: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct Person {
    #[serde(default, deserialize_with = "lenient::first_string")]
    name: Option<String>,
}

/// Gutendex search adapter (one page per query).
#[derive(Debug, Clone)]
pub struct GutendexAdapter {
    client: Client,
    url: String,
}

impl GutendexAdapter {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl CatalogAdapter for GutendexAdapter {
    fn source(&self) -> Source {
        Source::Gutendex
    }

    #[instrument(skip(self), fields(source = "gutendex"))]
    async fn search(&self, query: &str, limit: usize) -> Result<DiscoveryResponse> {
        let params = [("search", query.to_string()), ("page", "1".to_string())];
        let page: Page = get_json(&self.client, &self.url, &params).await?;

        let books: Vec<DiscoveryBook> = page
            .results
            .into_iter()
            .take(limit)
            .map(into_book)
            .collect();
        debug!(count = books.len(), "gutendex results");

        Ok(DiscoveryResponse::new(Source::Gutendex, query, books)
            .with_total(page.count.and_then(|c| u64::try_from(c).ok())))
    }
}

fn into_book(item: Item) -> DiscoveryBook {
    let mut book = DiscoveryBook::new(Source::Gutendex);
    book.title = item.title;
    book.authors = item.authors.into_iter().filter_map(|a| a.name).collect();
    book.year = item.copyright_year.and_then(|y| i32::try_from(y).ok());
    book.source_id = item.id;
    book.download_links = format_links(&item.formats);

    let mut extra = Map::new();
    extra.insert("subjects".into(), json!(item.subjects));
    book.extra = Some(extra);
    book
}

/// Links from the `formats` map, skipping blank URLs and `.gif` placeholders.
fn format_links(formats: &Map<String, Value>) -> Vec<BookFormatLink> {
    formats
        .iter()
        .filter_map(|(media_type, url)| {
            let url = url.as_str()?;
            if url.is_empty() || url.ends_with(".gif") {
                return None;
            }
            Some(BookFormatLink::new(media_type.clone(), url))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::http::build_client;

    fn adapter(server: &MockServer) -> GutendexAdapter {
        GutendexAdapter::new(build_client(5).expect("client"), format!("{}/books/", server.uri()))
    }

    #[tokio::test]
    async fn maps_results_and_skips_gif_links() {
        let server = MockServer::start().await;
        let body = json!({
            "count": 42,
            "results": [
                {
                    "id": 84,
                    "title": "Frankenstein",
                    "authors": [{"name": "Shelley, Mary Wollstonecraft"}, {"name": null}],
                    "subjects": ["Horror tales", "Science fiction"],
                    "copyright_year": 1818,
                    "formats": {
                        "application/epub+zip": "https://www.gutenberg.org/ebooks/84.epub3.images",
                        "image/jpeg": "https://www.gutenberg.org/cache/epub/84/cover.gif",
                        "text/plain": "",
                        "text/html": "https://www.gutenberg.org/ebooks/84.html.images"
                    }
                },
                {"id": 85, "title": "Second"},
                {"id": 86, "title": "Third"}
            ]
        });
        Mock::given(method("GET"))
            .and(path("/books/"))
            .and(query_param("search", "frankenstein"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let response = adapter(&server).search("frankenstein", 2).await.expect("search");
        assert_eq!(response.source, Source::Gutendex);
        assert_eq!(response.total_results, Some(42));
        assert_eq!(response.books.len(), 2);

        let book = &response.books[0];
        assert_eq!(book.source_id.as_deref(), Some("84"));
        assert_eq!(book.year, Some(1818));
        assert_eq!(book.authors, vec!["Shelley, Mary Wollstonecraft"]);
        let formats: Vec<&str> = book.download_links.iter().map(|l| l.format.as_str()).collect();
        assert_eq!(formats, vec!["application/epub+zip", "text/html"]);
        let extra = book.extra.as_ref().expect("extra");
        assert_eq!(extra["subjects"][1], "Science fiction");
    }

    #[tokio::test]
    async fn zero_results_is_empty_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/books/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 0, "results": []})))
            .mount(&server)
            .await;

        let response = adapter(&server).search("zzzz", 5).await.expect("search");
        assert!(response.books.is_empty());
        assert_eq!(response.total_results, Some(0));
    }

    #[tokio::test]
    async fn server_error_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = adapter(&server).search("x", 5).await.unwrap_err();
        assert!(matches!(err, further_shared::FurtherError::HttpStatus { status: 503, .. }));
    }
}
