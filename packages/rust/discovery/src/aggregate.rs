//! Concurrent fan-out over the configured catalogs.

use futures_util::future::join_all;
use tracing::{info, instrument, warn};

use further_shared::{
    CatalogConfig, DiscoveryBatch, DiscoveryResponse, Result, Source, utc_timestamp,
};

use crate::CatalogAdapter;
use crate::gutendex::GutendexAdapter;
use crate::http::build_client;
use crate::openlibrary::OpenLibraryAdapter;
use crate::standard_ebooks::StandardEbooksAdapter;

/// One adapter per [`Source`].
#[derive(Debug, Clone)]
pub struct Catalogs {
    pub gutendex: GutendexAdapter,
    pub openlibrary: OpenLibraryAdapter,
    pub standard_ebooks: StandardEbooksAdapter,
}

impl Catalogs {
    pub fn new(
        gutendex: GutendexAdapter,
        openlibrary: OpenLibraryAdapter,
        standard_ebooks: StandardEbooksAdapter,
    ) -> Self {
        Self {
            gutendex,
            openlibrary,
            standard_ebooks,
        }
    }

    /// Build all adapters over one shared HTTP client.
    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        let client = build_client(config.timeout_secs)?;
        Ok(Self::new(
            GutendexAdapter::new(client.clone(), &config.gutendex_url),
            OpenLibraryAdapter::new(
                client.clone(),
                &config.openlibrary_search_url,
                &config.archive_base_url,
            ),
            StandardEbooksAdapter::new(client, &config.standard_ebooks_url),
        ))
    }

    /// Query a single catalog.
    pub async fn search_source(
        &self,
        source: Source,
        query: &str,
        limit: usize,
    ) -> Result<DiscoveryResponse> {
        match source {
            Source::Gutendex => self.gutendex.search(query, limit).await,
            Source::OpenLibrary => self.openlibrary.search(query, limit).await,
            Source::StandardEbooks => self.standard_ebooks.search(query, limit).await,
        }
    }

    /// Query the selected catalogs concurrently.
    ///
    /// A catalog that fails is logged and left out of the batch; the batch
    /// itself never fails.
    #[instrument(skip(self))]
    pub async fn discover_books(
        &self,
        query: &str,
        sources: &[String],
        limit: usize,
    ) -> DiscoveryBatch {
        let selected = select_sources(sources);
        let outcomes = join_all(
            selected
                .iter()
                .map(|&source| async move { (source, self.search_source(source, query, limit).await) }),
        )
        .await;

        let mut responses = Vec::with_capacity(outcomes.len());
        for (source, outcome) in outcomes {
            match outcome {
                Ok(response) => responses.push(response),
                Err(e) => warn!(%source, error = %e, "catalog search failed"),
            }
        }
        info!(
            requested = selected.len(),
            answered = responses.len(),
            "discovery complete"
        );

        DiscoveryBatch {
            query: query.to_string(),
            responses,
            timestamp: utc_timestamp(),
        }
    }
}

/// Resolve source tags, in order and without repeats.
///
/// Blank tags are dropped; a list with nothing left selects every catalog.
/// Unknown tags are skipped with a warning, so a list of only unknown tags
/// selects nothing.
pub fn select_sources(tags: &[String]) -> Vec<Source> {
    let tags: Vec<&str> = tags
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if tags.is_empty() {
        return Source::ALL.to_vec();
    }

    let mut selected = Vec::new();
    for tag in tags {
        match tag.parse::<Source>() {
            Ok(source) if !selected.contains(&source) => selected.push(source),
            Ok(_) => {}
            Err(e) => warn!(tag = %tag, "ignoring unknown source: {e}"),
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn catalogs(server: &MockServer) -> Catalogs {
        let uri = server.uri();
        Catalogs::from_config(&CatalogConfig {
            gutendex_url: format!("{uri}/gutendex/books/"),
            openlibrary_search_url: format!("{uri}/openlibrary/search.json"),
            openlibrary_base_url: format!("{uri}/openlibrary"),
            archive_base_url: format!("{uri}/archive"),
            standard_ebooks_url: format!("{uri}/standard/opds"),
            timeout_secs: 5,
        })
        .expect("catalogs")
    }

    async fn mount_gutendex(server: &MockServer) {
        Mock::given(path("/gutendex/books/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 1,
                "results": [{"id": 1, "title": "Gutenberg Book"}]
            })))
            .mount(server)
            .await;
    }

    async fn mount_openlibrary(server: &MockServer, status: u16) {
        Mock::given(path("/openlibrary/search.json"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "numFound": 1,
                "docs": [{"key": "/works/OL1W", "title": "Open Book"}]
            })))
            .mount(server)
            .await;
    }

    async fn mount_standard(server: &MockServer, status: u16) {
        Mock::given(path("/standard/opds"))
            .respond_with(ResponseTemplate::new(status).set_body_string(
                r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry><title>Standard</title></entry></feed>"#,
            ))
            .mount(server)
            .await;
    }

    #[test]
    fn select_sources_normalizes_and_dedups() {
        assert_eq!(select_sources(&[]), Source::ALL.to_vec());
        assert_eq!(select_sources(&tags(&["", "  "])), Source::ALL.to_vec());
        assert_eq!(
            select_sources(&tags(&[" Standard ", "gutendex", "GUTENDEX", "bogus"])),
            vec![Source::StandardEbooks, Source::Gutendex]
        );
        assert!(select_sources(&tags(&["bogus"])).is_empty());
    }

    #[tokio::test]
    async fn one_failing_catalog_is_dropped() {
        let server = MockServer::start().await;
        mount_gutendex(&server).await;
        mount_openlibrary(&server, 200).await;
        mount_standard(&server, 500).await;

        let batch = catalogs(&server).discover_books("book", &[], 5).await;
        assert_eq!(batch.query, "book");
        let sources: Vec<Source> = batch.responses.iter().map(|r| r.source).collect();
        assert_eq!(sources, vec![Source::Gutendex, Source::OpenLibrary]);
    }

    #[tokio::test]
    async fn all_failing_catalogs_give_empty_batch() {
        let server = MockServer::start().await;
        mount_openlibrary(&server, 502).await;
        mount_standard(&server, 503).await;
        // gutendex is unmounted and answers 404

        let batch = catalogs(&server).discover_books("book", &[], 5).await;
        assert!(batch.responses.is_empty());
    }

    #[tokio::test]
    async fn only_selected_catalogs_are_queried() {
        let server = MockServer::start().await;
        mount_gutendex(&server).await;
        mount_openlibrary(&server, 200).await;
        mount_standard(&server, 200).await;

        let batch = catalogs(&server)
            .discover_books("book", &tags(&["openlibrary"]), 5)
            .await;
        assert_eq!(batch.responses.len(), 1);
        assert_eq!(batch.responses[0].source, Source::OpenLibrary);
        assert_eq!(
            batch.responses[0].books[0].title.as_deref(),
            Some("Open Book")
        );
    }
}
