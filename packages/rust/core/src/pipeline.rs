//! End-to-end pipelines: URL → download → parse, and topic → discovery →
//! downloads.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use further_discovery::Catalogs;
use further_shared::{AppConfig, Result};

use crate::acquire::Downloader;
use crate::parse::{ParsedBook, parse_book};
use crate::topic::{
    DownloadedBook, TopicEvent, TopicProgress, TopicRequest, TopicResult, check_budget,
    normalize_query_text, pick_download_url,
};

/// Catalogs, downloader, and library root wired together.
#[derive(Debug, Clone)]
pub struct Pipeline {
    catalogs: Catalogs,
    downloader: Downloader,
    root: PathBuf,
}

impl Pipeline {
    pub fn new(catalogs: Catalogs, downloader: Downloader, root: impl Into<PathBuf>) -> Self {
        Self {
            catalogs,
            downloader,
            root: root.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(
            Catalogs::from_config(&config.catalogs)?,
            Downloader::from_config(&config.library)?,
            &config.library.root,
        ))
    }

    pub fn catalogs(&self) -> &Catalogs {
        &self.catalogs
    }

    /// Library root that parsed paths are reported relative to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Download `url` and summarize it within the page/chapter budget.
    #[instrument(skip(self))]
    pub async fn fetch_and_parse(
        &self,
        url: &str,
        limit_pages: usize,
        limit_chapters: usize,
    ) -> Result<ParsedBook> {
        check_budget(limit_pages, limit_chapters)?;
        let path = self.downloader.download_book(url).await?;
        parse_book(&self.root, &path, limit_pages, limit_chapters).await
    }

    /// Run a topic to completion.
    pub async fn run_topic(&self, request: &TopicRequest) -> Result<TopicResult> {
        self.run_topic_with_progress(request, &crate::topic::SilentProgress)
            .await
    }

    /// Run a topic, reporting each step to `progress`.
    ///
    /// Books are taken response by response in catalog order. A book is
    /// skipped when it has no usable link or its URL was already downloaded;
    /// a failed download or parse is logged and skipped.
    #[instrument(skip_all, fields(query = %request.query))]
    pub async fn run_topic_with_progress(
        &self,
        request: &TopicRequest,
        progress: &dyn TopicProgress,
    ) -> Result<TopicResult> {
        let start = Instant::now();
        let query = normalize_query_text(&request.query);
        request.validate(&query)?;

        progress.event(&TopicEvent::Start {
            query: query.clone(),
            limit: request.limit,
            download_limit: request.download_limit,
        });

        let batch = self
            .catalogs
            .discover_books(&query, request.source_tags(), request.limit)
            .await;

        let mut downloads: Vec<DownloadedBook> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        'responses: for response in &batch.responses {
            for book in &response.books {
                if downloads.len() >= request.download_limit {
                    break 'responses;
                }
                let Some(url) = pick_download_url(&book.download_links) else {
                    continue;
                };
                if seen.contains(url) {
                    continue;
                }

                let parsed = match self
                    .fetch_and_parse(url, request.limit_pages, request.limit_chapters)
                    .await
                {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!(%url, error = %e, "topic download failed, skipping");
                        continue;
                    }
                };
                seen.insert(url.to_string());

                let downloaded = DownloadedBook {
                    title: book.title.clone(),
                    authors: book.authors.clone(),
                    source: response.source,
                    source_id: book.source_id.clone(),
                    url: url.to_string(),
                    parsed,
                };
                downloads.push(downloaded.clone());
                progress.event(&TopicEvent::Book {
                    index: downloads.len(),
                    book: downloaded,
                });
            }
        }

        progress.event(&TopicEvent::Complete {
            query: query.clone(),
            count: downloads.len(),
        });
        info!(
            downloads = downloads.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "topic pipeline complete"
        );

        Ok(TopicResult { query, downloads })
    }

    /// Run a topic in the background and stream its events.
    ///
    /// The receiver yields `Start`, one `Book` per completed download, then
    /// `Complete`. A request that fails validation yields `Err` and no events.
    pub fn run_topic_streaming(
        self: Arc<Self>,
        request: TopicRequest,
    ) -> Result<mpsc::UnboundedReceiver<TopicEvent>> {
        request.validate(&normalize_query_text(&request.query))?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let progress = ChannelProgress(tx);
            if let Err(e) = self.run_topic_with_progress(&request, &progress).await {
                warn!(error = %e, "streamed topic pipeline failed");
            }
        });
        Ok(rx)
    }
}

/// Forwards events into a channel; a dropped receiver just discards them.
struct ChannelProgress(mpsc::UnboundedSender<TopicEvent>);

impl TopicProgress for ChannelProgress {
    fn event(&self, event: &TopicEvent) {
        let _ = self.0.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream, dictionary};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use further_discovery::{GutendexAdapter, OpenLibraryAdapter, StandardEbooksAdapter, build_client};
    use further_shared::{FurtherError, Source};

    use super::*;

    /// A one-page PDF with a single line of Helvetica text.
    fn pdf_bytes(text: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id =
            doc.add_object(Stream::new(dictionary! {}, content.encode().expect("encode")));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("save pdf");
        bytes
    }

    fn pipeline(server: &MockServer, root: &Path) -> Pipeline {
        let client = build_client(5).expect("client");
        let uri = server.uri();
        let catalogs = Catalogs::new(
            GutendexAdapter::new(client.clone(), format!("{uri}/gutendex/books/")),
            OpenLibraryAdapter::new(client.clone(), format!("{uri}/ol/search.json"), format!("{uri}/archive")),
            StandardEbooksAdapter::new(client.clone(), format!("{uri}/se/opds")),
        );
        Pipeline::new(catalogs, Downloader::new(client, root.join("downloaded")), root)
    }

    async fn mount_pdf(server: &MockServer, file: &str, text: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/files/{file}")))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes(pdf_bytes(text)),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn fetch_and_parse_small_pdf() {
        let server = MockServer::start().await;
        let body = pdf_bytes("Hello from a tiny PDF");
        let expected_len = body.len() as u64;
        Mock::given(method("GET"))
            .and(path("/files/download"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes(body),
            )
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().expect("tempdir");
        let parsed = pipeline(&server, tmp.path())
            .fetch_and_parse(&format!("{}/files/download", server.uri()), 1, 3)
            .await
            .expect("fetch and parse");

        assert_eq!(parsed.format, "pdf");
        assert_eq!(parsed.size_bytes, expected_len);
        assert!(parsed.summary.contains("Hello from a tiny PDF"));
        assert!(parsed.relative_path.starts_with("downloaded/"));
        assert!(parsed.relative_path.ends_with("_download.pdf"));
    }

    #[tokio::test]
    async fn fetch_and_parse_rejects_budget_before_download() {
        let server = MockServer::start().await;
        let tmp = tempfile::tempdir().expect("tempdir");
        let err = pipeline(&server, tmp.path())
            .fetch_and_parse("http://unused.invalid/a.pdf", 13, 3)
            .await
            .unwrap_err();
        assert!(matches!(err, FurtherError::Validation { .. }));
        assert!(!tmp.path().join("downloaded").exists());
    }

    async fn mount_topic_catalog(server: &MockServer) {
        let uri = server.uri();
        Mock::given(path("/gutendex/books/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 4,
                "results": [
                    {"id": 1, "title": "One", "formats": {"application/pdf": format!("{uri}/files/one.pdf")}},
                    {"id": 2, "title": "Dup", "formats": {"application/pdf": format!("{uri}/files/one.pdf")}},
                    {"id": 3, "title": "Broken", "formats": {"application/pdf": format!("{uri}/files/broken.pdf")}},
                    {"id": 4, "title": "No links"},
                    {"id": 5, "title": "Two", "formats": {"application/pdf": format!("{uri}/files/two.pdf")}}
                ]
            })))
            .mount(server)
            .await;
        mount_pdf(server, "one.pdf", "first").await;
        mount_pdf(server, "two.pdf", "second").await;
        Mock::given(path("/files/broken.pdf"))
            .respond_with(ResponseTemplate::new(500))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn topic_dedups_urls_and_skips_failures() {
        let server = MockServer::start().await;
        mount_topic_catalog(&server).await;

        let tmp = tempfile::tempdir().expect("tempdir");
        let mut request = TopicRequest::new("  machine+learning ");
        request.sources = Some(vec!["gutendex".into()]);

        let result = pipeline(&server, tmp.path()).run_topic(&request).await.expect("topic");
        assert_eq!(result.query, "machine learning");
        let titles: Vec<_> = result.downloads.iter().map(|d| d.title.as_deref()).collect();
        assert_eq!(titles, vec![Some("One"), Some("Two")]);
        assert_eq!(result.downloads[0].source, Source::Gutendex);
        assert!(result.downloads[1].parsed.summary.contains("second"));
    }

    #[tokio::test]
    async fn topic_stops_at_download_limit() {
        let server = MockServer::start().await;
        mount_topic_catalog(&server).await;

        let tmp = tempfile::tempdir().expect("tempdir");
        let mut request = TopicRequest::new("ml");
        request.sources = Some(vec!["gutendex".into()]);
        request.download_limit = 1;

        let result = pipeline(&server, tmp.path()).run_topic(&request).await.expect("topic");
        assert_eq!(result.downloads.len(), 1);
    }

    #[tokio::test]
    async fn streaming_emits_start_books_complete() {
        let server = MockServer::start().await;
        mount_topic_catalog(&server).await;

        let tmp = tempfile::tempdir().expect("tempdir");
        let mut request = TopicRequest::new("ml");
        request.sources = Some(vec!["gutendex".into()]);

        let mut rx = Arc::new(pipeline(&server, tmp.path()))
            .run_topic_streaming(request)
            .expect("valid request");
        let mut names = Vec::new();
        let mut indexes = Vec::new();
        while let Some(event) = rx.recv().await {
            if let TopicEvent::Book { index, .. } = &event {
                indexes.push(*index);
            }
            names.push(event.name());
        }
        assert_eq!(names, vec!["start", "book", "book", "complete"]);
        assert_eq!(indexes, vec![1, 2]);
    }

    #[tokio::test]
    async fn streaming_rejects_short_query() {
        let server = MockServer::start().await;
        let tmp = tempfile::tempdir().expect("tempdir");
        let err = Arc::new(pipeline(&server, tmp.path()))
            .run_topic_streaming(TopicRequest::new(" + "))
            .unwrap_err();
        assert!(matches!(err, FurtherError::Validation { .. }));
    }
}
