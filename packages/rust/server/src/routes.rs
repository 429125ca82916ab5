//! HTTP handlers.

use axum::Json;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderName, header};
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::StreamExt;
use futures_util::stream;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};
use url::Url;

use further_core::topic::{BUDGET_RANGE, DOWNLOAD_LIMIT_RANGE, LIMIT_RANGE, MIN_QUERY_CHARS};
use further_core::{BookMetadata, EbookListing, ParsedBook, TopicRequest, TopicResult};
use further_discovery::{AuthorDetails, CatalogAdapter, OpenLibrarySearch};
use further_shared::{DiscoveryBatch, DiscoveryResponse, FurtherError, Result};

use crate::error::ApiResult;
use crate::{AppState, run_blocking};
use crate::params::Params;

/// Results per catalog on the discovery endpoints.
const DISCOVERY_LIMIT: std::ops::RangeInclusive<usize> = 1..=20;
const DISCOVERY_DEFAULT_LIMIT: usize = 5;

// ---------------------------------------------------------------------------
// Service and Open Library
// ---------------------------------------------------------------------------

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "further" }))
}

pub async fn search_books(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> ApiResult<Json<OpenLibrarySearch>> {
    let params = Params::parse(raw.as_deref());
    let query = params.required("query", 1)?;
    let keywords = params.all("keywords");
    let limit = params.bounded("limit", 10, 1..=50)?;
    Ok(Json(
        state.openlibrary.search_books(&query, &keywords, limit).await?,
    ))
}

pub async fn search_author(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> ApiResult<Json<AuthorDetails>> {
    let query = Params::parse(raw.as_deref()).required("query", 1)?;
    Ok(Json(state.openlibrary.search_author(&query).await?))
}

// ---------------------------------------------------------------------------
// Local library
// ---------------------------------------------------------------------------

pub async fn list_ebooks(State(state): State<AppState>) -> ApiResult<Json<EbookListing>> {
    let library = state.library.clone();
    Ok(Json(run_blocking(move || library.list()).await?))
}

pub async fn ebook_metadata(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> ApiResult<Json<BookMetadata>> {
    let path = Params::parse(raw.as_deref()).required("path", 1)?;
    let library = state.library.clone();
    Ok(Json(run_blocking(move || library.metadata(&path)).await?))
}

pub async fn ebook_toc(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> ApiResult<Json<Value>> {
    let path = Params::parse(raw.as_deref()).required("path", 1)?;
    let library = state.library.clone();
    let toc = run_blocking(move || library.toc(&path)).await?;
    Ok(Json(json!({ "toc": toc })))
}

pub async fn epub_chapter_markdown(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> ApiResult<Json<Value>> {
    let params = Params::parse(raw.as_deref());
    let path = params.required("path", 1)?;
    let chapter = params.required("chapter", 1)?;
    let library = state.library.clone();
    let markdown = run_blocking(move || library.epub_chapter_markdown(&path, &chapter)).await?;
    Ok(Json(json!({ "markdown": markdown })))
}

pub async fn pdf_chapter_text(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> ApiResult<Json<Value>> {
    let params = Params::parse(raw.as_deref());
    let path = params.required("path", 1)?;
    let title = params.required("chapter_title", 1)?;
    let library = state.library.clone();
    let chapter = run_blocking(move || library.pdf_chapter_text(&path, &title)).await?;
    Ok(Json(json!({ "content": chapter.content, "pages": chapter.pages })))
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

pub async fn discovery_search(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> ApiResult<Json<DiscoveryBatch>> {
    let params = Params::parse(raw.as_deref());
    let query = params.required("query", 1)?;
    let sources = params.all("sources");
    let limit = params.bounded("limit", DISCOVERY_DEFAULT_LIMIT, DISCOVERY_LIMIT)?;
    let batch = state
        .pipeline
        .catalogs()
        .discover_books(&query, &sources, limit)
        .await;
    Ok(Json(batch))
}

fn discovery_params(raw: Option<&str>) -> Result<(String, usize)> {
    let params = Params::parse(raw);
    Ok((
        params.required("query", 1)?,
        params.bounded("limit", DISCOVERY_DEFAULT_LIMIT, DISCOVERY_LIMIT)?,
    ))
}

pub async fn discovery_gutendex(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> ApiResult<Json<DiscoveryResponse>> {
    let (query, limit) = discovery_params(raw.as_deref())?;
    let catalogs = state.pipeline.catalogs();
    Ok(Json(catalogs.gutendex.search(&query, limit).await?))
}

pub async fn discovery_openlibrary(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> ApiResult<Json<DiscoveryResponse>> {
    let (query, limit) = discovery_params(raw.as_deref())?;
    let catalogs = state.pipeline.catalogs();
    Ok(Json(catalogs.openlibrary.search(&query, limit).await?))
}

pub async fn discovery_standard_ebooks(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> ApiResult<Json<DiscoveryResponse>> {
    let (query, limit) = discovery_params(raw.as_deref())?;
    let catalogs = state.pipeline.catalogs();
    Ok(Json(catalogs.standard_ebooks.search(&query, limit).await?))
}

// ---------------------------------------------------------------------------
// Pipelines
// ---------------------------------------------------------------------------

fn default_budget() -> usize {
    3
}

#[derive(Debug, Deserialize)]
pub struct FetchParseRequest {
    pub url: String,
    #[serde(default = "default_budget")]
    pub limit_pages: usize,
    #[serde(default = "default_budget")]
    pub limit_chapters: usize,
}

/// Only absolute http(s) URLs are fetched.
fn validate_url(raw: &str) -> Result<()> {
    let url = Url::parse(raw).map_err(|e| FurtherError::validation(format!("invalid url: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(FurtherError::validation(format!(
            "unsupported url scheme: {other}"
        ))),
    }
}

pub async fn fetch_parse(
    State(state): State<AppState>,
    Json(request): Json<FetchParseRequest>,
) -> ApiResult<Json<ParsedBook>> {
    validate_url(&request.url)?;
    info!(url = %request.url, "fetch-parse requested");
    let parsed = state
        .pipeline
        .fetch_and_parse(&request.url, request.limit_pages, request.limit_chapters)
        .await?;
    Ok(Json(parsed))
}

pub async fn topic(
    State(state): State<AppState>,
    Json(request): Json<TopicRequest>,
) -> ApiResult<Json<TopicResult>> {
    Ok(Json(state.pipeline.run_topic(&request).await?))
}

pub async fn topic_sse(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> ApiResult<impl IntoResponse> {
    let params = Params::parse(raw.as_deref());
    let request = TopicRequest {
        query: params.required("query", MIN_QUERY_CHARS)?,
        sources: Some(params.all("sources")),
        limit: params.bounded("limit", 30, LIMIT_RANGE)?,
        download_limit: params.bounded("download_limit", 30, DOWNLOAD_LIMIT_RANGE)?,
        limit_pages: params.bounded("limit_pages", 3, BUDGET_RANGE)?,
        limit_chapters: params.bounded("limit_chapters", 3, BUDGET_RANGE)?,
    };
    debug!(query = %request.query, "topic stream requested");

    let events = state.pipeline.clone().run_topic_streaming(request)?;
    let stream = stream::unfold(events, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    })
    .map(|event| Event::default().event(event.name()).json_data(&event));

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(stream).keep_alive(KeepAlive::default()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_http_urls_are_accepted() {
        assert!(validate_url("https://example.org/a.pdf").is_ok());
        assert!(validate_url("http://example.org").is_ok());
        assert!(validate_url("ftp://example.org/a.pdf").is_err());
        assert!(validate_url("not a url").is_err());
    }
}
