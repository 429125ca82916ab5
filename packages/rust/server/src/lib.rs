//! HTTP and MCP front ends for Further.
//!
//! Both surfaces share one [`AppState`]: the discovery/download
//! [`Pipeline`], the sandboxed local [`Library`], and the Open Library
//! author client.

pub mod error;
pub mod mcp;
mod params;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use further_core::{Library, Pipeline};
use further_discovery::{OpenLibraryClient, build_client};
use further_shared::{AppConfig, FurtherError, Result};

pub use error::{ApiError, ApiResult, status_for};
pub use mcp::McpServer;

/// Shared state behind every handler and tool.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub library: Library,
    pub openlibrary: OpenLibraryClient,
}

impl AppState {
    pub fn new(pipeline: Pipeline, library: Library, openlibrary: OpenLibraryClient) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            library,
            openlibrary,
        }
    }

    /// Wire everything from configuration and make sure the library root exists.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let library = Library::new(&config.library.root);
        library.ensure_root()?;
        let openlibrary = OpenLibraryClient::new(
            build_client(config.catalogs.timeout_secs)?,
            &config.catalogs.openlibrary_base_url,
        );
        Ok(Self::new(Pipeline::from_config(config)?, library, openlibrary))
    }
}

/// Run a synchronous library call on the blocking pool.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FurtherError::Conversion(format!("blocking task failed: {e}")))?
}

/// The HTTP API with CORS (any origin, GET/POST) and request tracing.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        .route("/search", get(routes::search_books))
        .route("/search_author", get(routes::search_author))
        .route("/ebooks/list", get(routes::list_ebooks))
        .route("/ebooks/metadata", get(routes::ebook_metadata))
        .route("/ebooks/toc", get(routes::ebook_toc))
        .route("/ebooks/epub/chapter-markdown", get(routes::epub_chapter_markdown))
        .route("/ebooks/pdf/chapter-text", get(routes::pdf_chapter_text))
        .route("/discovery/search", get(routes::discovery_search))
        .route("/discovery/gutendex", get(routes::discovery_gutendex))
        .route("/discovery/openlibrary", get(routes::discovery_openlibrary))
        .route("/discovery/standard-ebooks", get(routes::discovery_standard_ebooks))
        .route("/pipeline/fetch-parse", post(routes::fetch_parse))
        .route("/pipeline/topic", post(routes::topic))
        .route("/pipeline/topic/sse", get(routes::topic_sse))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `host:port` from the config and serve until the process exits.
pub async fn serve(config: &AppConfig) -> Result<()> {
    let state = AppState::from_config(config)?;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| FurtherError::config(format!("cannot bind {addr}: {e}")))?;

    info!(%addr, root = %config.library.root.display(), "HTTP server listening");
    axum::serve(listener, router(state))
        .await
        .map_err(|e| FurtherError::Network(format!("server error: {e}")))
}

/// Serve MCP over stdin/stdout.
pub async fn serve_mcp(config: &AppConfig) -> Result<()> {
    McpServer::new(AppState::from_config(config)?)
        .run_stdio()
        .await
}
