//! Model Context Protocol server over stdio (newline-delimited JSON-RPC 2.0).
//!
//! Only the tool surface is implemented: `initialize`, `ping`, `tools/list`,
//! and `tools/call`. Tool results are returned as JSON text content; a tool
//! that fails answers with `isError: true` rather than a JSON-RPC error.

use serde_json::{Map, Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, instrument, warn};

use further_shared::{FurtherError, Result};

use crate::{AppState, run_blocking};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

/// JSON-RPC dispatcher over the shared application state.
#[derive(Clone)]
pub struct McpServer {
    state: AppState,
}

impl McpServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Serve stdin → stdout until stdin closes.
    pub async fn run_stdio(&self) -> Result<()> {
        info!("MCP server listening on stdio");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| FurtherError::Network(format!("stdin: {e}")))?
        {
            if line.trim().is_empty() {
                continue;
            }
            let reply = match serde_json::from_str::<Value>(&line) {
                Ok(message) => self.handle(message).await,
                Err(e) => Some(error_response(Value::Null, PARSE_ERROR, &format!("Parse error: {e}"))),
            };
            if let Some(reply) = reply {
                let mut frame = reply.to_string();
                frame.push('\n');
                stdout
                    .write_all(frame.as_bytes())
                    .await
                    .map_err(|e| FurtherError::Network(format!("stdout: {e}")))?;
                stdout
                    .flush()
                    .await
                    .map_err(|e| FurtherError::Network(format!("stdout: {e}")))?;
            }
        }
        info!("stdin closed, MCP server stopping");
        Ok(())
    }

    /// Answer one message. Notifications (no `id`) get no reply.
    pub async fn handle(&self, message: Value) -> Option<Value> {
        let Some(method) = message.get("method").and_then(Value::as_str) else {
            let id = message.get("id").cloned()?;
            return Some(error_response(id, INVALID_REQUEST, "Invalid Request"));
        };
        let Some(id) = message.get("id").cloned() else {
            debug!(method, "notification");
            return None;
        };
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        let outcome = match method {
            "initialize" => Ok(initialize_result(&params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": tool_definitions() })),
            "tools/call" => self.call_tool(&params).await,
            other => Err((METHOD_NOT_FOUND, format!("Method not found: {other}"))),
        };

        Some(match outcome {
            Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
            Err((code, message)) => error_response(id, code, &message),
        })
    }

    async fn call_tool(&self, params: &Value) -> std::result::Result<Value, (i64, String)> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or((INVALID_PARAMS, "missing tool name".to_string()))?;
        if !TOOLS.iter().any(|(tool, _)| *tool == name) {
            return Err((INVALID_PARAMS, format!("Unknown tool: {name}")));
        }
        let args = params
            .get("arguments")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Ok(match self.run_tool(name, &args).await {
            Ok(Value::String(text)) => tool_result(text, false),
            Ok(value) => tool_result(
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()),
                false,
            ),
            Err(e) => {
                warn!(tool = name, error = %e, "tool call failed");
                tool_result(e.to_string(), true)
            }
        })
    }

    #[instrument(skip(self, args))]
    async fn run_tool(&self, name: &str, args: &Map<String, Value>) -> Result<Value> {
        let state = &self.state;
        let library = state.library.clone();
        match name {
            "search_books" => {
                let query = str_arg(args, "query")?;
                let keywords = list_arg(args, "keywords");
                let limit = usize_arg(args, "limit", 10)?;
                to_value(state.openlibrary.search_books(&query, &keywords, limit).await?)
            }
            "search_author" => {
                to_value(state.openlibrary.search_author(&str_arg(args, "query")?).await?)
            }
            "search_author_with_book_name" => to_value(
                state
                    .openlibrary
                    .search_author_with_book_name(&str_arg(args, "query")?)
                    .await?,
            ),
            "discover_books" => {
                let query = str_arg(args, "query")?;
                let sources = list_arg(args, "sources");
                let limit = usize_arg(args, "limit", 5)?;
                to_value(
                    state
                        .pipeline
                        .catalogs()
                        .discover_books(&query, &sources, limit)
                        .await,
                )
            }
            "fetch_and_parse_book" => {
                let url = str_arg(args, "url")?;
                let pages = usize_arg(args, "limit_pages", 3)?;
                let chapters = usize_arg(args, "limit_chapters", 3)?;
                to_value(state.pipeline.fetch_and_parse(&url, pages, chapters).await?)
            }
            "list_ebooks" => to_value(run_blocking(move || library.list()).await?),
            "get_epub_metadata" => {
                let path = str_arg(args, "relative_path")?;
                to_value(run_blocking(move || library.epub_metadata(&path)).await?)
            }
            "get_pdf_metadata" => {
                let path = str_arg(args, "relative_path")?;
                to_value(run_blocking(move || library.pdf_metadata(&path)).await?)
            }
            "get_epub_toc" => {
                let path = str_arg(args, "relative_path")?;
                to_value(run_blocking(move || library.epub_toc(&path)).await?)
            }
            "get_pdf_toc" => {
                let path = str_arg(args, "relative_path")?;
                to_value(run_blocking(move || library.pdf_toc(&path)).await?)
            }
            "get_epub_chapter_markdown" => {
                let path = str_arg(args, "relative_path")?;
                let chapter = str_arg(args, "chapter_id")?;
                let markdown =
                    run_blocking(move || library.epub_chapter_markdown(&path, &chapter)).await?;
                Ok(Value::String(markdown))
            }
            "get_pdf_chapter_text" => {
                let path = str_arg(args, "relative_path")?;
                let title = str_arg(args, "chapter_title")?;
                to_value(run_blocking(move || library.pdf_chapter_text(&path, &title)).await?)
            }
            other => Err(FurtherError::validation(format!("Unknown tool: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tool catalog
// ---------------------------------------------------------------------------

const TOOLS: [(&str, &str); 12] = [
    ("search_books", "Search Open Library for books, refining the query with optional keywords."),
    ("search_author", "Look up an author on Open Library, with up to ten works."),
    ("search_author_with_book_name", "Find the author of the best-matching book title."),
    ("discover_books", "Search Gutendex, Open Library, and Standard Ebooks concurrently."),
    ("fetch_and_parse_book", "Download a book into the library and summarize its first pages or chapters."),
    ("list_ebooks", "List EPUB and PDF files in the library root."),
    ("get_epub_metadata", "Dublin Core metadata of a library EPUB."),
    ("get_pdf_metadata", "Document metadata of a library PDF."),
    ("get_epub_toc", "Flattened table of contents of a library EPUB as (title, href) pairs."),
    ("get_pdf_toc", "Flattened outline of a library PDF as (title, page) pairs."),
    ("get_epub_chapter_markdown", "Markdown for an EPUB chapter given as href or href#anchor."),
    ("get_pdf_chapter_text", "Text and page numbers of the first PDF chapter whose title matches."),
];

fn input_schema(name: &str) -> Value {
    let string = json!({ "type": "string" });
    let integer = |default: u64| json!({ "type": "integer", "minimum": 1, "default": default });
    let strings = json!({ "type": "array", "items": { "type": "string" } });

    let (properties, required): (Value, Vec<&str>) = match name {
        "search_books" => (
            json!({ "query": string, "keywords": strings, "limit": integer(10) }),
            vec!["query"],
        ),
        "search_author" | "search_author_with_book_name" => {
            (json!({ "query": string }), vec!["query"])
        }
        "discover_books" => (
            json!({ "query": string, "sources": strings, "limit": integer(5) }),
            vec!["query"],
        ),
        "fetch_and_parse_book" => (
            json!({ "url": string, "limit_pages": integer(3), "limit_chapters": integer(3) }),
            vec!["url"],
        ),
        "get_epub_chapter_markdown" => (
            json!({ "relative_path": string, "chapter_id": string }),
            vec!["relative_path", "chapter_id"],
        ),
        "get_pdf_chapter_text" => (
            json!({ "relative_path": string, "chapter_title": string }),
            vec!["relative_path", "chapter_title"],
        ),
        "list_ebooks" => (json!({}), Vec::new()),
        _ => (json!({ "relative_path": string }), vec!["relative_path"]),
    };

    json!({ "type": "object", "properties": properties, "required": required })
}

fn tool_definitions() -> Vec<Value> {
    TOOLS
        .iter()
        .map(|(name, description)| {
            json!({
                "name": name,
                "description": description,
                "inputSchema": input_schema(name),
            })
        })
        .collect()
}

fn initialize_result(params: &Value) -> Value {
    let version = params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .unwrap_or(PROTOCOL_VERSION);
    json!({
        "protocolVersion": version,
        "capabilities": { "tools": { "listChanged": false } },
        "serverInfo": { "name": "further", "version": env!("CARGO_PKG_VERSION") },
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn tool_result(text: String, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error,
    })
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| FurtherError::Conversion(e.to_string()))
}

fn str_arg(args: &Map<String, Value>, name: &str) -> Result<String> {
    args.get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| FurtherError::validation(format!("missing argument: {name}")))
}

fn usize_arg(args: &Map<String, Value>, name: &str, default: usize) -> Result<usize> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .filter(|n| *n >= 1)
            .ok_or_else(|| FurtherError::validation(format!("{name} must be a positive integer"))),
    }
}

/// A string list; a lone string counts as a one-element list.
fn list_arg(args: &Map<String, Value>, name: &str) -> Vec<String> {
    match args.get(name) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}
