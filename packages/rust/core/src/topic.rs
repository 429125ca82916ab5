//! Topic pipeline types: requests, results, events, and the helpers that
//! turn a discovery batch into a download list.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use further_shared::{BookFormatLink, FurtherError, Result, Source};

use crate::parse::ParsedBook;

/// Accepted `limit` (catalog results per source).
pub const LIMIT_RANGE: RangeInclusive<usize> = 1..=50;
/// Accepted `download_limit`.
pub const DOWNLOAD_LIMIT_RANGE: RangeInclusive<usize> = 1..=100;
/// Accepted page and chapter budgets.
pub const BUDGET_RANGE: RangeInclusive<usize> = 1..=12;
/// Shortest accepted topic query, in characters.
pub const MIN_QUERY_CHARS: usize = 2;

/// Link formats tried in order when picking what to download.
const FORMAT_PREFERENCE: [&str; 5] = [
    "pdf",
    "application/pdf",
    "epub",
    "application/epub+zip",
    "text/plain",
];

fn default_limit() -> usize {
    30
}

fn default_download_limit() -> usize {
    30
}

fn default_budget() -> usize {
    3
}

/// Discover, download, and summarize books about a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicRequest {
    pub query: String,
    /// Catalog tags; absent or empty means every catalog.
    #[serde(default)]
    pub sources: Option<Vec<String>>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_download_limit")]
    pub download_limit: usize,
    #[serde(default = "default_budget")]
    pub limit_pages: usize,
    #[serde(default = "default_budget")]
    pub limit_chapters: usize,
}

impl TopicRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            sources: None,
            limit: default_limit(),
            download_limit: default_download_limit(),
            limit_pages: default_budget(),
            limit_chapters: default_budget(),
        }
    }

    pub fn source_tags(&self) -> &[String] {
        self.sources.as_deref().unwrap_or_default()
    }

    /// Check every bound. `query` is expected to be normalized already.
    pub fn validate(&self, query: &str) -> Result<()> {
        if query.chars().count() < MIN_QUERY_CHARS {
            return Err(FurtherError::validation(format!(
                "query must be at least {MIN_QUERY_CHARS} characters"
            )));
        }
        check_range("limit", self.limit, &LIMIT_RANGE)?;
        check_range("download_limit", self.download_limit, &DOWNLOAD_LIMIT_RANGE)?;
        check_budget(self.limit_pages, self.limit_chapters)
    }
}

/// One successfully downloaded and parsed book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedBook {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub source: Source,
    pub source_id: Option<String>,
    pub url: String,
    #[serde(flatten)]
    pub parsed: ParsedBook,
}

/// Everything a topic run downloaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicResult {
    /// The normalized query.
    pub query: String,
    pub downloads: Vec<DownloadedBook>,
}

/// Incremental topic pipeline events.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TopicEvent {
    Start {
        query: String,
        limit: usize,
        download_limit: usize,
    },
    Book {
        /// 1-based position among successful downloads.
        index: usize,
        #[serde(flatten)]
        book: DownloadedBook,
    },
    Complete {
        query: String,
        count: usize,
    },
}

impl TopicEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Book { .. } => "book",
            Self::Complete { .. } => "complete",
        }
    }
}

/// Observer for a running topic pipeline.
pub trait TopicProgress: Send + Sync {
    fn event(&self, event: &TopicEvent);
}

/// Ignores every event.
pub struct SilentProgress;

impl TopicProgress for SilentProgress {
    fn event(&self, _event: &TopicEvent) {}
}

/// `+` becomes a space, whitespace runs collapse, ends are trimmed.
pub fn normalize_query_text(query: &str) -> String {
    query
        .replace('+', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Pick the link to download by format preference.
///
/// Formats match by substring of the lowercased link format. Without any
/// preferred format the first link is used. Links with an empty URL are
/// never picked.
pub fn pick_download_url(links: &[BookFormatLink]) -> Option<&str> {
    FORMAT_PREFERENCE
        .iter()
        .find_map(|pref| {
            links
                .iter()
                .find(|l| !l.url.is_empty() && l.format.to_lowercase().contains(pref))
        })
        .or_else(|| links.first())
        .map(|l| l.url.as_str())
        .filter(|url| !url.is_empty())
}

/// Validation error unless `value` lies in `range`.
pub fn check_range(name: &str, value: usize, range: &RangeInclusive<usize>) -> Result<()> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(FurtherError::validation(format!(
            "{name} must be between {} and {}",
            range.start(),
            range.end()
        )))
    }
}

/// Page and chapter budgets shared by fetch-parse and topic runs.
pub fn check_budget(limit_pages: usize, limit_chapters: usize) -> Result<()> {
    check_range("limit_pages", limit_pages, &BUDGET_RANGE)?;
    check_range("limit_chapters", limit_chapters, &BUDGET_RANGE)
}
