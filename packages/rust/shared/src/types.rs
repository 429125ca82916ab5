//! Catalog domain types shared by discovery, the pipeline, and the transports.

use std::fmt;
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Current UTC time as an RFC 3339 string (capture time for responses).
pub fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// The closed set of catalogs Further knows how to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "gutendex")]
    Gutendex,
    #[serde(rename = "openlibrary")]
    OpenLibrary,
    #[serde(rename = "standard-ebooks")]
    StandardEbooks,
}

impl Source {
    /// Every catalog, in the default fan-out order.
    pub const ALL: [Source; 3] = [Source::Gutendex, Source::OpenLibrary, Source::StandardEbooks];

    /// The wire tag used in responses (`source` field).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gutendex => "gutendex",
            Self::OpenLibrary => "openlibrary",
            Self::StandardEbooks => "standard-ebooks",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    /// Accepts the wire tags plus the `standard` shorthand, case-insensitively.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gutendex" => Ok(Self::Gutendex),
            "openlibrary" => Ok(Self::OpenLibrary),
            "standard" | "standard-ebooks" => Ok(Self::StandardEbooks),
            other => Err(format!("unknown discovery source '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Discovery records
// ---------------------------------------------------------------------------

/// A downloadable rendition of a book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookFormatLink {
    /// MIME type or short format tag (`pdf`, `epub`) or a link relation.
    pub format: String,
    /// Absolute download URL.
    pub url: String,
    #[serde(default)]
    pub label: Option<String>,
}

impl BookFormatLink {
    pub fn new(format: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            url: url.into(),
            label: None,
        }
    }
}

/// A catalog record normalized across every source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryBook {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub year: Option<i32>,
    /// Catalog the record came from. Always set.
    pub source: Source,
    /// Catalog-specific identifier.
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub download_links: Vec<BookFormatLink>,
    /// Free-form side metadata (subjects, publishers, ...).
    #[serde(default)]
    pub extra: Option<serde_json::Map<String, serde_json::Value>>,
}

impl DiscoveryBook {
    /// An empty record for `source`; every other field starts absent.
    pub fn new(source: Source) -> Self {
        Self {
            title: None,
            authors: Vec::new(),
            year: None,
            source,
            source_id: None,
            description: None,
            download_links: Vec::new(),
            extra: None,
        }
    }
}

/// One catalog's answer to a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResponse {
    pub source: Source,
    pub query: String,
    /// Catalog-reported total; may exceed `books.len()`.
    #[serde(default)]
    pub total_results: Option<u64>,
    #[serde(default)]
    pub books: Vec<DiscoveryBook>,
    /// When Further captured the response.
    pub timestamp: String,
}

impl DiscoveryResponse {
    pub fn new(source: Source, query: impl Into<String>, books: Vec<DiscoveryBook>) -> Self {
        Self {
            source,
            query: query.into(),
            total_results: None,
            books,
            timestamp: utc_timestamp(),
        }
    }

    pub fn with_total(mut self, total: Option<u64>) -> Self {
        self.total_results = total;
        self
    }
}

/// Aggregated answer from several catalogs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryBatch {
    pub query: String,
    /// One entry per catalog that answered; failed catalogs are absent.
    pub responses: Vec<DiscoveryResponse>,
    pub timestamp: String,
}
