//! Acquisition, parsing, and pipeline orchestration for Further.
//!
//! This crate ties discovery, downloads, and the format engines together
//! into end-to-end workflows (fetch-and-parse, topic runs) and exposes the
//! sandboxed local [`Library`].

pub mod acquire;
pub mod library;
pub mod parse;
pub mod pipeline;
pub mod topic;

pub use acquire::{Downloader, guess_extension};
pub use library::{BookFormat, BookMetadata, BookToc, EbookListing, Library, list_ebooks};
pub use parse::{ParsedBook, parse_book, parse_book_blocking};
pub use pipeline::Pipeline;
pub use topic::{
    DownloadedBook, SilentProgress, TopicEvent, TopicProgress, TopicRequest, TopicResult,
    check_budget, check_range, normalize_query_text, pick_download_url,
};
