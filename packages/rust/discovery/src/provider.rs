//! Open Library author and works lookups.

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use further_shared::{FurtherError, Result};

use crate::http::get_json;
use crate::lenient;
use crate::models::{AuthorDetails, AuthorWorks, OpenLibrarySearch};
use crate::query::build_query;

/// Works attached to an author lookup.
const MAX_WORKS: usize = 10;

#[derive(Debug, Deserialize)]
struct AuthorSearch {
    #[serde(default, deserialize_with = "lenient::items")]
    docs: Vec<AuthorDetails>,
}

#[derive(Debug, Deserialize)]
struct WorksPage {
    #[serde(default, deserialize_with = "lenient::items")]
    entries: Vec<AuthorWorks>,
}

/// Client for the Open Library search, author, and works endpoints.
#[derive(Debug, Clone)]
pub struct OpenLibraryClient {
    client: Client,
    base_url: String,
}

impl OpenLibraryClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!(%base_url, "initialized Open Library client");
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Keyword-refined book search.
    #[instrument(skip(self, keywords))]
    pub async fn search_books<S: AsRef<str>>(
        &self,
        query: &str,
        keywords: &[S],
        limit: usize,
    ) -> Result<OpenLibrarySearch> {
        let refined = build_query(query, keywords);
        let params = [
            ("q", refined.clone()),
            ("format", "json".to_string()),
            ("limit", limit.to_string()),
        ];
        let mut search: OpenLibrarySearch =
            get_json(&self.client, &self.url("/search.json"), &params).await?;
        if search.q.is_empty() {
            search.q = refined;
        }
        debug!(docs = search.docs.len(), num_found = search.num_found, "book search");
        Ok(search)
    }

    /// First author matching `query` in the author index, with their works.
    #[instrument(skip(self))]
    pub async fn search_author(&self, query: &str) -> Result<AuthorDetails> {
        let params = [("q", query.to_string())];
        let search: AuthorSearch =
            get_json(&self.client, &self.url("/search/authors.json"), &params).await?;

        let mut author = search
            .docs
            .into_iter()
            .next()
            .ok_or_else(|| FurtherError::not_found("Author not found."))?;

        let author_id = author.key.clone().unwrap_or_default();
        let works = self.search_author_works(&author_id).await?;
        author.add_author_works(works);
        Ok(author)
    }

    /// Author of the best-matching book for `query`, with their works.
    #[instrument(skip(self))]
    pub async fn search_author_with_book_name(&self, query: &str) -> Result<AuthorDetails> {
        let books = self.search_books(query, &[] as &[&str], 1).await?;
        let doc = books
            .docs
            .into_iter()
            .next()
            .ok_or_else(|| FurtherError::not_found("No books found for query."))?;

        let author_id = doc.author_key.or(doc.author_name).unwrap_or_default();
        let mut author: AuthorDetails = get_json(
            &self.client,
            &self.url(&format!("/authors/{author_id}.json")),
            &[],
        )
        .await?;
        let works = self.search_author_works(&author_id).await?;
        author.add_author_works(works);
        Ok(author)
    }

    /// Up to ten works of an author. `author_id` is stamped on each entry.
    #[instrument(skip(self))]
    pub async fn search_author_works(&self, author_id: &str) -> Result<Vec<AuthorWorks>> {
        let id = author_id.trim_start_matches("/authors/");
        let page: WorksPage =
            get_json(&self.client, &self.url(&format!("/authors/{id}/works.json")), &[]).await?;

        Ok(page
            .entries
            .into_iter()
            .take(MAX_WORKS)
            .map(|mut work| {
                work.author_id.get_or_insert_with(|| id.to_string());
                work
            })
            .collect())
    }
}
