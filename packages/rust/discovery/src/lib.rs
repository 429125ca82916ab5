//! Catalog discovery for Further.
//!
//! Each public ebook catalog (Gutendex, Open Library, Standard Ebooks) is
//! wrapped in a [`CatalogAdapter`] that normalizes its payload into
//! [`DiscoveryResponse`]s. [`Catalogs`] fans a query out to several of them
//! at once, and [`OpenLibraryClient`] covers the author and works lookups.

mod aggregate;
mod gutendex;
mod http;
mod lenient;
pub mod models;
mod openlibrary;
mod provider;
mod query;
mod standard_ebooks;

use std::future::Future;

use further_shared::{DiscoveryResponse, Result, Source};

pub use aggregate::{Catalogs, select_sources};
pub use gutendex::GutendexAdapter;
pub use http::build_client;
pub use models::{AuthorDetails, AuthorWorks, BookDetails, OpenLibrarySearch};
pub use openlibrary::OpenLibraryAdapter;
pub use provider::OpenLibraryClient;
pub use query::build_query;
pub use standard_ebooks::StandardEbooksAdapter;

// ---------------------------------------------------------------------------
// CatalogAdapter
// ---------------------------------------------------------------------------

/// A searchable ebook catalog.
///
/// Implementations issue one request per search and truncate the results to
/// `limit`. An empty result set is a successful response, never an error.
pub trait CatalogAdapter {
    /// Which catalog this adapter queries.
    fn source(&self) -> Source;

    /// Search the catalog for `query`.
    fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> impl Future<Output = Result<DiscoveryResponse>> + Send;
}
