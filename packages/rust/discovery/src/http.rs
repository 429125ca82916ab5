//! Shared HTTP plumbing for catalog requests.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use further_shared::{FurtherError, Result};

/// Maximum number of redirects to follow for catalog requests.
const MAX_REDIRECTS: usize = 5;

/// User-Agent string for catalog requests.
const USER_AGENT: &str = concat!("Further/", env!("CARGO_PKG_VERSION"));

/// Accept header for Atom/OPDS feeds.
pub(crate) const ATOM_ACCEPT: &str = "application/atom+xml,application/xml";

/// Build a reqwest client with the catalog timeout.
pub fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| FurtherError::Network(format!("failed to build HTTP client: {e}")))
}

/// GET `url` with query `params` and decode the JSON body.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    params: &[(&str, String)],
) -> Result<T> {
    debug!(%url, ?params, "catalog JSON request");
    let response = client
        .get(url)
        .query(params)
        .send()
        .await
        .map_err(|e| FurtherError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FurtherError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    response
        .json()
        .await
        .map_err(|e| FurtherError::parse(format!("{url}: invalid JSON payload: {e}")))
}

/// GET `url` with query `params` and an `Accept` header; return the body text.
pub(crate) async fn get_text(
    client: &Client,
    url: &str,
    params: &[(&str, String)],
    accept: &str,
) -> Result<String> {
    debug!(%url, ?params, "catalog feed request");
    let response = client
        .get(url)
        .query(params)
        .header(reqwest::header::ACCEPT, accept)
        .send()
        .await
        .map_err(|e| FurtherError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FurtherError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    response
        .text()
        .await
        .map_err(|e| FurtherError::Network(format!("{url}: failed to read body: {e}")))
}
