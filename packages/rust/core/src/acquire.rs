//! Streaming downloads into the library's download directory.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};
use url::Url;
use uuid::Uuid;

use further_shared::{FurtherError, LibraryConfig, Result};

/// Fallback extension when neither the URL nor the content type tells.
const FALLBACK_EXTENSION: &str = ".bin";

/// Content types we know how to name.
const CONTENT_TYPE_EXTENSIONS: &[(&str, &str)] = &[
    ("application/pdf", ".pdf"),
    ("application/epub+zip", ".epub"),
    ("application/x-mobipocket-ebook", ".mobi"),
    ("application/json", ".json"),
    ("application/xml", ".xml"),
    ("application/zip", ".zip"),
    ("text/plain", ".txt"),
    ("text/html", ".html"),
    ("text/xml", ".xml"),
    ("image/jpeg", ".jpg"),
    ("image/png", ".png"),
    ("image/gif", ".gif"),
];

/// Downloads remote books into `{library_root}/{download_dir}`.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    dir: PathBuf,
}

impl Downloader {
    pub fn new(client: Client, dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            dir: dir.into(),
        }
    }

    pub fn from_config(config: &LibraryConfig) -> Result<Self> {
        let client = further_discovery::build_client(config.download_timeout_secs)?;
        Ok(Self::new(client, config.download_path()))
    }

    /// Directory downloads are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stream `url` to a fresh file and return its path.
    ///
    /// The status is checked before anything touches the disk, so a failed
    /// request leaves no file behind.
    #[instrument(skip(self))]
    pub async fn download_book(&self, url: &str) -> Result<PathBuf> {
        let response = self
            .client
            .get(url)
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

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let file_name = download_file_name(url, content_type.as_deref());

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| FurtherError::io(&self.dir, e))?;
        let path = self.dir.join(file_name);
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| FurtherError::io(&path, e))?;

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FurtherError::Network(format!("{url}: {e}")))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| FurtherError::io(&path, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| FurtherError::io(&path, e))?;
        debug!(bytes = written, content_type = ?content_type, "download finished");

        info!(path = %path.display(), "downloaded book to disk");
        Ok(path)
    }
}

/// Infer a file extension (with the leading dot).
///
/// The URL path suffix wins; then the content type (parameters ignored);
/// then `.bin`.
pub fn guess_extension(url: &str, content_type: Option<&str>) -> String {
    if let Some(ext) = last_segment(url).and_then(|name| split_suffix(&name).1) {
        return ext;
    }

    content_type
        .map(|ct| ct.split(';').next().unwrap_or_default().trim().to_lowercase())
        .and_then(|ct| {
            CONTENT_TYPE_EXTENSIONS
                .iter()
                .find(|(mime, _)| *mime == ct)
                .map(|(_, ext)| (*ext).to_string())
        })
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

/// `{uuid}_{stem}{ext}`; the stem comes from the URL's last path segment.
fn download_file_name(url: &str, content_type: Option<&str>) -> String {
    let stem = last_segment(url)
        .map(|name| sanitize_stem(&split_suffix(&name).0))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "book".to_string());
    let ext = guess_extension(url, content_type);
    format!("{}_{stem}{ext}", Uuid::new_v4().simple())
}

fn last_segment(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .next_back()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Split a file name into stem and `.suffix`. Dotfiles have no suffix.
fn split_suffix(name: &str) -> (String, Option<String>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => {
            (name[..idx].to_string(), Some(name[idx..].to_string()))
        }
        _ => (name.to_string(), None),
    }
}

fn sanitize_stem(stem: &str) -> String {
    stem.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
