//! Application configuration for Further.
//!
//! User config lives at `~/.further/further.toml`.
//! Environment variables override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FurtherError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "further.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".further";

// ---------------------------------------------------------------------------
// Config structs (matching further.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote catalog endpoints.
    #[serde(default)]
    pub catalogs: CatalogConfig,

    /// Local ebook library.
    #[serde(default)]
    pub library: LibraryConfig,

    /// HTTP server bind address.
    #[serde(default)]
    pub server: ServerConfig,
}

/// `[catalogs]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_gutendex_url")]
    pub gutendex_url: String,

    /// Search endpoint used by catalog discovery.
    #[serde(default = "default_openlibrary_search_url")]
    pub openlibrary_search_url: String,

    /// Base URL for the author/works provider.
    #[serde(default = "default_openlibrary_base_url")]
    pub openlibrary_base_url: String,

    /// Prefix for synthesized Internet Archive download links.
    #[serde(default = "default_archive_base_url")]
    pub archive_base_url: String,

    #[serde(default = "default_standard_ebooks_url")]
    pub standard_ebooks_url: String,

    /// Per-request timeout for catalog queries.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            gutendex_url: default_gutendex_url(),
            openlibrary_search_url: default_openlibrary_search_url(),
            openlibrary_base_url: default_openlibrary_base_url(),
            archive_base_url: default_archive_base_url(),
            standard_ebooks_url: default_standard_ebooks_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_gutendex_url() -> String {
    "https://gutendex.com/books/".into()
}
fn default_openlibrary_search_url() -> String {
    "https://openlibrary.org/search.json".into()
}
fn default_openlibrary_base_url() -> String {
    "https://openlibrary.org".into()
}
fn default_archive_base_url() -> String {
    "https://archive.org/download".into()
}
fn default_standard_ebooks_url() -> String {
    "https://standardebooks.org/opds".into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[library]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Root directory every file operation is confined to.
    #[serde(default = "default_library_root")]
    pub root: PathBuf,

    /// Subdirectory of `root` that receives downloads.
    #[serde(default = "default_download_dir")]
    pub download_dir: String,

    /// Timeout for a single download.
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: default_library_root(),
            download_dir: default_download_dir(),
            download_timeout_secs: default_download_timeout_secs(),
        }
    }
}

impl LibraryConfig {
    /// Absolute-or-relative directory downloads land in.
    pub fn download_path(&self) -> PathBuf {
        self.root.join(&self.download_dir)
    }
}

fn default_library_root() -> PathBuf {
    PathBuf::from("ebooks")
}
fn default_download_dir() -> String {
    "downloaded".into()
}
fn default_download_timeout_secs() -> u64 {
    60
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8000
}

// ---------------------------------------------------------------------------
// Environment overrides
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup. Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GUTENDEX_BASE_URL") {
            self.catalogs.gutendex_url = v;
        }
        if let Some(v) = get("OPENLIBRARY_SEARCH_URL") {
            self.catalogs.openlibrary_search_url = v;
        }
        if let Some(v) = get("OPENLIBRARY_BASE_URL") {
            self.catalogs.openlibrary_base_url = v;
        }
        if let Some(v) = get("OPENARCHIVE_BASE_URL") {
            self.catalogs.archive_base_url = v;
        }
        if let Some(v) = get("STANDARD_EBOOKS_OPDS_URL") {
            self.catalogs.standard_ebooks_url = v;
        }
        if let Some(v) = get("EBOOK_ROOT_PATH") {
            self.library.root = PathBuf::from(v);
        }
        if let Some(v) = get("FURTHER_HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("FURTHER_PORT") {
            self.server.port = v
                .trim()
                .parse()
                .map_err(|_| FurtherError::config(format!("FURTHER_PORT is not a port: {v}")))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.further/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| FurtherError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.further/further.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk, then apply environment overrides.
/// Returns defaults (plus overrides) if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    let mut config = if path.exists() {
        load_config_from(&path)?
    } else {
        tracing::debug!(?path, "config file not found, using defaults");
        AppConfig::default()
    };

    config.apply_env()?;
    Ok(config)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FurtherError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| FurtherError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| FurtherError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| FurtherError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| FurtherError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
