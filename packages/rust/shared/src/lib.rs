//! Shared types, error model, and configuration for Further.
//!
//! This crate is the foundation depended on by all other Further crates.
//! It provides:
//! - [`FurtherError`]: the unified error type
//! - Catalog types ([`DiscoveryBook`], [`BookFormatLink`], [`DiscoveryResponse`], [`Source`])
//! - Configuration ([`AppConfig`], config loading and env overrides)
//! - Library path sandboxing ([`resolve_under_root`])

pub mod config;
pub mod error;
pub mod paths;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CatalogConfig, LibraryConfig, ServerConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{FurtherError, ProcessingKind, Result};
pub use paths::resolve_under_root;
pub use types::{
    BookFormatLink, DiscoveryBatch, DiscoveryBook, DiscoveryResponse, Source, utc_timestamp,
};
