//! Shared types, error model, and configuration for tabdivider.
//!
//! This crate is the foundation depended on by all other tabdivider crates.
//! It provides:
//! - [`DividerError`], the unified error type
//! - Domain types ([`Page`], [`DividerOptions`])
//! - Configuration ([`AppConfig`], [`DividerSettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BroadcastConfig, DefaultsConfig, DividerSettings, ExpandCheck, ExpandConfig,
    ExportConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    resolve_path,
};
pub use error::{DividerError, Result};
pub use types::{DEFAULT_BASE_NAME, DividerOptions, Page, UNKNOWN_TITLE};
