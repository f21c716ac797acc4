//! Application configuration for tabdivider.
//!
//! User config lives at `~/.tabdivider/tabdivider.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DividerError, Result};
use crate::types::DEFAULT_BASE_NAME;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "tabdivider.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".tabdivider";

// ---------------------------------------------------------------------------
// Config structs (matching tabdivider.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Bulk expand policy.
    #[serde(default)]
    pub expand: ExpandConfig,

    /// URL export formatting.
    #[serde(default)]
    pub export: ExportConfig,

    /// Broadcast channel tuning.
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Label used to synthesize names for unnamed dividers.
    #[serde(default = "default_base_name")]
    pub base_name: String,

    /// Location of the divider database. A leading `~/` is expanded.
    #[serde(default = "default_database")]
    pub database: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            base_name: default_base_name(),
            database: default_database(),
        }
    }
}

fn default_base_name() -> String {
    DEFAULT_BASE_NAME.into()
}
fn default_database() -> String {
    "~/.tabdivider/tabdivider.db".into()
}

/// `[expand]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpandConfig {
    /// Maximum pages expanded at once; `0` disables the limit.
    #[serde(default = "default_expand_limit")]
    pub limit: usize,

    /// Expanding more pages than this asks for confirmation first.
    #[serde(default = "default_confirm_threshold")]
    pub confirm_threshold: usize,
}

impl Default for ExpandConfig {
    fn default() -> Self {
        Self {
            limit: default_expand_limit(),
            confirm_threshold: default_confirm_threshold(),
        }
    }
}

fn default_expand_limit() -> usize {
    30
}
fn default_confirm_threshold() -> usize {
    10
}

/// `[export]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Template applied to every page; `{title}` and `{url}` are substituted.
    #[serde(default = "default_page_rule")]
    pub page_rule: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            page_rule: default_page_rule(),
        }
    }
}

fn default_page_rule() -> String {
    "{title} <{url}>\r\n".into()
}

/// `[broadcast]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Envelopes buffered per viewer before a slow viewer starts lagging.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

fn default_capacity() -> usize {
    64
}

// ---------------------------------------------------------------------------
// Divider settings (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime settings consumed by the divider core.
#[derive(Debug, Clone)]
pub struct DividerSettings {
    /// Label for synthesized divider names.
    pub base_name: String,
    /// Bulk expand limit; `None` means unlimited.
    pub expand_limit: Option<usize>,
    /// Bulk expand confirmation threshold.
    pub confirm_threshold: usize,
    /// Page template for URL exports.
    pub page_rule: String,
}

impl Default for DividerSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for DividerSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_name: config.defaults.base_name.clone(),
            expand_limit: match config.expand.limit {
                0 => None,
                n => Some(n),
            },
            confirm_threshold: config.expand.confirm_threshold,
            page_rule: config.export.page_rule.clone(),
        }
    }
}

/// How a front end should treat a bulk expand of `count` pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandCheck {
    /// Go ahead.
    Allowed,
    /// Above the threshold: ask the user first.
    Confirm { count: usize },
    /// Above the hard limit: refuse.
    OverLimit { count: usize, limit: usize },
}

impl DividerSettings {
    /// Classify a bulk expand against the configured limit and threshold.
    pub fn check_expand(&self, count: usize) -> ExpandCheck {
        match self.expand_limit {
            Some(limit) if count > limit => ExpandCheck::OverLimit { count, limit },
            _ if count > self.confirm_threshold => ExpandCheck::Confirm { count },
            _ => ExpandCheck::Allowed,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.tabdivider/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DividerError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.tabdivider/tabdivider.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DividerError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DividerError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DividerError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DividerError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DividerError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` against the home directory.
pub fn resolve_path(raw: &str) -> Result<PathBuf> {
    match raw.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| DividerError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(raw)),
    }
}
