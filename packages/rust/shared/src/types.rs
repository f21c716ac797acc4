//! Core domain types for dividers and their saved pages.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Title recorded for a page whose document reported an empty title.
pub const UNKNOWN_TITLE: &str = "[Unknown]";

/// Base label used when a divider is created without a name.
pub const DEFAULT_BASE_NAME: &str = "New Divider";

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

/// A saved reference to a previously open document.
///
/// Pages have no identity of their own: inside a divider they are addressed
/// by position only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Document title at the time it was saved.
    pub title: String,
    /// Document location.
    pub url: String,
    /// When the page was added to its divider (persisted as epoch millis).
    #[serde(rename = "time", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Page {
    /// Build a page stamped with the current time.
    ///
    /// An empty title is replaced by [`UNKNOWN_TITLE`].
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self::at(title, url, Utc::now())
    }

    /// Build a page with an explicit creation time, truncated to the
    /// millisecond precision it is persisted with.
    pub fn at(title: impl Into<String>, url: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        let title = title.into();
        Self {
            title: if title.is_empty() {
                UNKNOWN_TITLE.to_string()
            } else {
                title
            },
            url: url.into(),
            created_at: created_at.trunc_subsecs(3),
        }
    }
}

// ---------------------------------------------------------------------------
// DividerOptions
// ---------------------------------------------------------------------------

/// Per-divider options value. Reserved: always written empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DividerOptions(pub serde_json::Map<String, serde_json::Value>);

impl DividerOptions {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
