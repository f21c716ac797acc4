//! Change events and their wire envelope.
//!
//! Wire shape (one canonical schema):
//!
//! ```json
//! {"event": "divider", "target": "Work", "origin": "<uuid>",
//!  "type": "indexChanged", "data": {"oldIndex": 2, "newIndex": 0}}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use tabdivider_shared::{DividerError, Page, Result};
use uuid::Uuid;

/// Identifies one running viewer (one broadcaster) on the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewerId(pub Uuid);

impl ViewerId {
    /// Generate a new time-sortable viewer identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ViewerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A change to one divider, published after the change was persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum DividerEvent {
    /// The divider moved from `old_name` to `new_name`.
    Rename { old_name: String, new_name: String },
    /// The full page sequence after the change.
    PagesChanged(Vec<Page>),
    /// The divider's registry position changed.
    IndexChanged { old_index: usize, new_index: usize },
    /// The divider was deleted; `index` is its position before removal.
    Delete { index: usize },
}

impl DividerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Rename { .. } => EventKind::Rename,
            Self::PagesChanged(_) => EventKind::PagesChanged,
            Self::IndexChanged { .. } => EventKind::IndexChanged,
            Self::Delete { .. } => EventKind::Delete,
        }
    }
}

/// Discriminant of [`DividerEvent`], used as half of a listener key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Rename,
    PagesChanged,
    IndexChanged,
    Delete,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Rename,
        EventKind::PagesChanged,
        EventKind::IndexChanged,
        EventKind::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rename => "rename",
            Self::PagesChanged => "pagesChanged",
            Self::IndexChanged => "indexChanged",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message channel marker; always serializes as `"divider"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Divider,
}

/// What travels over the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: Channel,
    /// Name of the divider the event is about (its name before a rename).
    pub target: String,
    /// Viewer that published the event.
    pub origin: ViewerId,
    #[serde(flatten)]
    pub payload: DividerEvent,
}

impl Envelope {
    pub fn new(origin: ViewerId, target: impl Into<String>, payload: DividerEvent) -> Self {
        Self {
            event: Channel::Divider,
            target: target.into(),
            origin,
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| DividerError::parse(e.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| DividerError::parse(e.to_string()))
    }
}
