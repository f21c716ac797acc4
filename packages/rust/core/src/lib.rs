//! Divider domain logic for tabdivider.
//!
//! This crate ties the key-value store, the document host and the broadcast
//! protocol together into divider operations (create, rename, compress,
//! expand, ...), the page filters used to search a divider, and the viewer
//! projection that keeps a live view in sync with published events.

pub mod broadcast;
pub mod divider;
pub mod event;
pub mod filter;
pub mod host;
pub mod transfer;
pub mod viewer;

pub use broadcast::{BroadcastHub, BroadcastStats, Broadcaster, ListenerId};
pub use divider::{CompressTarget, Divider, Dividers};
pub use event::{DividerEvent, Envelope, EventKind, ViewerId};
pub use filter::{FilterOutcome, FilterRegistry, PageFilter, QueryStatus};
pub use host::{
    CreateDocument, Document, DocumentHost, DocumentId, DocumentQuery, MemoryHost, left_of,
    right_of,
};
pub use viewer::Viewer;
