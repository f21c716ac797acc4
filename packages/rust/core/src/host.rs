//! The document host: whatever owns the open documents a divider collects.
//!
//! [`MemoryHost`] keeps an ordered list of documents in process. The CLI
//! uses it as a record of what was opened; tests use it as the host.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tabdivider_shared::{DividerError, Result};

/// Host-assigned document identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Descriptor of one open document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    pub url: String,
    /// Position within its window.
    pub window_index: usize,
    pub pinned: bool,
}

/// Filter for [`DocumentHost::query_open_documents`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentQuery {
    /// Only documents in the current window.
    pub current_window: bool,
    /// `Some(p)` keeps documents whose pinned flag equals `p`.
    pub pinned: Option<bool>,
}

impl DocumentQuery {
    /// Unpinned documents of the current window, the compress candidates.
    pub fn unpinned_in_window() -> Self {
        Self {
            current_window: true,
            pinned: Some(false),
        }
    }
}

/// Request for [`DocumentHost::create_document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDocument {
    pub url: String,
    /// Whether the new document takes focus.
    pub active: bool,
    /// Insert right after this window index; `None` appends.
    pub insert_after_index: Option<usize>,
}

/// Async contract the divider core drives documents through.
#[async_trait]
pub trait DocumentHost: Send + Sync {
    /// The document the viewer itself lives in, if any.
    async fn current_document(&self) -> Result<Option<Document>>;

    /// The focused document of the current window.
    async fn focused_document(&self) -> Result<Option<Document>>;

    /// Open documents matching `query`, ordered by window index.
    async fn query_open_documents(&self, query: DocumentQuery) -> Result<Vec<Document>>;

    async fn create_document(&self, request: CreateDocument) -> Result<Document>;

    /// Point the current document at `url`.
    async fn navigate_current(&self, url: &str) -> Result<()>;

    async fn close_documents(&self, ids: &[DocumentId]) -> Result<()>;

    /// Look up one document. Unknown ids are a host error.
    async fn document(&self, id: DocumentId) -> Result<Document>;
}

// ----- compress predicates -----

/// Matches documents to the left of the viewer's document.
pub fn left_of(viewer: &Document, candidate: &Document) -> bool {
    candidate.window_index < viewer.window_index
}

/// Matches documents to the right of the viewer's document.
pub fn right_of(viewer: &Document, candidate: &Document) -> bool {
    candidate.window_index > viewer.window_index
}

// ---------------------------------------------------------------------------
// MemoryHost
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct HostState {
    /// Window order; `window_index` is recomputed from position.
    documents: Vec<Document>,
    current: Option<DocumentId>,
    focused: Option<DocumentId>,
    next_id: u64,
    created: Vec<CreateDocument>,
}

impl HostState {
    fn reindex(&mut self) {
        for (index, doc) in self.documents.iter_mut().enumerate() {
            doc.window_index = index;
        }
    }

    fn find(&self, id: DocumentId) -> Option<&Document> {
        self.documents.iter().find(|d| d.id == id)
    }
}

/// In-process single-window document host.
#[derive(Debug, Default)]
pub struct MemoryHost {
    state: Mutex<HostState>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a document to the window and return its id.
    pub fn open(&self, title: &str, url: &str) -> DocumentId {
        self.push(title, url, false)
    }

    /// Append a pinned document.
    pub fn open_pinned(&self, title: &str, url: &str) -> DocumentId {
        self.push(title, url, true)
    }

    fn push(&self, title: &str, url: &str, pinned: bool) -> DocumentId {
        let mut state = self.state();
        state.next_id += 1;
        let id = DocumentId(state.next_id);
        let window_index = state.documents.len();
        state.documents.push(Document {
            id,
            title: title.to_string(),
            url: url.to_string(),
            window_index,
            pinned,
        });
        if state.focused.is_none() {
            state.focused = Some(id);
        }
        id
    }

    /// Mark the document the viewer lives in.
    pub fn set_current(&self, id: DocumentId) {
        self.state().current = Some(id);
    }

    pub fn set_focused(&self, id: DocumentId) {
        self.state().focused = Some(id);
    }

    /// Snapshot of the window, in order.
    pub fn documents(&self) -> Vec<Document> {
        self.state().documents.clone()
    }

    /// Urls of the window, in order.
    pub fn urls(&self) -> Vec<String> {
        self.state().documents.iter().map(|d| d.url.clone()).collect()
    }

    /// Every creation request received, oldest first.
    pub fn created(&self) -> Vec<CreateDocument> {
        self.state().created.clone()
    }
}

#[async_trait]
impl DocumentHost for MemoryHost {
    async fn current_document(&self) -> Result<Option<Document>> {
        let state = self.state();
        Ok(state.current.and_then(|id| state.find(id).cloned()))
    }

    async fn focused_document(&self) -> Result<Option<Document>> {
        let state = self.state();
        Ok(state.focused.and_then(|id| state.find(id).cloned()))
    }

    async fn query_open_documents(&self, query: DocumentQuery) -> Result<Vec<Document>> {
        // One window: `current_window` selects everything
        Ok(self
            .state()
            .documents
            .iter()
            .filter(|d| query.pinned.is_none_or(|p| d.pinned == p))
            .cloned()
            .collect())
    }

    async fn create_document(&self, request: CreateDocument) -> Result<Document> {
        let mut state = self.state();
        state.next_id += 1;
        let id = DocumentId(state.next_id);
        let position = match request.insert_after_index {
            Some(index) => (index + 1).min(state.documents.len()),
            None => state.documents.len(),
        };
        state.documents.insert(
            position,
            Document {
                id,
                title: String::new(),
                url: request.url.clone(),
                window_index: position,
                pinned: false,
            },
        );
        state.reindex();
        if request.active {
            state.focused = Some(id);
        }
        state.created.push(request);
        state
            .find(id)
            .cloned()
            .ok_or_else(|| DividerError::host(format!("document {id} vanished")))
    }

    async fn navigate_current(&self, url: &str) -> Result<()> {
        let mut state = self.state();
        let target = state
            .current
            .or(state.focused)
            .ok_or_else(|| DividerError::host("no current document to navigate"))?;
        let doc = state
            .documents
            .iter_mut()
            .find(|d| d.id == target)
            .ok_or_else(|| DividerError::host(format!("document {target} is not open")))?;
        doc.url = url.to_string();
        doc.title.clear();
        Ok(())
    }

    async fn close_documents(&self, ids: &[DocumentId]) -> Result<()> {
        let mut state = self.state();
        state.documents.retain(|d| !ids.contains(&d.id));
        state.reindex();
        if state.focused.is_some_and(|f| ids.contains(&f)) {
            state.focused = state.documents.first().map(|d| d.id);
        }
        if state.current.is_some_and(|c| ids.contains(&c)) {
            state.current = None;
        }
        Ok(())
    }

    async fn document(&self, id: DocumentId) -> Result<Document> {
        self.state()
            .find(id)
            .cloned()
            .ok_or_else(|| DividerError::host(format!("document {id} is not open")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_inserts_after_index() {
        let host = MemoryHost::new();
        host.open("A", "https://a.test");
        host.open("B", "https://b.test");

        let doc = host
            .create_document(CreateDocument {
                url: "https://new.test".into(),
                active: false,
                insert_after_index: Some(0),
            })
            .await
            .unwrap();

        assert_eq!(doc.window_index, 1);
        assert_eq!(
            host.urls(),
            vec!["https://a.test", "https://new.test", "https://b.test"]
        );
        assert_eq!(host.created().len(), 1);
    }

    #[tokio::test]
    async fn query_filters_pinned() {
        let host = MemoryHost::new();
        host.open_pinned("Mail", "https://mail.test");
        host.open("A", "https://a.test");

        let unpinned = host
            .query_open_documents(DocumentQuery::unpinned_in_window())
            .await
            .unwrap();
        assert_eq!(unpinned.len(), 1);
        assert_eq!(unpinned[0].title, "A");

        let all = host
            .query_open_documents(DocumentQuery::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn close_reindexes_and_refocuses() {
        let host = MemoryHost::new();
        let a = host.open("A", "https://a.test");
        let b = host.open("B", "https://b.test");
        host.set_focused(a);

        host.close_documents(&[a]).await.unwrap();
        let focused = host.focused_document().await.unwrap().unwrap();
        assert_eq!(focused.id, b);
        assert_eq!(focused.window_index, 0);
        assert!(host.document(a).await.is_err());
    }

    #[tokio::test]
    async fn navigate_rewrites_current() {
        let host = MemoryHost::new();
        let viewer = host.open("Viewer", "tabdivider://view");
        host.set_current(viewer);

        host.navigate_current("https://elsewhere.test").await.unwrap();
        assert_eq!(host.document(viewer).await.unwrap().url, "https://elsewhere.test");
    }

    #[test]
    fn side_predicates() {
        let doc = |window_index| Document {
            id: DocumentId(window_index as u64),
            title: String::new(),
            url: String::new(),
            window_index,
            pinned: false,
        };
        assert!(left_of(&doc(3), &doc(1)));
        assert!(!left_of(&doc(3), &doc(3)));
        assert!(right_of(&doc(3), &doc(4)));
        assert!(!right_of(&doc(3), &doc(2)));
    }
}
