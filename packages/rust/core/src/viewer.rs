//! A live projection of one divider.
//!
//! A [`Viewer`] reads the divider once on attach and then follows its
//! events: page changes re-run the active query, a rename re-targets the
//! listeners, a delete detaches the viewer and remembers where the divider
//! used to be so a front end can fall back to a neighbour.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tabdivider_shared::{Page, Result};
use tracing::{debug, info};

use crate::broadcast::ListenerId;
use crate::divider::{Divider, Dividers};
use crate::event::{DividerEvent, EventKind};
use crate::filter::{FilterOutcome, FilterRegistry, QueryStatus};

struct ViewState {
    name: String,
    pages: Vec<Page>,
    position: Option<usize>,
    /// Last query that ran successfully.
    query: String,
    outcome: FilterOutcome,
    deleted_at: Option<usize>,
    listeners: Vec<ListenerId>,
}

struct ViewerInner {
    dividers: Dividers,
    filters: Arc<FilterRegistry>,
    state: Mutex<ViewState>,
}

/// One live view of one divider. Dropping it removes its listeners.
pub struct Viewer {
    inner: Arc<ViewerInner>,
}

impl Viewer {
    /// Attach to divider `name`.
    pub async fn open(
        dividers: Dividers,
        filters: Arc<FilterRegistry>,
        name: &str,
    ) -> Result<Self> {
        let divider = dividers.get(name);
        let pages = divider.pages().await?;
        let position = divider.index().await?;
        let outcome = filters.apply("", &pages);

        let inner = Arc::new(ViewerInner {
            dividers,
            filters,
            state: Mutex::new(ViewState {
                name: name.to_string(),
                pages,
                position,
                query: String::new(),
                outcome,
                deleted_at: None,
                listeners: Vec::new(),
            }),
        });
        inner.subscribe(name);
        info!(divider = name, "viewer attached");
        Ok(Self { inner })
    }

    pub fn name(&self) -> String {
        self.inner.state().name.clone()
    }

    /// Handle for the divider currently shown.
    pub fn divider(&self) -> Divider {
        self.inner.dividers.get(&self.name())
    }

    pub fn pages(&self) -> Vec<Page> {
        self.inner.state().pages.clone()
    }

    /// Registry position as last observed.
    pub fn position(&self) -> Option<usize> {
        self.inner.state().position
    }

    pub fn query(&self) -> String {
        self.inner.state().query.clone()
    }

    pub fn outcome(&self) -> FilterOutcome {
        self.inner.state().outcome.clone()
    }

    /// Visible pages in display form.
    pub fn visible(&self) -> Vec<Page> {
        let state = self.inner.state();
        state.outcome.visible().into_iter().cloned().collect()
    }

    /// Position the divider had when it was deleted.
    pub fn deleted_at(&self) -> Option<usize> {
        self.inner.state().deleted_at
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.inner.filters
    }

    /// Run `query` against the current pages.
    ///
    /// On failure the previous query and visible set stay in place.
    pub fn set_query(&self, query: &str) -> QueryStatus {
        let mut state = self.inner.state();
        let outcome = self.inner.filters.apply(query, &state.pages);
        let status = outcome.status;
        if status != QueryStatus::Failed {
            state.query = query.to_string();
            state.outcome = outcome;
        }
        debug!(divider = %state.name, query, ?status, "query applied");
        status
    }

    /// Re-read pages and position from the store.
    pub async fn refresh(&self) -> Result<()> {
        let divider = self.divider();
        let pages = divider.pages().await?;
        let position = divider.index().await?;

        let mut state = self.inner.state();
        state.position = position;
        self.inner.replace_pages(&mut state, pages);
        Ok(())
    }

    /// Show divider `name` instead. The query is reset.
    pub async fn switch_to(&self, name: &str) -> Result<()> {
        self.inner.teardown();

        let divider = self.inner.dividers.get(name);
        let pages = divider.pages().await?;
        let position = divider.index().await?;
        {
            let mut state = self.inner.state();
            state.name = name.to_string();
            state.position = position;
            state.deleted_at = None;
            state.query.clear();
            self.inner.replace_pages(&mut state, pages);
        }
        self.inner.subscribe(name);
        info!(divider = name, "viewer switched");
        Ok(())
    }

    /// After a delete, the name now at the deleted position (clamped to the
    /// end of the registry). `None` if not deleted or nothing is left.
    pub async fn fallback(&self) -> Result<Option<String>> {
        let Some(index) = self.deleted_at() else {
            return Ok(None);
        };
        let names = self.inner.dividers.names().await?;
        Ok(names.get(index.min(names.len().saturating_sub(1))).cloned())
    }
}

impl ViewerInner {
    fn state(&self) -> MutexGuard<'_, ViewState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn replace_pages(&self, state: &mut ViewState, pages: Vec<Page>) {
        state.outcome = self.filters.apply(&state.query, &pages);
        state.pages = pages;
    }

    fn subscribe(self: &Arc<Self>, name: &str) {
        let broadcaster = self.dividers.broadcaster();
        let ids: Vec<ListenerId> = EventKind::ALL
            .into_iter()
            .map(|kind| {
                let weak: Weak<Self> = Arc::downgrade(self);
                broadcaster.on(name, kind, move |event| {
                    if let Some(inner) = weak.upgrade() {
                        inner.handle(event);
                    }
                })
            })
            .collect();
        self.state().listeners.extend(ids);
    }

    fn teardown(&self) {
        let ids = std::mem::take(&mut self.state().listeners);
        let broadcaster = self.dividers.broadcaster();
        for id in ids {
            broadcaster.off(id);
        }
    }

    fn handle(self: &Arc<Self>, event: &DividerEvent) {
        match event {
            DividerEvent::PagesChanged(pages) => {
                let mut state = self.state();
                self.replace_pages(&mut state, pages.clone());
            }
            DividerEvent::IndexChanged { new_index, .. } => {
                self.state().position = Some(*new_index);
            }
            DividerEvent::Rename { new_name, .. } => {
                self.teardown();
                self.state().name = new_name.clone();
                self.subscribe(new_name);
                debug!(divider = %new_name, "viewer followed rename");
            }
            DividerEvent::Delete { index } => {
                self.teardown();
                let mut state = self.state();
                state.deleted_at = Some(*index);
                state.position = None;
                debug!(divider = %state.name, index, "viewed divider deleted");
            }
        }
    }
}

impl Drop for ViewerInner {
    fn drop(&mut self) {
        let ids = match self.state.get_mut() {
            Ok(state) => std::mem::take(&mut state.listeners),
            Err(poisoned) => std::mem::take(&mut poisoned.into_inner().listeners),
        };
        let broadcaster = self.dividers.broadcaster();
        for id in ids {
            broadcaster.off(id);
        }
    }
}
