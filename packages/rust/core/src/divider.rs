//! Divider entities: named, ordered collections of saved pages.
//!
//! [`Dividers`] bundles what every operation needs (store, document host,
//! broadcaster and settings). A [`Divider`] is a short-lived handle, a name
//! plus that context, and caches nothing between calls.
//!
//! Every mutation persists first and then publishes exactly one event.
//! Writes touching several keys are independent; concurrent viewers race
//! with last-writer-wins and converge through the published events.

use std::collections::BTreeSet;
use std::sync::Arc;

use tabdivider_shared::{DividerOptions, DividerSettings, Page, Result};
use tabdivider_storage::{OptionsOf, PagesOf, Registry, TypedStore};
use tracing::{debug, info, instrument, warn};

use crate::broadcast::Broadcaster;
use crate::event::DividerEvent;
use crate::host::{CreateDocument, Document, DocumentHost, DocumentId, DocumentQuery};

/// Shared context for divider operations. Cheap to clone.
#[derive(Clone)]
pub struct Dividers {
    store: TypedStore,
    host: Arc<dyn DocumentHost>,
    broadcaster: Arc<Broadcaster>,
    settings: Arc<DividerSettings>,
}

impl Dividers {
    pub fn new(
        store: TypedStore,
        host: Arc<dyn DocumentHost>,
        broadcaster: Arc<Broadcaster>,
        settings: DividerSettings,
    ) -> Self {
        Self {
            store,
            host,
            broadcaster,
            settings: Arc::new(settings),
        }
    }

    pub fn store(&self) -> &TypedStore {
        &self.store
    }

    pub fn host(&self) -> &Arc<dyn DocumentHost> {
        &self.host
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    pub fn settings(&self) -> &DividerSettings {
        &self.settings
    }

    /// Every divider name, in display order.
    pub async fn names(&self) -> Result<Vec<String>> {
        self.store.registry().await
    }

    pub async fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.names().await?.iter().any(|n| n == name))
    }

    /// Handle for `name`. Nothing is checked or created.
    pub fn get(&self, name: &str) -> Divider {
        Divider {
            name: name.to_string(),
            ctx: self.clone(),
        }
    }

    /// Handles for every registered divider, in display order.
    pub async fn all(&self) -> Result<Vec<Divider>> {
        Ok(self.names().await?.iter().map(|n| self.get(n)).collect())
    }

    /// Create a divider, or return the existing one with that name.
    ///
    /// Without a name (or with an empty one) the first unused
    /// `"<base> <n>"` is taken, counting from 1.
    #[instrument(skip_all, fields(requested = name.unwrap_or("")))]
    pub async fn create(&self, name: Option<&str>) -> Result<Divider> {
        let mut names = self.names().await?;

        let name = match name.filter(|n| !n.is_empty()) {
            Some(name) if names.iter().any(|n| n == name) => {
                debug!(name, "divider already exists");
                return Ok(self.get(name));
            }
            Some(name) => name.to_string(),
            None => first_free_name(&self.settings.base_name, &names),
        };

        self.store.set(&PagesOf(&name), &Vec::new()).await?;
        self.store
            .set(&OptionsOf(&name), &DividerOptions::default())
            .await?;
        names.push(name.clone());
        self.store.set(&Registry, &names).await?;

        info!(name = %name, index = names.len() - 1, "divider created");
        Ok(self.get(&name))
    }
}

/// First `"<base> <n>"`, `n >= 1`, not present in `names`.
fn first_free_name(base: &str, names: &[String]) -> String {
    let taken: BTreeSet<&str> = names.iter().map(String::as_str).collect();
    (1..)
        .map(|n| format!("{base} {n}"))
        .find(|candidate| !taken.contains(candidate.as_str()))
        .unwrap_or_else(|| base.to_string())
}

// ---------------------------------------------------------------------------
// Divider handle
// ---------------------------------------------------------------------------

/// What [`Divider::compress`] should collect.
pub enum CompressTarget<'a> {
    /// One document by id.
    Document(DocumentId),
    /// Every unpinned document of the current window, other than the
    /// viewer's own, for which `predicate(viewer, candidate)` holds.
    Matching(&'a (dyn Fn(&Document, &Document) -> bool + Send + Sync)),
}

/// Handle to one divider.
#[derive(Clone)]
pub struct Divider {
    name: String,
    ctx: Dividers,
}

impl std::fmt::Debug for Divider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Divider").field("name", &self.name).finish()
    }
}

impl Divider {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn store(&self) -> &TypedStore {
        &self.ctx.store
    }

    fn publish(&self, event: DividerEvent) {
        self.ctx.broadcaster.publish(&self.name, event);
    }

    /// Saved pages, newest first. Empty when the key is absent.
    pub async fn pages(&self) -> Result<Vec<Page>> {
        Ok(self
            .store()
            .get(&PagesOf(&self.name))
            .await?
            .unwrap_or_default())
    }

    /// Replace the whole page sequence.
    ///
    /// Refused (`false`) when the divider is not registered.
    #[instrument(skip_all, fields(divider = %self.name, pages = pages.len()))]
    pub async fn set_pages(&self, pages: Vec<Page>) -> Result<bool> {
        if !self.ctx.contains(&self.name).await? {
            warn!("refusing page write to unregistered divider");
            return Ok(false);
        }
        self.write_pages(pages).await?;
        Ok(true)
    }

    async fn write_pages(&self, pages: Vec<Page>) -> Result<()> {
        self.store().set(&PagesOf(&self.name), &pages).await?;
        debug!(divider = %self.name, pages = pages.len(), "pages written");
        self.publish(DividerEvent::PagesChanged(pages));
        Ok(())
    }

    /// Registry position, `None` when not registered.
    pub async fn index(&self) -> Result<Option<usize>> {
        Ok(self.ctx.names().await?.iter().position(|n| *n == self.name))
    }

    /// Move to `new_index` in the registry.
    ///
    /// `false` when unregistered or `new_index` is out of range. Moving to
    /// the current position succeeds without writing or publishing.
    #[instrument(skip_all, fields(divider = %self.name, new_index = new_index))]
    pub async fn set_index(&self, new_index: usize) -> Result<bool> {
        let mut names = self.ctx.names().await?;
        let Some(old_index) = names.iter().position(|n| *n == self.name) else {
            return Ok(false);
        };
        if new_index >= names.len() {
            return Ok(false);
        }
        if new_index == old_index {
            return Ok(true);
        }

        let name = names.remove(old_index);
        names.insert(new_index, name);
        self.store().set(&Registry, &names).await?;

        info!(old_index, new_index, "divider moved");
        self.publish(DividerEvent::IndexChanged {
            old_index,
            new_index,
        });
        Ok(true)
    }

    /// Rename in place, moving the page sequence and options to the new key.
    ///
    /// `false` without any write when `new_name` is empty, unchanged or
    /// taken, or when this divider is not registered.
    #[instrument(skip_all, fields(divider = %self.name, new_name = %new_name))]
    pub async fn rename(&mut self, new_name: &str) -> Result<bool> {
        if new_name.is_empty() || new_name == self.name {
            return Ok(false);
        }
        let mut names = self.ctx.names().await?;
        if names.iter().any(|n| n == new_name) {
            return Ok(false);
        }
        let Some(index) = names.iter().position(|n| *n == self.name) else {
            return Ok(false);
        };

        let pages = self.pages().await?;
        let options = self
            .store()
            .get(&OptionsOf(&self.name))
            .await?
            .unwrap_or_default();

        names[index] = new_name.to_string();
        self.store().set(&Registry, &names).await?;

        // Copy before removing the old keys
        self.store().set(&PagesOf(new_name), &pages).await?;
        self.store().set(&OptionsOf(new_name), &options).await?;
        self.store().remove(&PagesOf(&self.name)).await?;
        self.store().remove(&OptionsOf(&self.name)).await?;

        let old_name = std::mem::replace(&mut self.name, new_name.to_string());
        info!(%old_name, new_name, pages = pages.len(), "divider renamed");
        self.ctx.broadcaster.publish(
            &old_name,
            DividerEvent::Rename {
                old_name: old_name.clone(),
                new_name: new_name.to_string(),
            },
        );
        Ok(true)
    }

    /// Save documents as pages at the front of the divider, then close them.
    ///
    /// Returns the number of pages added. Nothing is written when no
    /// document matches or the divider is not registered.
    #[instrument(skip_all, fields(divider = %self.name))]
    pub async fn compress(&self, target: CompressTarget<'_>) -> Result<usize> {
        if !self.ctx.contains(&self.name).await? {
            warn!("refusing compress into unregistered divider");
            return Ok(0);
        }

        let host = &self.ctx.host;
        let chosen = match target {
            CompressTarget::Document(id) => vec![host.document(id).await?],
            CompressTarget::Matching(predicate) => {
                let viewer = match host.current_document().await? {
                    Some(doc) => Some(doc),
                    None => host.focused_document().await?,
                };
                let Some(viewer) = viewer else {
                    debug!("no viewer document to compare against");
                    return Ok(0);
                };
                host.query_open_documents(DocumentQuery::unpinned_in_window())
                    .await?
                    .into_iter()
                    .filter(|doc| doc.id != viewer.id && predicate(&viewer, doc))
                    .collect()
            }
        };
        if chosen.is_empty() {
            return Ok(0);
        }

        // Each match goes to the front in turn
        let mut pages = self.pages().await?;
        let added: Vec<Page> = chosen
            .iter()
            .rev()
            .map(|doc| Page::new(doc.title.clone(), doc.url.clone()))
            .collect();
        pages.splice(0..0, added);
        self.write_pages(pages).await?;

        let ids: Vec<DocumentId> = chosen.iter().map(|d| d.id).collect();
        host.close_documents(&ids).await?;

        info!(count = ids.len(), "documents compressed");
        Ok(ids.len())
    }

    /// Remove the pages at `indices` and reopen them after the focused
    /// document, in ascending index order.
    ///
    /// Indices refer to the sequence before the call; duplicates collapse
    /// and out-of-range indices are skipped. Returns the removed pages in
    /// ascending index order.
    #[instrument(skip_all, fields(divider = %self.name, requested = indices.len()))]
    pub async fn expand(&self, indices: &[usize]) -> Result<Vec<Page>> {
        if !self.ctx.contains(&self.name).await? {
            warn!("refusing expand of unregistered divider");
            return Ok(Vec::new());
        }

        let mut pages = self.pages().await?;
        let wanted: BTreeSet<usize> = indices.iter().copied().collect();

        // Highest index first so earlier indices stay valid
        let mut removed = Vec::with_capacity(wanted.len());
        for &index in wanted.iter().rev() {
            if index >= pages.len() {
                warn!(index, len = pages.len(), "skipping out-of-range page index");
                continue;
            }
            removed.push(pages.remove(index));
        }
        if removed.is_empty() {
            return Ok(removed);
        }
        removed.reverse();

        // Each document lands right after the previous one; without a
        // focused document they are appended in order
        let mut insert_after_index = self
            .ctx
            .host
            .focused_document()
            .await?
            .map(|d| d.window_index);
        for page in &removed {
            let created = self
                .ctx
                .host
                .create_document(CreateDocument {
                    url: page.url.clone(),
                    active: false,
                    insert_after_index,
                })
                .await?;
            if insert_after_index.is_some() {
                insert_after_index = Some(created.window_index);
            }
        }

        self.write_pages(pages).await?;
        info!(count = removed.len(), "pages expanded");
        Ok(removed)
    }

    /// Open page `index`.
    ///
    /// `navigate` reuses the current document, otherwise a new active
    /// document opens after the focused one. `expand` also removes the page.
    /// `false` when the index is out of range, or when removing from an
    /// unregistered divider.
    #[instrument(skip_all, fields(divider = %self.name, index = index, navigate = navigate, expand = expand))]
    pub async fn open(&self, index: usize, navigate: bool, expand: bool) -> Result<bool> {
        if expand && !self.ctx.contains(&self.name).await? {
            return Ok(false);
        }
        let mut pages = self.pages().await?;
        if index >= pages.len() {
            return Ok(false);
        }
        let page = pages.remove(index);

        let host = &self.ctx.host;
        if navigate {
            host.navigate_current(&page.url).await?;
        } else {
            let insert_after_index = host.focused_document().await?.map(|d| d.window_index);
            host.create_document(CreateDocument {
                url: page.url.clone(),
                active: true,
                insert_after_index,
            })
            .await?;
        }
        debug!(url = %page.url, "page opened");

        if expand {
            self.write_pages(pages).await?;
        }
        Ok(true)
    }

    /// Move one page so that it ends up at position `to`.
    #[instrument(skip_all, fields(divider = %self.name, from = from, to = to))]
    pub async fn move_page(&self, from: usize, to: usize) -> Result<bool> {
        if !self.ctx.contains(&self.name).await? {
            return Ok(false);
        }
        let mut pages = self.pages().await?;
        if from >= pages.len() || to >= pages.len() {
            return Ok(false);
        }
        if from == to {
            return Ok(true);
        }
        let page = pages.remove(from);
        pages.insert(to, page);
        self.write_pages(pages).await?;
        info!("page moved");
        Ok(true)
    }

    /// Remove the divider with its pages and options.
    #[instrument(skip_all, fields(divider = %self.name))]
    pub async fn delete(&self) -> Result<bool> {
        let mut names = self.ctx.names().await?;
        let Some(index) = names.iter().position(|n| *n == self.name) else {
            return Ok(false);
        };
        names.remove(index);

        self.store().set(&Registry, &names).await?;
        self.store().remove(&PagesOf(&self.name)).await?;
        self.store().remove(&OptionsOf(&self.name)).await?;

        info!(index, "divider deleted");
        self.publish(DividerEvent::Delete { index });
        Ok(true)
    }

    /// Every page rendered with the configured page rule, concatenated.
    pub async fn export_urls(&self) -> Result<String> {
        let rule = &self.ctx.settings.page_rule;
        Ok(self
            .pages()
            .await?
            .iter()
            .map(|page| rule.replace("{title}", &page.title).replace("{url}", &page.url))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::host::{MemoryHost, left_of, right_of};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tabdivider_shared::DividerError;
    use tabdivider_storage::{KeyValueStore, MemoryStore};

    struct Fixture {
        dividers: Dividers,
        host: Arc<MemoryHost>,
        store: Arc<MemoryStore>,
    }

    fn fixture() -> Fixture {
        fixture_with_host(Arc::new(MemoryHost::new()))
    }

    fn fixture_with_host(host: Arc<MemoryHost>) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let dividers = Dividers::new(
            TypedStore::new(store.clone()),
            host.clone(),
            Arc::new(Broadcaster::detached()),
            DividerSettings::default(),
        );
        Fixture {
            dividers,
            host,
            store,
        }
    }

    /// Every event published about `name`, in order.
    fn record(dividers: &Dividers, name: &str) -> Arc<Mutex<Vec<DividerEvent>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        for kind in EventKind::ALL {
            let log = Arc::clone(&log);
            dividers.broadcaster().on(name, kind, move |event| {
                log.lock().unwrap().push(event.clone());
            });
        }
        log
    }

    fn assert_unique(names: &[String]) {
        let set: BTreeSet<&String> = names.iter().collect();
        assert_eq!(set.len(), names.len(), "duplicate names in {names:?}");
    }

    fn five_pages() -> Vec<Page> {
        (0..5)
            .map(|i| Page::new(format!("P{i}"), format!("https://p{i}.test")))
            .collect()
    }

    // ----- create -----

    #[tokio::test]
    async fn create_synthesizes_first_unused_name() {
        let fx = fixture();
        let a = fx.dividers.create(None).await.unwrap();
        let b = fx.dividers.create(None).await.unwrap();
        assert_eq!(a.name(), "New Divider 1");
        assert_eq!(b.name(), "New Divider 2");

        a.delete().await.unwrap();
        let c = fx.dividers.create(Some("")).await.unwrap();
        assert_eq!(c.name(), "New Divider 1");
        assert_eq!(
            fx.dividers.names().await.unwrap(),
            vec!["New Divider 2", "New Divider 1"]
        );
    }

    #[tokio::test]
    async fn create_writes_empty_pages_and_options() {
        let fx = fixture();
        fx.dividers.create(Some("Work")).await.unwrap();

        let all = fx.store.get_all().await.unwrap();
        assert_eq!(all["dividers"], serde_json::json!(["Work"]));
        assert_eq!(all["dividers.Work.pages"], serde_json::json!([]));
        assert_eq!(all["dividers.Work.options"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn create_existing_returns_handle_without_mutation() {
        let fx = fixture();
        let work = fx.dividers.create(Some("Work")).await.unwrap();
        work.set_pages(vec![Page::new("A", "https://a.test")])
            .await
            .unwrap();
        let log = record(&fx.dividers, "Work");

        let again = fx.dividers.create(Some("Work")).await.unwrap();
        assert_eq!(again.name(), "Work");
        assert_eq!(again.pages().await.unwrap().len(), 1);
        assert_eq!(fx.dividers.names().await.unwrap(), vec!["Work"]);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_duplicate_names_across_lifecycle() {
        let fx = fixture();
        let mut a = fx.dividers.create(Some("A")).await.unwrap();
        fx.dividers.create(Some("B")).await.unwrap();
        fx.dividers.create(Some("A")).await.unwrap();
        assert_unique(&fx.dividers.names().await.unwrap());

        assert!(!a.rename("B").await.unwrap());
        assert_unique(&fx.dividers.names().await.unwrap());

        fx.dividers.create(None).await.unwrap();
        assert!(a.rename("New Divider 2").await.unwrap());
        fx.dividers.create(None).await.unwrap();
        fx.dividers.create(None).await.unwrap();
        assert_unique(&fx.dividers.names().await.unwrap());

        fx.dividers.get("B").delete().await.unwrap();
        fx.dividers.create(Some("B")).await.unwrap();
        let names = fx.dividers.names().await.unwrap();
        assert_unique(&names);
        assert_eq!(names.len(), 5);
    }

    // ----- rename -----

    #[tokio::test]
    async fn rename_preserves_pages() {
        for pages in [Vec::new(), five_pages()] {
            let fx = fixture();
            let mut divider = fx.dividers.create(Some("Old")).await.unwrap();
            divider.set_pages(pages.clone()).await.unwrap();
            let log = record(&fx.dividers, "Old");

            assert!(divider.rename("New").await.unwrap());
            assert_eq!(divider.name(), "New");
            assert_eq!(fx.dividers.get("New").pages().await.unwrap(), pages);

            let all = fx.store.get_all().await.unwrap();
            assert!(!all.contains_key("dividers.Old.pages"));
            assert!(!all.contains_key("dividers.Old.options"));
            assert!(all.contains_key("dividers.New.options"));
            assert_eq!(
                *log.lock().unwrap(),
                vec![DividerEvent::Rename {
                    old_name: "Old".into(),
                    new_name: "New".into()
                }]
            );
        }
    }

    #[tokio::test]
    async fn rename_rejections_leave_store_alone() {
        let fx = fixture();
        let mut a = fx.dividers.create(Some("A")).await.unwrap();
        fx.dividers.create(Some("B")).await.unwrap();
        let before = fx.store.get_all().await.unwrap();

        assert!(!a.rename("").await.unwrap());
        assert!(!a.rename("A").await.unwrap());
        assert!(!a.rename("B").await.unwrap());

        let mut ghost = fx.dividers.get("Ghost");
        assert!(!ghost.rename("C").await.unwrap());

        assert_eq!(fx.store.get_all().await.unwrap(), before);
        assert_eq!(a.name(), "A");
    }

    // ----- index -----

    #[tokio::test]
    async fn set_index_roundtrips_every_position() {
        let fx = fixture();
        for name in ["A", "B", "C", "D"] {
            fx.dividers.create(Some(name)).await.unwrap();
        }
        let c = fx.dividers.get("C");
        for target in 0..4 {
            assert!(c.set_index(target).await.unwrap());
            assert_eq!(c.index().await.unwrap(), Some(target));
        }
        assert_unique(&fx.dividers.names().await.unwrap());
    }

    #[tokio::test]
    async fn set_index_same_position_publishes_nothing() {
        let fx = fixture();
        fx.dividers.create(Some("A")).await.unwrap();
        let b = fx.dividers.create(Some("B")).await.unwrap();
        let log = record(&fx.dividers, "B");

        assert!(b.set_index(1).await.unwrap());
        assert!(log.lock().unwrap().is_empty());

        assert!(b.set_index(0).await.unwrap());
        assert_eq!(
            *log.lock().unwrap(),
            vec![DividerEvent::IndexChanged {
                old_index: 1,
                new_index: 0
            }]
        );
        assert_eq!(fx.dividers.names().await.unwrap(), vec!["B", "A"]);
    }

    #[tokio::test]
    async fn set_index_rejects_out_of_range_and_unknown() {
        let fx = fixture();
        let a = fx.dividers.create(Some("A")).await.unwrap();
        assert!(!a.set_index(1).await.unwrap());
        assert!(!fx.dividers.get("Ghost").set_index(0).await.unwrap());
        assert_eq!(fx.dividers.get("Ghost").index().await.unwrap(), None);
    }

    // ----- pages -----

    #[tokio::test]
    async fn stale_handle_cannot_write_pages() {
        let fx = fixture();
        let work = fx.dividers.create(Some("Work")).await.unwrap();
        let stale = work.clone();
        work.delete().await.unwrap();

        assert!(!stale.set_pages(five_pages()).await.unwrap());
        assert!(!stale.move_page(0, 1).await.unwrap());
        assert!(stale.expand(&[0]).await.unwrap().is_empty());
        assert!(!fx
            .store
            .get_all()
            .await
            .unwrap()
            .contains_key("dividers.Work.pages"));
    }

    #[tokio::test]
    async fn set_pages_publishes_full_sequence() {
        let fx = fixture();
        let work = fx.dividers.create(Some("Work")).await.unwrap();
        let log = record(&fx.dividers, "Work");

        let pages = five_pages();
        assert!(work.set_pages(pages.clone()).await.unwrap());
        assert_eq!(*log.lock().unwrap(), vec![DividerEvent::PagesChanged(pages)]);
    }

    #[tokio::test]
    async fn move_page_reorders() {
        let fx = fixture();
        let work = fx.dividers.create(Some("Work")).await.unwrap();
        work.set_pages(five_pages()).await.unwrap();

        assert!(work.move_page(0, 3).await.unwrap());
        let titles: Vec<String> = work.pages().await.unwrap().into_iter().map(|p| p.title).collect();
        assert_eq!(titles, vec!["P1", "P2", "P3", "P0", "P4"]);

        assert!(!work.move_page(0, 5).await.unwrap());
        assert!(work.move_page(2, 2).await.unwrap());
    }

    // ----- compress -----

    #[tokio::test]
    async fn compress_single_document() {
        let fx = fixture();
        let doc = fx.host.open("", "https://untitled.test");
        let work = fx.dividers.create(Some("Work")).await.unwrap();

        let added = work.compress(CompressTarget::Document(doc)).await.unwrap();
        assert_eq!(added, 1);
        let pages = work.pages().await.unwrap();
        assert_eq!(pages[0].title, "[Unknown]");
        assert_eq!(pages[0].url, "https://untitled.test");
        assert!(fx.host.documents().is_empty());
    }

    #[tokio::test]
    async fn compress_skips_pinned_and_viewer() {
        let fx = fixture();
        fx.host.open_pinned("Mail", "https://mail.test");
        let left = fx.host.open("Left", "https://left.test");
        let viewer = fx.host.open("Viewer", "tabdivider://work");
        fx.host.open("Right", "https://right.test");
        fx.host.set_current(viewer);

        let work = fx.dividers.create(Some("Work")).await.unwrap();
        let added = work.compress(CompressTarget::Matching(&left_of)).await.unwrap();
        assert_eq!(added, 1);
        assert!(fx.host.document(left).await.is_err());

        let added = work.compress(CompressTarget::Matching(&right_of)).await.unwrap();
        assert_eq!(added, 1);

        let titles: Vec<String> = work.pages().await.unwrap().into_iter().map(|p| p.title).collect();
        assert_eq!(titles, vec!["Right", "Left"]);
        assert_eq!(fx.host.urls(), vec!["https://mail.test", "tabdivider://work"]);
    }

    #[tokio::test]
    async fn compress_without_matches_writes_nothing() {
        let fx = fixture();
        let viewer = fx.host.open("Viewer", "tabdivider://work");
        fx.host.set_current(viewer);
        let work = fx.dividers.create(Some("Work")).await.unwrap();
        let log = record(&fx.dividers, "Work");

        let added = work.compress(CompressTarget::Matching(&left_of)).await.unwrap();
        assert_eq!(added, 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn work_scenario() {
        let fx = fixture();
        let viewer = fx.host.open("Viewer", "tabdivider://work");
        fx.host.open("A", "https://a.test");
        fx.host.open("B", "https://b.test");
        fx.host.set_current(viewer);

        let work = fx.dividers.create(Some("Work")).await.unwrap();
        let added = work
            .compress(CompressTarget::Matching(&|_: &Document, _: &Document| true))
            .await
            .unwrap();
        assert_eq!(added, 2);

        let titles: Vec<String> = work.pages().await.unwrap().into_iter().map(|p| p.title).collect();
        assert_eq!(titles, vec!["B", "A"]);

        assert!(work.delete().await.unwrap());
        assert!(!fx.dividers.names().await.unwrap().contains(&"Work".to_string()));
        let all = fx.store.get_all().await.unwrap();
        assert!(!all.contains_key("dividers.Work.pages"));
        assert!(!all.contains_key("dividers.Work.options"));
    }

    // ----- expand / open -----

    #[tokio::test]
    async fn expand_is_order_independent() {
        for order in [[0, 2, 4], [4, 0, 2], [2, 4, 0], [4, 2, 0]] {
            let fx = fixture();
            let focused = fx.host.open("Viewer", "tabdivider://work");
            fx.host.open("Other", "https://other.test");
            fx.host.set_focused(focused);

            let work = fx.dividers.create(Some("Work")).await.unwrap();
            work.set_pages(five_pages()).await.unwrap();

            let removed = work.expand(&order).await.unwrap();
            let removed: Vec<String> = removed.into_iter().map(|p| p.title).collect();
            assert_eq!(removed, vec!["P0", "P2", "P4"]);

            let left: Vec<String> = work.pages().await.unwrap().into_iter().map(|p| p.title).collect();
            assert_eq!(left, vec!["P1", "P3"]);

            assert_eq!(
                fx.host.urls(),
                vec![
                    "tabdivider://work",
                    "https://p0.test",
                    "https://p2.test",
                    "https://p4.test",
                    "https://other.test",
                ]
            );
            assert!(fx.host.created().iter().all(|c| !c.active));
        }
    }

    #[tokio::test]
    async fn expand_without_focus_appends_in_index_order() {
        let fx = fixture();
        let work = fx.dividers.create(Some("Work")).await.unwrap();
        work.set_pages(five_pages()).await.unwrap();

        let removed = work.expand(&[2, 0, 1]).await.unwrap();
        assert_eq!(removed.len(), 3);
        assert_eq!(
            fx.host.urls(),
            vec!["https://p0.test", "https://p1.test", "https://p2.test"]
        );
    }

    #[tokio::test]
    async fn expand_skips_bad_indices_and_publishes_once() {
        let fx = fixture();
        let work = fx.dividers.create(Some("Work")).await.unwrap();
        work.set_pages(five_pages()).await.unwrap();
        let log = record(&fx.dividers, "Work");

        let removed = work.expand(&[1, 1, 9]).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(log.lock().unwrap().len(), 1);

        let removed = work.expand(&[42]).await.unwrap();
        assert!(removed.is_empty());
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn open_by_navigation_keeps_divider() {
        let fx = fixture();
        let viewer = fx.host.open("Viewer", "tabdivider://work");
        fx.host.set_current(viewer);
        let work = fx.dividers.create(Some("Work")).await.unwrap();
        work.set_pages(five_pages()).await.unwrap();

        assert!(work.open(3, true, false).await.unwrap());
        assert_eq!(fx.host.urls(), vec!["https://p3.test"]);
        assert_eq!(work.pages().await.unwrap().len(), 5);

        assert!(!work.open(5, true, false).await.unwrap());
    }

    #[tokio::test]
    async fn open_in_new_document_and_expand() {
        let fx = fixture();
        fx.host.open("Viewer", "tabdivider://work");
        let work = fx.dividers.create(Some("Work")).await.unwrap();
        work.set_pages(five_pages()).await.unwrap();

        assert!(work.open(0, false, true).await.unwrap());
        let created = fx.host.created();
        assert_eq!(created.len(), 1);
        assert!(created[0].active);
        assert_eq!(created[0].insert_after_index, Some(0));

        let left: Vec<String> = work.pages().await.unwrap().into_iter().map(|p| p.title).collect();
        assert_eq!(left, vec!["P1", "P2", "P3", "P4"]);
    }

    // ----- delete / export -----

    #[tokio::test]
    async fn delete_reports_prior_index() {
        let fx = fixture();
        fx.dividers.create(Some("A")).await.unwrap();
        let b = fx.dividers.create(Some("B")).await.unwrap();
        let log = record(&fx.dividers, "B");

        assert!(b.delete().await.unwrap());
        assert!(!b.delete().await.unwrap());
        assert_eq!(*log.lock().unwrap(), vec![DividerEvent::Delete { index: 1 }]);
    }

    #[tokio::test]
    async fn export_urls_uses_page_rule() {
        let fx = fixture();
        let work = fx.dividers.create(Some("Work")).await.unwrap();
        work.set_pages(vec![
            Page::new("Rust", "https://rust-lang.org"),
            Page::new("Tokio", "https://tokio.rs"),
        ])
        .await
        .unwrap();

        assert_eq!(
            work.export_urls().await.unwrap(),
            "Rust <https://rust-lang.org>\r\nTokio <https://tokio.rs>\r\n"
        );
    }

    // ----- host failures -----

    /// Host whose close always fails.
    struct StuckHost(MemoryHost);

    #[async_trait]
    impl DocumentHost for StuckHost {
        async fn current_document(&self) -> Result<Option<Document>> {
            self.0.current_document().await
        }
        async fn focused_document(&self) -> Result<Option<Document>> {
            self.0.focused_document().await
        }
        async fn query_open_documents(&self, query: DocumentQuery) -> Result<Vec<Document>> {
            self.0.query_open_documents(query).await
        }
        async fn create_document(&self, request: CreateDocument) -> Result<Document> {
            self.0.create_document(request).await
        }
        async fn navigate_current(&self, url: &str) -> Result<()> {
            self.0.navigate_current(url).await
        }
        async fn close_documents(&self, _ids: &[DocumentId]) -> Result<()> {
            Err(DividerError::host("close refused"))
        }
        async fn document(&self, id: DocumentId) -> Result<Document> {
            self.0.document(id).await
        }
    }

    #[tokio::test]
    async fn failed_close_keeps_persisted_pages() {
        let inner = MemoryHost::new();
        let doc = inner.open("A", "https://a.test");
        let store = Arc::new(MemoryStore::new());
        let dividers = Dividers::new(
            TypedStore::new(store.clone()),
            Arc::new(StuckHost(inner)),
            Arc::new(Broadcaster::detached()),
            DividerSettings::default(),
        );
        let work = dividers.create(Some("Work")).await.unwrap();
        let log = record(&dividers, "Work");

        let err = work.compress(CompressTarget::Document(doc)).await.unwrap_err();
        assert!(matches!(err, DividerError::Host(_)));
        assert_eq!(work.pages().await.unwrap().len(), 1);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_document_is_host_error() {
        let fx = fixture();
        let work = fx.dividers.create(Some("Work")).await.unwrap();
        let err = work
            .compress(CompressTarget::Document(DocumentId(99)))
            .await
            .unwrap_err();
        assert!(matches!(err, DividerError::Host(_)));
        assert!(work.pages().await.unwrap().is_empty());
    }

    // ----- spans -----

    /// Collects `name=value` for every field recorded when a span opens.
    #[derive(Clone, Default)]
    struct SpanFields(Arc<Mutex<Vec<String>>>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for SpanFields {
        fn on_new_span(
            &self,
            attrs: &tracing::span::Attributes<'_>,
            _id: &tracing::span::Id,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            struct Collect<'a>(&'a mut Vec<String>);
            impl tracing::field::Visit for Collect<'_> {
                fn record_debug(
                    &mut self,
                    field: &tracing::field::Field,
                    value: &dyn std::fmt::Debug,
                ) {
                    self.0.push(format!("{}={:?}", field.name(), value));
                }
            }
            attrs.record(&mut Collect(&mut self.0.lock().unwrap()));
        }
    }

    #[tokio::test]
    async fn operation_spans_carry_their_arguments() {
        use tracing_subscriber::layer::SubscriberExt;

        let fields = SpanFields::default();
        let subscriber = tracing_subscriber::registry().with(fields.clone());
        let _guard = tracing::subscriber::set_default(subscriber);

        let fx = fixture();
        let viewer = fx.host.open("Viewer", "tabdivider://work");
        fx.host.set_current(viewer);
        fx.dividers.create(Some("Other")).await.unwrap();
        let mut work = fx.dividers.create(Some("Work")).await.unwrap();
        work.set_pages(five_pages()).await.unwrap();

        work.set_index(0).await.unwrap();
        work.move_page(1, 3).await.unwrap();
        work.open(2, true, false).await.unwrap();
        work.rename("Play").await.unwrap();

        let recorded = fields.0.lock().unwrap().clone();
        for expected in [
            "new_index=0",
            "from=1",
            "to=3",
            "index=2",
            "navigate=true",
            "expand=false",
            "new_name=Play",
        ] {
            assert!(
                recorded.iter().any(|f| f == expected),
                "{expected} missing from {recorded:?}"
            );
        }
    }
}
