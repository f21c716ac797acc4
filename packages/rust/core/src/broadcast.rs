//! Change notification between viewers.
//!
//! Every viewer owns one [`Broadcaster`]. Publishing runs the viewer's own
//! listeners synchronously first, then hands the envelope to the transport
//! (a tokio broadcast channel shared through a [`BroadcastHub`]). Other
//! viewers pick it up with [`Broadcaster::receive`], [`Broadcaster::drain`]
//! or a task started by [`Broadcaster::spawn_listener`]; a viewer ignores its
//! own envelopes when they come back around. A listener task stops once the
//! last handle to its broadcaster is dropped.
//!
//! Self-delivery never depends on the transport: a detached broadcaster, or
//! one whose hub has no other subscribers, still notifies its own listeners.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::Notify;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::event::{DividerEvent, Envelope, EventKind, ViewerId};

/// Callback run for every matching event.
pub type Listener = Arc<dyn Fn(&DividerEvent) + Send + Sync>;

/// Handle returned by [`Broadcaster::on`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Delivery counters, read via [`Broadcaster::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Envelopes published by this viewer.
    pub published: u64,
    /// Envelopes from other viewers delivered to listeners.
    pub received: u64,
    /// Envelopes lost because this viewer lagged behind the channel.
    pub dropped: u64,
}

struct Registration {
    id: ListenerId,
    target: String,
    kind: EventKind,
    callback: Listener,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    received: AtomicU64,
    dropped: AtomicU64,
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

/// Shared transport connecting the viewers of one process.
#[derive(Clone)]
pub struct BroadcastHub {
    sender: broadcast::Sender<Arc<Envelope>>,
}

impl BroadcastHub {
    /// `capacity` envelopes are buffered per viewer before it starts lagging.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Create a broadcaster for a new viewer, subscribed from now on.
    pub fn connect(&self) -> Arc<Broadcaster> {
        Arc::new(Broadcaster::with_transport(
            self.sender.clone(),
            self.sender.subscribe(),
        ))
    }

    /// Number of connected viewers still holding a receiver.
    pub fn viewer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

// ---------------------------------------------------------------------------
// Broadcaster
// ---------------------------------------------------------------------------

/// One viewer's endpoint: local listener table plus an optional transport.
pub struct Broadcaster {
    origin: ViewerId,
    transport: Option<broadcast::Sender<Arc<Envelope>>>,
    inbox: tokio::sync::Mutex<Option<broadcast::Receiver<Arc<Envelope>>>>,
    listeners: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
    counters: Counters,
    shutdown: Arc<Notify>,
}

impl Broadcaster {
    /// A broadcaster with no transport; only its own listeners hear it.
    pub fn detached() -> Self {
        Self::build(None, None)
    }

    fn with_transport(
        sender: broadcast::Sender<Arc<Envelope>>,
        receiver: broadcast::Receiver<Arc<Envelope>>,
    ) -> Self {
        Self::build(Some(sender), Some(receiver))
    }

    fn build(
        transport: Option<broadcast::Sender<Arc<Envelope>>>,
        inbox: Option<broadcast::Receiver<Arc<Envelope>>>,
    ) -> Self {
        Self {
            origin: ViewerId::new(),
            transport,
            inbox: tokio::sync::Mutex::new(inbox),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            counters: Counters::default(),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Identity stamped on every envelope this broadcaster publishes.
    pub fn origin(&self) -> ViewerId {
        self.origin
    }

    fn table(&self) -> MutexGuard<'_, Vec<Registration>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -----------------------------------------------------------------------
    // Listener registration
    // -----------------------------------------------------------------------

    /// Register `callback` for events of `kind` about divider `target`.
    pub fn on<F>(&self, target: &str, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&DividerEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.table().push(Registration {
            id,
            target: target.to_string(),
            kind,
            callback: Arc::new(callback),
        });
        trace!(target_divider = target, %kind, ?id, "listener registered");
        id
    }

    /// Unregister one listener. Returns whether it was registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut table = self.table();
        let before = table.len();
        table.retain(|r| r.id != id);
        before != table.len()
    }

    /// Unregister every listener for divider `target`.
    pub fn off_target(&self, target: &str) -> usize {
        let mut table = self.table();
        let before = table.len();
        table.retain(|r| r.target != target);
        before - table.len()
    }

    /// Unregister everything.
    pub fn clear(&self) {
        self.table().clear();
    }

    /// Number of listeners registered for `target`.
    pub fn listener_count(&self, target: &str) -> usize {
        self.table().iter().filter(|r| r.target == target).count()
    }

    // -----------------------------------------------------------------------
    // Publishing & delivery
    // -----------------------------------------------------------------------

    /// Announce a persisted change to divider `target`.
    ///
    /// Local listeners run before this returns; the transport send cannot
    /// fail the call.
    pub fn publish(&self, target: &str, event: DividerEvent) {
        let envelope = Arc::new(Envelope::new(self.origin, target, event));
        self.counters.published.fetch_add(1, Ordering::Relaxed);

        let local = self.dispatch(&envelope);
        debug!(
            target_divider = target,
            kind = %envelope.kind(),
            local,
            "event published"
        );

        if let Some(sender) = &self.transport {
            if sender.send(envelope).is_err() {
                trace!(target_divider = target, "no viewers subscribed to transport");
            }
        }
    }

    /// Run matching listeners in registration order. Returns how many ran.
    fn dispatch(&self, envelope: &Envelope) -> usize {
        let kind = envelope.kind();
        // Snapshot so callbacks may (un)register listeners
        let callbacks: Vec<Listener> = self
            .table()
            .iter()
            .filter(|r| r.kind == kind && r.target == envelope.target)
            .map(|r| Arc::clone(&r.callback))
            .collect();

        for callback in &callbacks {
            callback(&envelope.payload);
        }
        callbacks.len()
    }

    /// Deliver one remote envelope to the listeners it matches.
    fn accept(&self, envelope: &Envelope) -> bool {
        if envelope.origin == self.origin {
            return false;
        }
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        let ran = self.dispatch(envelope);
        debug!(
            target_divider = %envelope.target,
            kind = %envelope.kind(),
            origin = %envelope.origin,
            ran,
            "remote event delivered"
        );
        true
    }

    fn lagged(&self, skipped: u64) {
        self.counters.dropped.fetch_add(skipped, Ordering::Relaxed);
        warn!(skipped, "viewer lagged behind broadcast channel");
    }

    /// Wait for the next envelope from another viewer and deliver it.
    ///
    /// Returns `None` once the transport is closed or absent.
    pub async fn receive(&self) -> Option<Arc<Envelope>> {
        let mut inbox = self.inbox.lock().await;
        let receiver = inbox.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(envelope) => {
                    if self.accept(&envelope) {
                        return Some(envelope);
                    }
                }
                Err(RecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Deliver every envelope already waiting, without blocking.
    ///
    /// Returns how many remote envelopes were delivered. If another task is
    /// currently inside [`Broadcaster::receive`], nothing is drained.
    pub fn drain(&self) -> usize {
        let Ok(mut inbox) = self.inbox.try_lock() else {
            return 0;
        };
        let Some(receiver) = inbox.as_mut() else {
            return 0;
        };

        let mut delivered = 0;
        loop {
            match receiver.try_recv() {
                Ok(envelope) => {
                    if self.accept(&envelope) {
                        delivered += 1;
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        delivered
    }

    /// Keep delivering remote envelopes on a background task.
    ///
    /// The task takes over the inbox, so [`Broadcaster::receive`] and
    /// [`Broadcaster::drain`] find nothing afterwards. It holds only a weak
    /// reference and ends when the broadcaster is dropped or the transport
    /// closes.
    pub fn spawn_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let shutdown = Arc::clone(&self.shutdown);
        tokio::spawn(async move {
            let receiver = match weak.upgrade() {
                Some(this) => {
                    let mut inbox = this.inbox.lock().await;
                    inbox.take()
                }
                None => None,
            };
            let Some(mut receiver) = receiver else {
                return;
            };
            loop {
                let next = tokio::select! {
                    _ = shutdown.notified() => break,
                    next = receiver.recv() => next,
                };
                let Some(this) = weak.upgrade() else {
                    break;
                };
                match next {
                    Ok(envelope) => {
                        this.accept(&envelope);
                    }
                    Err(RecvError::Lagged(skipped)) => this.lagged(skipped),
                    Err(RecvError::Closed) => break,
                }
            }
            trace!("listener task stopped");
        })
    }

    /// Snapshot of the delivery counters.
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            published: self.counters.published.load(Ordering::Relaxed),
            received: self.counters.received.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

impl Drop for Broadcaster {
    fn drop(&mut self) {
        // Stored as a permit if the listener task is not waiting yet
        self.shutdown.notify_one();
    }
}
