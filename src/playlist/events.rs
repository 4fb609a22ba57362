//! Load notifications and observer registration.
//!
//! Callbacks run synchronously on whichever thread completes the load
//! (usually a Tokio worker). The registry lock is released before any
//! callback runs, so a callback may call back into the playlist.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// Events emitted by a [`super::VirtualPlaylist`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistEvent {
    /// `load_all` began; `total` is the backing store's count
    Started { total: usize },
    /// Positions `[start, end]` now hold fresh records
    RangeLoaded { start: usize, end: usize },
    /// Loaded positions so far
    Progress { loaded: usize, total: usize },
    /// Every position is loaded
    Finished,
    /// A count or fetch failed; cache state is unchanged
    Warning(String),
    /// All slots, ranges and the shuffle order were dropped
    Cleared,
}

/// Handle returned by [`Observers::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&PlaylistEvent) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Observers {
    next_id: AtomicU64,
    callbacks: RwLock<Vec<(SubscriptionId, Callback)>>,
}

impl Observers {
    pub(crate) fn subscribe(
        &self,
        callback: impl Fn(&PlaylistEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks.write().push((id, Arc::new(callback)));
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.write();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    pub(crate) fn emit(&self, event: &PlaylistEvent) {
        let callbacks: Vec<Callback> = self
            .callbacks
            .read()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(event);
        }
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.callbacks.read().len())
            .finish()
    }
}
