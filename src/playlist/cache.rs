//! Windowed cache over a [`TrackSource`].
//!
//! [`VirtualPlaylist`] presents `total_count` positions as if they were all
//! resident, while only the chunks that have been requested are actually
//! held in memory. Reads never block: a read of an unloaded position
//! returns the sentinel record and schedules a background chunk load.
//!
//! # Locking
//!
//! Two independent lock domains:
//! - `state`: slot array, range tracker and duration accumulator. Held only
//!   while copying results in or reading them out, never across store I/O.
//! - `shuffle`: the shuffle permutation.
//!
//! They are never held at the same time.
//!
//! # Loads
//!
//! At most one chunk load is in flight. Scheduling a new load cancels the
//! previous one and the new task awaits it before querying the store, so
//! the most recently requested window wins. Writes that were already
//! applied are never rolled back; a later load of the same range simply
//! overwrites them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard, RwLock};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::{Observers, PlaylistEvent, SubscriptionId};
use super::ranges::RangeTracker;
use super::shuffle::ShuffleOrder;
use super::source::TrackSource;
use crate::config::PlaylistConfig;
use crate::error::{Error, Result};
use crate::model::VirtualTrack;

/// Lazily-materialized, database-backed track list.
///
/// Dropping the playlist cancels any in-flight load; the load task releases
/// its share of the cache once it observes the cancellation.
pub struct VirtualPlaylist {
    inner: Arc<Inner>,
}

struct Inner {
    source: Arc<dyn TrackSource>,
    runtime: Handle,
    config: RwLock<PlaylistConfig>,
    state: RwLock<CacheState>,
    shuffle: Mutex<ShuffleOrder>,
    loading: AtomicBool,
    current: Mutex<Option<LoadTask>>,
    next_load_id: AtomicU64,
    observers: Observers,
}

/// Everything guarded by the slot lock.
///
/// `slots[i].is_some()` iff `ranges.contains(i)`.
#[derive(Default)]
struct CacheState {
    slots: Vec<Option<VirtualTrack>>,
    ranges: RangeTracker,
    total_duration: i64,
}

/// The in-flight load. Stays in `current` until a newer load or a
/// cancellation takes it, even after it has finished.
struct LoadTask {
    id: u64,
    start: usize,
    end: usize,
    token: CancellationToken,
    handle: JoinHandle<()>,
    done: watch::Receiver<bool>,
}

impl LoadTask {
    fn is_active(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }
}

impl VirtualPlaylist {
    /// Create a playlist that spawns its loads on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime; use
    /// [`with_handle`](Self::with_handle) in that case.
    pub fn new(source: Arc<dyn TrackSource>, config: PlaylistConfig) -> Self {
        Self::with_handle(source, config, Handle::current())
    }

    /// Create a playlist that spawns its loads on `runtime`.
    pub fn with_handle(
        source: Arc<dyn TrackSource>,
        config: PlaylistConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                runtime,
                config: RwLock::new(config.normalized()),
                state: RwLock::new(CacheState::default()),
                shuffle: Mutex::new(ShuffleOrder::new()),
                loading: AtomicBool::new(false),
                current: Mutex::new(None),
                next_load_id: AtomicU64::new(0),
                observers: Observers::default(),
            }),
        }
    }

    pub fn config(&self) -> PlaylistConfig {
        self.inner.config.read().clone()
    }

    /// Replace the tuning parameters.
    ///
    /// Only allowed before the first [`load_all`](Self::load_all) allocates
    /// slots (or after [`clear`](Self::clear)).
    pub fn set_config(&self, config: PlaylistConfig) -> Result<()> {
        let allocated = !self.inner.state.read().slots.is_empty();
        if allocated || self.is_loading() {
            return Err(Error::config(
                "playlist configuration cannot change once loading has started",
            ));
        }
        *self.inner.config.write() = config.normalized();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// Register a callback for every [`PlaylistEvent`].
    pub fn subscribe(
        &self,
        callback: impl Fn(&PlaylistEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.observers.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.observers.unsubscribe(id)
    }

    /// Called with `(start, end)` whenever a chunk lands.
    pub fn on_range_loaded(
        &self,
        callback: impl Fn(usize, usize) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe(move |event| {
            if let PlaylistEvent::RangeLoaded { start, end } = event {
                callback(*start, *end);
            }
        })
    }

    /// Called with `(loaded, total)` after each chunk.
    pub fn on_progress(
        &self,
        callback: impl Fn(usize, usize) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe(move |event| {
            if let PlaylistEvent::Progress { loaded, total } = event {
                callback(*loaded, *total);
            }
        })
    }

    pub fn on_finished(&self, callback: impl Fn() + Send + Sync + 'static) -> SubscriptionId {
        self.subscribe(move |event| {
            if matches!(event, PlaylistEvent::Finished) {
                callback();
            }
        })
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Size the cache from the store's count and schedule the first chunk.
    ///
    /// A call while a load cycle is already running does nothing. Returns
    /// the total count. A count failure is reported as a
    /// [`PlaylistEvent::Warning`] and returned, leaving the cache untouched.
    pub async fn load_all(&self) -> Result<usize> {
        if self.inner.loading.swap(true, Ordering::AcqRel) {
            debug!(target: "playlist::cache", "load_all ignored, already loading");
            return Ok(self.total_count());
        }

        let total = match self.inner.source.count().await {
            Ok(total) => total,
            Err(e) => {
                self.inner.loading.store(false, Ordering::Release);
                self.inner
                    .report_failure(format!("Failed to count tracks: {}", e));
                return Err(e);
            }
        };

        self.inner
            .observers
            .emit(&PlaylistEvent::Started { total });

        self.inner.cancel_current().await;
        {
            let mut state = self.inner.state.write();
            state.slots = vec![None; total];
            state.ranges.clear();
            state.total_duration = 0;
        }

        if total == 0 {
            info!(target: "playlist::cache", "Track store is empty");
            self.inner.loading.store(false, Ordering::Release);
            self.inner.observers.emit(&PlaylistEvent::Finished);
            return Ok(0);
        }

        let chunk = self.inner.config.read().chunk_size;
        info!(target: "playlist::cache", total, chunk, "Loading playlist");
        self.inner.schedule(0, chunk.min(total));
        Ok(total)
    }

    /// Schedule a load of `count` positions starting at `offset`.
    ///
    /// The window is clamped to the collection; requests starting past the
    /// end are ignored.
    pub fn request_range(&self, offset: usize, count: usize) {
        let total = self.total_count();
        if offset >= total || count == 0 {
            return;
        }
        self.inner.schedule(offset, count.min(total - offset));
    }

    /// Make sure `index` is loaded or on its way.
    ///
    /// Schedules a `buffer_size` window centered on `index` unless the
    /// position is already loaded or the in-flight load covers it.
    pub fn ensure_loaded(&self, index: usize) {
        let total = {
            let state = self.inner.state.read();
            match state.slots.get(index) {
                None | Some(Some(_)) => return,
                Some(None) => state.slots.len(),
            }
        };
        if self.inner.pending_covers(index, index) {
            return;
        }

        let buffer = self.inner.config.read().buffer_size;
        let start = index.saturating_sub(buffer / 2);
        self.inner.schedule(start, buffer.min(total - start));
    }

    /// Load `[center - radius, center + radius]` unless it is all loaded.
    pub fn preload_range(&self, center: usize, radius: usize) {
        let (start, end) = {
            let state = self.inner.state.read();
            let total = state.slots.len();
            if center >= total {
                return;
            }
            let start = center.saturating_sub(radius);
            let end = center.saturating_add(radius).min(total - 1);
            if state.ranges.contains_span(start, end) {
                return;
            }
            (start, end)
        };
        if self.inner.pending_covers(start, end) {
            return;
        }
        self.inner.schedule(start, end - start + 1);
    }

    /// [`preload_range`](Self::preload_range) with the configured radius.
    pub fn preload_around(&self, center: usize) {
        let radius = self.inner.config.read().preload_radius;
        self.preload_range(center, radius);
    }

    /// Wait until no load is in flight.
    ///
    /// With `auto_fill` enabled this waits for the whole collection.
    pub async fn wait_until_idle(&self) {
        loop {
            let done = match self.inner.current.lock().as_ref() {
                Some(task) => task.done.clone(),
                None => break,
            };
            if *done.borrow() {
                break;
            }
            let mut done = done;
            if done.wait_for(|finished| *finished).await.is_err() {
                warn!(target: "playlist::cache", "Load task ended without finishing");
                break;
            }
        }
    }

    /// Cancel any in-flight load and drop all loaded data and the shuffle order.
    ///
    /// Waits for the cancelled task to finish before releasing the slots.
    pub async fn clear(&self) {
        self.inner.cancel_current().await;
        {
            let mut state = self.inner.state.write();
            *state = CacheState::default();
        }
        self.inner.shuffle.lock().clear();
        self.inner.loading.store(false, Ordering::Release);

        info!(target: "playlist::cache", "Playlist cleared");
        self.inner.observers.emit(&PlaylistEvent::Cleared);
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Record at `index`, or the sentinel if it is out of range or not loaded.
    ///
    /// An unloaded position schedules a load; re-query after the matching
    /// [`PlaylistEvent::RangeLoaded`].
    pub fn get(&self, index: usize) -> VirtualTrack {
        let slot = {
            let state = self.inner.state.read();
            match state.slots.get(index) {
                Some(slot) => slot.clone(),
                None => return VirtualTrack::invalid(),
            }
        };

        match slot {
            Some(track) => track,
            None => {
                self.ensure_loaded(index);
                VirtualTrack::invalid()
            }
        }
    }

    /// Record at `index` if it is loaded, without scheduling anything.
    pub fn peek(&self, index: usize) -> Option<VirtualTrack> {
        self.inner.state.read().slots.get(index).cloned().flatten()
    }

    /// The loaded prefix of `[start, start + count)`.
    ///
    /// Stops at the first unloaded position and schedules a load for it, so
    /// the result may be shorter than `count`.
    pub fn get_range(&self, start: usize, count: usize) -> Vec<VirtualTrack> {
        let mut tracks = Vec::new();
        let missing = {
            let state = self.inner.state.read();
            let end = start.saturating_add(count).min(state.slots.len());
            let mut missing = None;
            for index in start..end {
                match &state.slots[index] {
                    Some(track) => tracks.push(track.clone()),
                    None => {
                        missing = Some(index);
                        break;
                    }
                }
            }
            missing
        };

        if let Some(index) = missing {
            self.ensure_loaded(index);
        }
        tracks
    }

    pub fn is_loaded(&self, index: usize) -> bool {
        self.inner
            .state
            .read()
            .slots
            .get(index)
            .is_some_and(Option::is_some)
    }

    pub fn loaded_count(&self) -> usize {
        self.inner.state.read().ranges.count()
    }

    pub fn total_count(&self) -> usize {
        self.inner.state.read().slots.len()
    }

    /// Sum of loaded durations in seconds.
    ///
    /// Accumulated as chunks land, so it is only exact once fully loaded.
    pub fn total_duration(&self) -> i64 {
        self.inner.state.read().total_duration
    }

    pub fn is_fully_loaded(&self) -> bool {
        let state = self.inner.state.read();
        state.ranges.count() == state.slots.len()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.loading.load(Ordering::Acquire)
    }

    /// Snapshot of the loaded intervals.
    pub fn loaded_ranges(&self) -> Vec<(usize, usize)> {
        self.inner.state.read().ranges.ranges().to_vec()
    }

    // ------------------------------------------------------------------
    // Shuffle
    // ------------------------------------------------------------------

    /// Build a new shuffle order over all positions, keeping `anchor` first.
    pub fn generate_shuffle(&self, anchor: Option<usize>) {
        let total = self.total_count();
        self.inner.shuffle.lock().generate(total, anchor);
    }

    pub fn shuffle_to_shuffled(&self, linear: usize) -> Option<usize> {
        self.inner.shuffle.lock().to_shuffled(linear)
    }

    pub fn shuffle_to_linear(&self, shuffled: usize) -> Option<usize> {
        self.inner.shuffle.lock().to_linear(shuffled)
    }

    pub fn shuffle_next_n(&self, current: usize, n: usize) -> Vec<usize> {
        self.inner.shuffle.lock().next_n(current, n)
    }

    pub fn shuffle_next(&self, current: usize) -> Option<usize> {
        self.inner.shuffle.lock().next(current)
    }

    pub fn shuffle_previous(&self, current: usize) -> Option<usize> {
        self.inner.shuffle.lock().previous(current)
    }

    pub fn shuffle_len(&self) -> usize {
        self.inner.shuffle.lock().len()
    }

    pub fn shuffle_order(&self) -> Vec<usize> {
        self.inner.shuffle.lock().as_slice().to_vec()
    }
}

impl Drop for VirtualPlaylist {
    fn drop(&mut self) {
        if let Some(task) = self.inner.current.lock().take() {
            task.token.cancel();
        }
    }
}

impl Inner {
    /// Replace the in-flight load with a load of `[offset, offset + count)`.
    fn schedule(self: &Arc<Self>, offset: usize, count: usize) {
        if count == 0 {
            return;
        }
        let mut current = self.current.lock();
        self.replace_load(&mut current, offset, count);
    }

    /// Like [`schedule`](Self::schedule), but only while load `id` is still
    /// the current one. Returns whether the load was scheduled.
    fn schedule_after(self: &Arc<Self>, id: u64, offset: usize, count: usize) -> bool {
        if count == 0 {
            return false;
        }
        let mut current = self.current.lock();
        if !current.as_ref().is_some_and(|task| task.id == id) {
            debug!(target: "playlist::cache", offset, "Background fill yields to a newer load");
            return false;
        }
        self.replace_load(&mut current, offset, count);
        true
    }

    fn replace_load(
        self: &Arc<Self>,
        current: &mut MutexGuard<'_, Option<LoadTask>>,
        offset: usize,
        count: usize,
    ) {
        let previous = current.take();
        if let Some(previous) = &previous {
            previous.token.cancel();
        }

        let id = self.next_load_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let (done_tx, done) = watch::channel(false);

        debug!(target: "playlist::cache", id, offset, count, "Scheduling chunk load");
        let inner = Arc::clone(self);
        let task_token = token.clone();
        let handle = self.runtime.spawn(async move {
            if let Some(previous) = previous {
                if let Err(e) = previous.handle.await {
                    warn!(target: "playlist::cache", error = %e, "Superseded load task failed");
                }
            }
            inner.run_load(id, offset, count, task_token).await;
            done_tx.send_replace(true);
        });

        **current = Some(LoadTask {
            id,
            start: offset,
            end: offset + count - 1,
            token,
            handle,
            done,
        });
    }

    /// Whether the in-flight load will cover `[start, end]`.
    fn pending_covers(&self, start: usize, end: usize) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|task| task.is_active() && task.start <= start && end <= task.end)
    }

    async fn cancel_current(&self) {
        let task = self.current.lock().take();
        if let Some(task) = task {
            task.token.cancel();
            if let Err(e) = task.handle.await {
                warn!(target: "playlist::cache", error = %e, "Cancelled load task failed");
            }
        }
    }

    async fn run_load(
        self: Arc<Self>,
        id: u64,
        offset: usize,
        count: usize,
        token: CancellationToken,
    ) {
        if token.is_cancelled() {
            debug!(target: "playlist::cache", offset, count, "Load superseded before start");
            return;
        }

        let fetched = tokio::select! {
            _ = token.cancelled() => {
                debug!(target: "playlist::cache", offset, count, "Load superseded during fetch");
                return;
            }
            result = self.source.fetch(count, offset) => result,
        };

        let tracks = match fetched {
            Ok(tracks) if !tracks.is_empty() => tracks,
            Ok(_) => {
                self.report_failure(format!(
                    "Track store returned no rows for {} at offset {}",
                    count, offset
                ));
                return;
            }
            Err(e) => {
                self.report_failure(format!(
                    "Failed to fetch {} tracks at offset {}: {}",
                    count, offset, e
                ));
                return;
            }
        };

        let (end, loaded, total) = {
            let mut guard = self.state.write();
            if token.is_cancelled() {
                debug!(target: "playlist::cache", offset, "Load superseded before apply");
                return;
            }

            let state = &mut *guard;
            let total = state.slots.len();
            if offset >= total {
                debug!(target: "playlist::cache", offset, total, "Chunk outside current slots");
                return;
            }

            let end = (offset + tracks.len()).min(total);
            for (slot, track) in state.slots[offset..end].iter_mut().zip(tracks) {
                state.total_duration += track.duration;
                if let Some(previous) = slot.replace(track) {
                    state.total_duration -= previous.duration;
                }
            }
            state.ranges.mark_loaded(offset, end - 1);
            (end - 1, state.ranges.count(), total)
        };

        debug!(target: "playlist::cache", start = offset, end, loaded, total, "Chunk loaded");
        self.observers.emit(&PlaylistEvent::RangeLoaded { start: offset, end });
        self.observers
            .emit(&PlaylistEvent::Progress { loaded, total });

        if loaded == total {
            if self.loading.swap(false, Ordering::AcqRel) {
                info!(target: "playlist::cache", total, "Playlist fully loaded");
                self.observers.emit(&PlaylistEvent::Finished);
            }
            return;
        }

        let auto_fill = self.config.read().auto_fill;
        if auto_fill && self.loading.load(Ordering::Acquire) && !token.is_cancelled() {
            let gap = self.state.read().ranges.first_gap(total);
            if let Some(gap) = gap {
                let chunk = self.config.read().chunk_size;
                self.schedule_after(id, gap, chunk.min(total - gap));
            }
        }
    }

    fn report_failure(&self, message: String) {
        warn!(target: "playlist::cache", "{}", message);
        self.observers.emit(&PlaylistEvent::Warning(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MemorySource;

    fn playlist_over(source: &Arc<MemorySource>, config: PlaylistConfig) -> VirtualPlaylist {
        VirtualPlaylist::new(source.clone(), config)
    }

    fn record_events(playlist: &VirtualPlaylist) -> Arc<Mutex<Vec<PlaylistEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        playlist.subscribe(move |event| sink.lock().push(event.clone()));
        events
    }

    /// Slot occupancy and range coverage must agree everywhere.
    fn assert_coverage(playlist: &VirtualPlaylist) {
        let state = playlist.inner.state.read();
        let mut occupied = 0;
        for (index, slot) in state.slots.iter().enumerate() {
            assert_eq!(
                slot.is_some(),
                state.ranges.contains(index),
                "slot/range mismatch at {}",
                index
            );
            occupied += usize::from(slot.is_some());
        }
        assert_eq!(state.ranges.count(), occupied);
    }

    #[tokio::test]
    async fn test_empty_store_finishes_immediately() {
        let source = Arc::new(MemorySource::new(0));
        let playlist = playlist_over(&source, PlaylistConfig::default());
        let events = record_events(&playlist);

        assert_eq!(playlist.load_all().await.unwrap(), 0);

        assert_eq!(
            *events.lock(),
            vec![PlaylistEvent::Started { total: 0 }, PlaylistEvent::Finished]
        );
        assert!(playlist.is_fully_loaded());
        assert!(!playlist.is_loading());
        assert_eq!(playlist.loaded_count(), 0);
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_load_all_fetches_first_chunk() {
        let source = Arc::new(MemorySource::new(120));
        let playlist = playlist_over(&source, PlaylistConfig::default());
        let events = record_events(&playlist);

        assert_eq!(playlist.load_all().await.unwrap(), 120);
        playlist.wait_until_idle().await;

        assert_eq!(source.calls(), vec![(50, 0)]);
        assert_eq!(playlist.loaded_count(), 50);
        assert_eq!(playlist.loaded_ranges(), vec![(0, 49)]);
        assert!(playlist.is_loading());
        assert!(!playlist.is_fully_loaded());
        assert_coverage(&playlist);

        let events = events.lock();
        assert!(events.contains(&PlaylistEvent::RangeLoaded { start: 0, end: 49 }));
        assert!(events.contains(&PlaylistEvent::Progress {
            loaded: 50,
            total: 120
        }));
        assert!(!events.contains(&PlaylistEvent::Finished));
    }

    #[tokio::test]
    async fn test_get_unloaded_schedules_centered_window() {
        let source = Arc::new(MemorySource::gated(120));
        let playlist = playlist_over(&source, PlaylistConfig::default());
        playlist.load_all().await.unwrap();

        // Supersedes the first chunk before it starts
        assert!(!playlist.get(75).is_valid());
        source.wait_for_calls(1).await;

        // Still pending: sentinel, and no duplicate load
        assert!(!playlist.get(75).is_valid());
        assert_eq!(source.calls(), vec![(50, 50)]);

        source.release(1);
        playlist.wait_until_idle().await;

        let track = playlist.get(75);
        assert!(track.is_valid());
        assert_eq!(track.id, 76);
        assert_eq!(playlist.loaded_ranges(), vec![(50, 99)]);
        assert_coverage(&playlist);
    }

    #[tokio::test]
    async fn test_consecutive_chunks_merge() {
        // The requested ranges replace the first chunk before it starts
        let source = Arc::new(MemorySource::gated(120));
        let playlist = playlist_over(&source, PlaylistConfig::default());
        playlist.load_all().await.unwrap();
        playlist.request_range(0, 30);
        source.release(1);
        playlist.wait_until_idle().await;
        playlist.request_range(30, 30);
        source.release(1);
        playlist.wait_until_idle().await;

        assert_eq!(playlist.loaded_ranges(), vec![(0, 59)]);
        assert_eq!(playlist.loaded_count(), 60);
        assert_coverage(&playlist);
    }

    #[tokio::test]
    async fn test_get_range_returns_loaded_prefix() {
        let source = Arc::new(MemorySource::gated(120));
        let playlist = playlist_over(&source, PlaylistConfig::default());
        playlist.load_all().await.unwrap();
        playlist.request_range(0, 10);
        source.release(1);
        playlist.wait_until_idle().await;

        let tracks = playlist.get_range(0, 20);
        assert_eq!(tracks.len(), 10);
        assert!(tracks.iter().all(VirtualTrack::is_valid));
        assert_eq!(tracks[9].id, 10);

        // The first gap at 10 was scheduled with a centered, clamped window
        source.wait_for_calls(2).await;
        assert_eq!(source.calls().last(), Some(&(50, 0)));
    }

    #[tokio::test]
    async fn test_reloading_range_is_idempotent() {
        let source = Arc::new(MemorySource::new(120));
        let playlist = playlist_over(&source, PlaylistConfig::default());
        playlist.load_all().await.unwrap();
        playlist.wait_until_idle().await;

        let before = playlist.get_range(0, 50);
        let duration = playlist.total_duration();

        playlist.request_range(0, 50);
        playlist.wait_until_idle().await;

        assert_eq!(playlist.loaded_count(), 50);
        assert_eq!(playlist.get_range(0, 50), before);
        assert_eq!(playlist.total_duration(), duration);
        assert_coverage(&playlist);
    }

    #[tokio::test]
    async fn test_out_of_range_returns_sentinel() {
        let source = Arc::new(MemorySource::new(10));
        let playlist = playlist_over(&source, PlaylistConfig::default());

        // Before load_all every index is out of range
        assert!(!playlist.get(0).is_valid());
        assert!(playlist.peek(0).is_none());
        assert!(playlist.get_range(0, 5).is_empty());

        playlist.load_all().await.unwrap();
        playlist.wait_until_idle().await;
        assert!(!playlist.get(10).is_valid());
        assert!(!playlist.is_loaded(10));
        assert_eq!(source.calls(), vec![(10, 0)]);
    }

    #[tokio::test]
    async fn test_unavailable_store_leaves_state_untouched() {
        let source = Arc::new(MemorySource::new(120));
        source.set_unavailable(true);
        let playlist = playlist_over(&source, PlaylistConfig::default());
        let events = record_events(&playlist);

        playlist.load_all().await.unwrap();
        playlist.wait_until_idle().await;

        assert_eq!(playlist.loaded_count(), 0);
        assert!(!playlist.get(0).is_valid());
        assert_coverage(&playlist);
        assert!(
            events
                .lock()
                .iter()
                .any(|e| matches!(e, PlaylistEvent::Warning(_)))
        );

        // Next access retries
        source.set_unavailable(false);
        assert!(!playlist.get(0).is_valid());
        playlist.wait_until_idle().await;
        assert!(playlist.get(0).is_valid());
        assert_eq!(playlist.loaded_ranges(), vec![(0, 49)]);
    }

    #[tokio::test]
    async fn test_count_failure_is_reported() {
        let source = Arc::new(MemorySource::new(5));
        source.set_count_fails(true);
        let playlist = playlist_over(&source, PlaylistConfig::default());
        let events = record_events(&playlist);

        assert!(playlist.load_all().await.is_err());
        assert!(!playlist.is_loading());
        assert_eq!(playlist.total_count(), 0);
        assert!(matches!(
            events.lock().as_slice(),
            [PlaylistEvent::Warning(_)]
        ));
    }

    #[tokio::test]
    async fn test_load_all_while_loading_is_noop() {
        let source = Arc::new(MemorySource::gated(120));
        let playlist = playlist_over(&source, PlaylistConfig::default());

        playlist.load_all().await.unwrap();
        source.wait_for_calls(1).await;
        playlist.load_all().await.unwrap();

        source.release(5);
        playlist.wait_until_idle().await;
        assert_eq!(source.count_calls(), 1);
        assert_eq!(source.calls(), vec![(50, 0)]);
    }

    #[tokio::test]
    async fn test_new_request_supersedes_in_flight_load() {
        let source = Arc::new(MemorySource::gated(120));
        let playlist = playlist_over(&source, PlaylistConfig::default());
        playlist.load_all().await.unwrap();
        source.wait_for_calls(1).await;

        playlist.request_range(100, 10);
        source.release(5);
        playlist.wait_until_idle().await;

        assert_eq!(source.calls(), vec![(50, 0), (10, 100)]);
        assert_eq!(playlist.loaded_ranges(), vec![(100, 109)]);
        assert_coverage(&playlist);
    }

    #[tokio::test]
    async fn test_clear_cancels_and_resets() {
        let source = Arc::new(MemorySource::gated(120));
        let playlist = playlist_over(&source, PlaylistConfig::default());
        let events = record_events(&playlist);

        playlist.load_all().await.unwrap();
        source.wait_for_calls(1).await;
        playlist.generate_shuffle(None);

        playlist.clear().await;
        source.release(5);
        playlist.wait_until_idle().await;

        assert_eq!(playlist.total_count(), 0);
        assert_eq!(playlist.loaded_count(), 0);
        assert_eq!(playlist.total_duration(), 0);
        assert_eq!(playlist.shuffle_len(), 0);
        assert!(!playlist.is_loading());
        assert!(playlist.loaded_ranges().is_empty());
        assert_coverage(&playlist);
        assert_eq!(events.lock().last(), Some(&PlaylistEvent::Cleared));
    }

    #[tokio::test]
    async fn test_auto_fill_loads_everything() {
        let source = Arc::new(MemorySource::new(120));
        let config = PlaylistConfig {
            auto_fill: true,
            ..Default::default()
        };
        let playlist = playlist_over(&source, config);
        let events = record_events(&playlist);

        playlist.load_all().await.unwrap();
        playlist.wait_until_idle().await;

        assert_eq!(source.calls(), vec![(50, 0), (50, 50), (20, 100)]);
        assert!(playlist.is_fully_loaded());
        assert!(!playlist.is_loading());
        assert_eq!(playlist.loaded_ranges(), vec![(0, 119)]);
        assert_eq!(playlist.total_duration(), source.total_duration());
        assert_coverage(&playlist);

        let finished = events
            .lock()
            .iter()
            .filter(|e| **e == PlaylistEvent::Finished)
            .count();
        assert_eq!(finished, 1);
    }

    #[tokio::test]
    async fn test_ensure_loaded_clamps_at_end() {
        let source = Arc::new(MemorySource::gated(120));
        let playlist = playlist_over(&source, PlaylistConfig::default());
        playlist.load_all().await.unwrap();

        playlist.ensure_loaded(110);
        source.release(5);
        playlist.wait_until_idle().await;

        assert_eq!(source.calls(), vec![(35, 85)]);
        assert_eq!(playlist.loaded_ranges(), vec![(85, 119)]);
    }

    #[tokio::test]
    async fn test_preload_skips_loaded_span() {
        let source = Arc::new(MemorySource::new(120));
        let playlist = playlist_over(&source, PlaylistConfig::default());
        playlist.load_all().await.unwrap();
        playlist.wait_until_idle().await;

        playlist.preload_range(20, 10);
        playlist.preload_around(5);
        playlist.wait_until_idle().await;
        assert_eq!(source.calls(), vec![(50, 0)]);

        playlist.preload_range(60, 10);
        playlist.wait_until_idle().await;
        assert_eq!(source.calls().last(), Some(&(21, 50)));
        assert_eq!(playlist.loaded_ranges(), vec![(0, 70)]);
    }

    #[tokio::test]
    async fn test_set_config_only_before_loading() {
        let source = Arc::new(MemorySource::new(30));
        let playlist = playlist_over(&source, PlaylistConfig::default());

        let config = PlaylistConfig {
            chunk_size: 10,
            ..Default::default()
        };
        playlist.set_config(config.clone()).unwrap();
        assert_eq!(playlist.config().chunk_size, 10);

        playlist.load_all().await.unwrap();
        playlist.wait_until_idle().await;
        assert_eq!(source.calls(), vec![(10, 0)]);
        assert!(playlist.set_config(config).is_err());
    }

    #[tokio::test]
    async fn test_shuffle_is_independent_of_loading() {
        let source = Arc::new(MemorySource::gated(120));
        let playlist = playlist_over(&source, PlaylistConfig::default());
        playlist.load_all().await.unwrap();
        source.wait_for_calls(1).await;

        // A load is parked in the store; shuffle queries still answer
        playlist.generate_shuffle(Some(5));
        assert_eq!(playlist.shuffle_len(), 120);
        assert_eq!(playlist.shuffle_to_shuffled(0), Some(5));
        assert_eq!(playlist.shuffle_to_linear(5), Some(0));
        assert_eq!(playlist.shuffle_previous(5), None);
        assert_eq!(playlist.shuffle_next_n(5, 3).len(), 3);

        let order = playlist.shuffle_order();
        assert_eq!(playlist.shuffle_next(order[0]), Some(order[1]));
        assert_eq!(playlist.shuffle_previous(order[1]), Some(5));

        source.release(1);
        playlist.wait_until_idle().await;
    }

    #[tokio::test]
    async fn test_range_loaded_callback_fires_with_bounds() {
        let source = Arc::new(MemorySource::new(30));
        let playlist = playlist_over(&source, PlaylistConfig::default());

        let ranges = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&ranges);
        playlist.on_range_loaded(move |start, end| sink.lock().push((start, end)));

        let progress = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&progress);
        playlist.on_progress(move |loaded, total| sink.lock().push((loaded, total)));

        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        playlist.on_finished(move || flag.store(true, Ordering::SeqCst));

        playlist.load_all().await.unwrap();
        playlist.wait_until_idle().await;

        assert_eq!(*ranges.lock(), vec![(0, 29)]);
        assert_eq!(*progress.lock(), vec![(30, 30)]);
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_short_fetch_marks_actual_rows() {
        // Store claims 30 rows but only has 25
        let source = Arc::new(MemorySource::with_reported_count(25, 30));
        let playlist = playlist_over(&source, PlaylistConfig::default());
        let events = record_events(&playlist);

        playlist.load_all().await.unwrap();
        playlist.wait_until_idle().await;

        assert_eq!(source.calls(), vec![(30, 0)]);
        assert_eq!(playlist.loaded_ranges(), vec![(0, 24)]);
        assert!(!playlist.is_fully_loaded());
        assert!(!playlist.get(27).is_valid());
        assert_coverage(&playlist);
        assert!(events.lock().contains(&PlaylistEvent::RangeLoaded { start: 0, end: 24 }));
    }

    #[tokio::test]
    async fn test_clear_while_waiting_for_idle() {
        let source = Arc::new(MemorySource::gated(120));
        let playlist = Arc::new(playlist_over(&source, PlaylistConfig::default()));
        let events = record_events(&playlist);
        playlist.load_all().await.unwrap();
        source.wait_for_calls(1).await;

        let waiter = tokio::spawn({
            let playlist = Arc::clone(&playlist);
            async move { playlist.wait_until_idle().await }
        });
        tokio::task::yield_now().await;

        // Waiting must not hide the parked first chunk
        assert!(playlist.inner.pending_covers(0, 49));
        playlist.request_range(100, 10);
        playlist.clear().await;

        // The first chunk was cancelled and awaited; the second never fetched
        assert_eq!(source.calls(), vec![(50, 0)]);
        assert_eq!(source.max_in_flight(), 1);
        assert_eq!(source.in_flight(), 0);

        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("wait_until_idle did not return")
            .unwrap();

        source.release(5);
        tokio::task::yield_now().await;
        assert_eq!(playlist.total_count(), 0);
        assert!(
            !events
                .lock()
                .iter()
                .any(|e| matches!(e, PlaylistEvent::RangeLoaded { .. }))
        );
    }

    #[tokio::test]
    async fn test_background_fill_yields_to_newer_request() {
        let source = Arc::new(MemorySource::gated(200));
        let config = PlaylistConfig {
            auto_fill: true,
            ..Default::default()
        };
        let playlist = playlist_over(&source, config);
        playlist.load_all().await.unwrap();
        source.wait_for_calls(1).await;
        let fill_id = playlist
            .inner
            .current
            .lock()
            .as_ref()
            .map(|task| task.id)
            .unwrap();

        // A viewport request lands before the fill chunk reschedules
        playlist.request_range(150, 10);
        assert!(!playlist.inner.schedule_after(fill_id, 50, 50));
        assert!(playlist.inner.pending_covers(150, 159));

        source.release(10);
        playlist.wait_until_idle().await;

        let calls = source.calls();
        assert_eq!(calls[1], (10, 150));
        assert!(playlist.is_fully_loaded());
        assert_eq!(source.max_in_flight(), 1);
        assert_coverage(&playlist);
    }

    #[tokio::test]
    async fn test_drop_cancels_in_flight_load() {
        let source = Arc::new(MemorySource::gated(120));
        let playlist = playlist_over(&source, PlaylistConfig::default());
        let events = record_events(&playlist);
        playlist.load_all().await.unwrap();
        source.wait_for_calls(1).await;
        assert_eq!(Arc::strong_count(&source), 2);

        drop(playlist);
        source.release(1);

        // The load task lets go of the cache once it sees the cancellation
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while Arc::strong_count(&source) > 1 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("load task kept the cache alive");

        assert_eq!(source.in_flight(), 0);
        assert!(
            !events
                .lock()
                .iter()
                .any(|e| matches!(e, PlaylistEvent::RangeLoaded { .. }))
        );
    }
}
