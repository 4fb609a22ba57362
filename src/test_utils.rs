//! Test utilities and fixtures for virtual-playlist tests.
//!
//! Provides a throwaway SQLite database, mock track factories, and
//! [`MemorySource`], an in-memory [`TrackSource`] that records every fetch
//! and can hold loads in flight.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::{MemorySource, temp_db};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let source = Arc::new(MemorySource::gated(120));
//!     let playlist = VirtualPlaylist::new(source.clone(), PlaylistConfig::default());
//!     // ... test logic
//! }
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use crate::error::{Error, Result};
use crate::model::VirtualTrack;
use crate::playlist::TrackSource;

/// Creates a temporary database for testing.
///
/// Keep the returned `TempDir` alive for the duration of the test; the
/// database is deleted when it goes out of scope.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db");
    let db_url = crate::db::db_url(Some(&db_path));

    let pool = crate::db::init_db(&db_url)
        .await
        .expect("Failed to initialize test database");

    (pool, dir)
}

/// Creates a valid mock track; `n` drives the ID, path, track number and duration.
pub fn mock_track(n: i64) -> VirtualTrack {
    VirtualTrack {
        id: n,
        file_path: format!("/music/Test Artist/Test Album/{:03}.flac", n),
        title: format!("Track {}", n),
        artist: "Test Artist".to_string(),
        album: "Test Album".to_string(),
        album_artist: "Test Artist".to_string(),
        genre: "Rock".to_string(),
        year: 2023,
        track_number: n as i32,
        disc_number: 1,
        duration: 120 + n,
        file_size: 1_000_000 + n,
        play_count: 0,
        rating: 0,
        last_played: 0,
    }
}

/// Mock tracks with IDs `1..=count`, in canonical order.
pub fn mock_tracks(count: usize) -> Vec<VirtualTrack> {
    (1..=count as i64).map(mock_track).collect()
}

/// Inserts `count` mock tracks into the database.
pub async fn insert_mock_tracks(pool: &SqlitePool, count: usize) -> usize {
    crate::db::insert_tracks(pool, &mock_tracks(count))
        .await
        .expect("Failed to insert mock tracks")
}

/// In-memory [`TrackSource`].
///
/// Records each `fetch` as `(limit, offset)` before serving it. A gated
/// source parks every fetch until [`release`](Self::release) hands out a
/// permit, which lets tests observe and cancel loads in flight.
pub struct MemorySource {
    tracks: Vec<VirtualTrack>,
    reported_count: usize,
    calls: Mutex<Vec<(usize, usize)>>,
    count_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    gate: Option<Semaphore>,
    unavailable: AtomicBool,
    count_fails: AtomicBool,
}

impl MemorySource {
    pub fn new(count: usize) -> Self {
        Self::with_reported_count(count, count)
    }

    /// A source whose fetches wait for [`release`](Self::release).
    pub fn gated(count: usize) -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new(count)
        }
    }

    /// A source holding `count` tracks that claims to hold `reported`.
    pub fn with_reported_count(count: usize, reported: usize) -> Self {
        Self {
            tracks: mock_tracks(count),
            reported_count: reported,
            calls: Mutex::new(Vec::new()),
            count_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            gate: None,
            unavailable: AtomicBool::new(false),
            count_fails: AtomicBool::new(false),
        }
    }

    /// Let `n` parked fetches proceed.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Every fetch so far as `(limit, offset)`.
    pub fn calls(&self) -> Vec<(usize, usize)> {
        self.calls.lock().clone()
    }

    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    /// Most fetches that were ever running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Fetches running right now, including ones parked on the gate.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Yield to the runtime until at least `n` fetches have started.
    pub async fn wait_for_calls(&self, n: usize) {
        while self.calls.lock().len() < n {
            tokio::task::yield_now().await;
        }
    }

    /// Make fetches return no rows.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make `count` return an error.
    pub fn set_count_fails(&self, fails: bool) {
        self.count_fails.store(fails, Ordering::SeqCst);
    }

    /// Sum of all track durations.
    pub fn total_duration(&self) -> i64 {
        self.tracks.iter().map(|t| t.duration).sum()
    }
}

#[async_trait]
impl TrackSource for MemorySource {
    async fn count(&self) -> Result<usize> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        if self.count_fails.load(Ordering::SeqCst) {
            return Err(Error::store("count unavailable"));
        }
        Ok(self.reported_count)
    }

    async fn fetch(&self, limit: usize, offset: usize) -> Result<Vec<VirtualTrack>> {
        self.calls.lock().push((limit, offset));
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .expect("gate semaphore closed")
                .forget();
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }

        Ok(self
            .tracks
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Decrements the in-flight counter when a fetch ends or is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_db_creates_working_database() {
        let (pool, _dir) = temp_db().await;
        assert_eq!(crate::db::count_tracks(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_mock_tracks() {
        let (pool, _dir) = temp_db().await;
        assert_eq!(insert_mock_tracks(&pool, 3).await, 3);
        assert_eq!(crate::db::count_tracks(&pool).await.unwrap(), 3);
    }

    #[test]
    fn test_mock_track_defaults() {
        let track = mock_track(42);
        assert!(track.is_valid());
        assert_eq!(track.id, 42);
        assert_eq!(track.title, "Track 42");
        assert_eq!(track.track_number, 42);
    }

    #[tokio::test]
    async fn test_memory_source_pages_and_records() {
        let source = MemorySource::new(10);
        let page = source.fetch(4, 8).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, 9);
        assert_eq!(source.calls(), vec![(4, 8)]);
        assert_eq!(source.max_in_flight(), 1);
        assert_eq!(source.in_flight(), 0);
    }
}
