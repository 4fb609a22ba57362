//! Row/role façade over a [`VirtualPlaylist`] for list views.
//!
//! [`TrackListModel`] answers the questions a list widget asks (how many
//! rows, what is in this cell) and forwards load notifications as
//! row-scoped change signals. Rows that are not loaded yet read as
//! placeholders and pull their neighbourhood in the background.
//!
//! A full reset is only signalled when the bound playlist is swapped or
//! cleared; ordinary loads only ever report the rows they touched.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::model::VirtualTrack;
use crate::playlist::{PlaylistEvent, SubscriptionId, VirtualPlaylist};

/// Text shown for fields of rows that are still loading.
pub const LOADING_LABEL: &str = "Loading…";

/// A field of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Id,
    FilePath,
    Title,
    Artist,
    Album,
    AlbumArtist,
    Genre,
    Year,
    TrackNumber,
    DiscNumber,
    Duration,
    FileSize,
    PlayCount,
    Rating,
    LastPlayed,
}

impl Role {
    pub const ALL: [Role; 15] = [
        Role::Id,
        Role::FilePath,
        Role::Title,
        Role::Artist,
        Role::Album,
        Role::AlbumArtist,
        Role::Genre,
        Role::Year,
        Role::TrackNumber,
        Role::DiscNumber,
        Role::Duration,
        Role::FileSize,
        Role::PlayCount,
        Role::Rating,
        Role::LastPlayed,
    ];

    /// Name a view binds to.
    pub fn name(self) -> &'static str {
        match self {
            Role::Id => "id",
            Role::FilePath => "filePath",
            Role::Title => "title",
            Role::Artist => "artist",
            Role::Album => "album",
            Role::AlbumArtist => "albumArtist",
            Role::Genre => "genre",
            Role::Year => "year",
            Role::TrackNumber => "trackNumber",
            Role::DiscNumber => "discNumber",
            Role::Duration => "duration",
            Role::FileSize => "fileSize",
            Role::PlayCount => "playCount",
            Role::Rating => "rating",
            Role::LastPlayed => "lastPlayed",
        }
    }

    pub fn from_name(name: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|role| role.name() == name)
    }

    pub fn is_text(self) -> bool {
        matches!(
            self,
            Role::FilePath
                | Role::Title
                | Role::Artist
                | Role::Album
                | Role::AlbumArtist
                | Role::Genre
        )
    }

    fn value(self, track: &VirtualTrack) -> RoleValue {
        match self {
            Role::Id => RoleValue::Integer(track.id),
            Role::FilePath => RoleValue::Text(track.file_path.clone()),
            Role::Title => RoleValue::Text(track.title.clone()),
            Role::Artist => RoleValue::Text(track.artist.clone()),
            Role::Album => RoleValue::Text(track.album.clone()),
            Role::AlbumArtist => RoleValue::Text(track.album_artist.clone()),
            Role::Genre => RoleValue::Text(track.genre.clone()),
            Role::Year => RoleValue::Integer(track.year.into()),
            Role::TrackNumber => RoleValue::Integer(track.track_number.into()),
            Role::DiscNumber => RoleValue::Integer(track.disc_number.into()),
            Role::Duration => RoleValue::Integer(track.duration),
            Role::FileSize => RoleValue::Integer(track.file_size),
            Role::PlayCount => RoleValue::Integer(track.play_count.into()),
            Role::Rating => RoleValue::Integer(track.rating.into()),
            Role::LastPlayed => RoleValue::Integer(track.last_played),
        }
    }

    fn placeholder(self) -> RoleValue {
        if self.is_text() {
            RoleValue::Text(LOADING_LABEL.to_string())
        } else {
            RoleValue::Integer(0)
        }
    }
}

/// Value of one cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleValue {
    Text(String),
    Integer(i64),
}

impl RoleValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RoleValue::Text(text) => Some(text),
            RoleValue::Integer(_) => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RoleValue::Integer(value) => Some(*value),
            RoleValue::Text(_) => None,
        }
    }
}

impl fmt::Display for RoleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleValue::Text(text) => f.write_str(text),
            RoleValue::Integer(value) => write!(f, "{}", value),
        }
    }
}

/// Receives change notifications from a [`TrackListModel`].
///
/// Called from whichever thread completed the load.
pub trait ModelListener: Send + Sync {
    /// Rows `first..=last` have new data.
    fn rows_changed(&self, first: usize, last: usize);

    /// Everything changed; re-read the row count.
    fn model_reset(&self);
}

#[derive(Default)]
struct Listeners {
    listeners: RwLock<Vec<Arc<dyn ModelListener>>>,
}

impl Listeners {
    fn snapshot(&self) -> Vec<Arc<dyn ModelListener>> {
        self.listeners.read().clone()
    }

    fn rows_changed(&self, first: usize, last: usize) {
        for listener in self.snapshot() {
            listener.rows_changed(first, last);
        }
    }

    fn model_reset(&self) {
        for listener in self.snapshot() {
            listener.model_reset();
        }
    }
}

struct Binding {
    playlist: Arc<VirtualPlaylist>,
    subscription: SubscriptionId,
}

/// List model over a bound [`VirtualPlaylist`].
#[derive(Default)]
pub struct TrackListModel {
    listeners: Arc<Listeners>,
    binding: Mutex<Option<Binding>>,
    fetch_cursor: AtomicUsize,
}

impl TrackListModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn ModelListener>) {
        self.listeners.listeners.write().push(listener);
    }

    /// Bind to `playlist`, replacing any previous binding, and signal a reset.
    pub fn set_playlist(&self, playlist: Arc<VirtualPlaylist>) {
        let subscription = playlist.subscribe(forwarder(Arc::downgrade(&self.listeners)));
        let previous = self.binding.lock().replace(Binding {
            playlist,
            subscription,
        });
        if let Some(previous) = previous {
            previous.playlist.unsubscribe(previous.subscription);
        }

        self.fetch_cursor.store(0, Ordering::Relaxed);
        debug!(target: "list_model", "Bound playlist");
        self.listeners.model_reset();
    }

    /// Drop the binding and signal a reset.
    pub fn clear_playlist(&self) {
        let previous = self.binding.lock().take();
        if let Some(previous) = previous {
            previous.playlist.unsubscribe(previous.subscription);
            self.fetch_cursor.store(0, Ordering::Relaxed);
            self.listeners.model_reset();
        }
    }

    pub fn playlist(&self) -> Option<Arc<VirtualPlaylist>> {
        self.binding
            .lock()
            .as_ref()
            .map(|binding| Arc::clone(&binding.playlist))
    }

    pub fn row_count(&self) -> usize {
        self.playlist().map_or(0, |p| p.total_count())
    }

    /// Cell value, or `None` past the last row.
    ///
    /// Unloaded rows read as placeholders and preload around `row`.
    pub fn data(&self, row: usize, role: Role) -> Option<RoleValue> {
        let playlist = self.playlist()?;
        if row >= playlist.total_count() {
            return None;
        }

        match playlist.peek(row) {
            Some(track) => Some(role.value(&track)),
            None => {
                playlist.preload_around(row);
                Some(role.placeholder())
            }
        }
    }

    pub fn is_row_loaded(&self, row: usize) -> bool {
        self.playlist().is_some_and(|p| p.is_loaded(row))
    }

    pub fn preload_around(&self, row: usize) {
        if let Some(playlist) = self.playlist() {
            playlist.preload_around(row);
        }
    }

    /// More rows can arrive while the playlist is not fully loaded.
    pub fn can_fetch_more(&self) -> bool {
        self.playlist().is_some_and(|p| !p.is_fully_loaded())
    }

    /// Advance the fetch cursor by one batch and preload around it.
    ///
    /// The cursor wraps to 0 once it reaches the row count.
    pub fn fetch_more(&self) {
        let Some(playlist) = self.playlist() else {
            return;
        };
        let total = playlist.total_count();
        if total == 0 {
            return;
        }

        let batch = playlist.config().fetch_batch_size;
        let mut cursor = self.fetch_cursor.load(Ordering::Relaxed) + batch;
        if cursor >= total {
            cursor = 0;
        }
        self.fetch_cursor.store(cursor, Ordering::Relaxed);

        debug!(target: "list_model", cursor, batch, "Fetching more rows");
        playlist.preload_range(cursor, batch / 2);
    }

    pub fn fetch_cursor(&self) -> usize {
        self.fetch_cursor.load(Ordering::Relaxed)
    }

    /// Role names in declaration order.
    pub fn role_names(&self) -> Vec<&'static str> {
        Role::ALL.iter().map(|role| role.name()).collect()
    }
}

impl Drop for TrackListModel {
    fn drop(&mut self) {
        if let Some(binding) = self.binding.get_mut().take() {
            binding.playlist.unsubscribe(binding.subscription);
        }
    }
}

fn forwarder(listeners: Weak<Listeners>) -> impl Fn(&PlaylistEvent) + Send + Sync + 'static {
    move |event| {
        let Some(listeners) = listeners.upgrade() else {
            return;
        };
        match event {
            PlaylistEvent::RangeLoaded { start, end } => listeners.rows_changed(*start, *end),
            PlaylistEvent::Cleared => listeners.model_reset(),
            _ => {}
        }
    }
}
