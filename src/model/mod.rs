//! Core data model for the virtual playlist.
//!
//! Defines [`VirtualTrack`], the value record held in each loaded playlist
//! slot, and [`TrackRow`], its nullable database mapping.
//!
//! # Database Schema
//!
//! Both map to the flat `tracks` table. Optional columns that are `NULL`
//! in the database default to zero/empty when converted into a record.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single track as presented by the virtual playlist.
///
/// Records are immutable value copies: a later load of the same position
/// replaces the record, it is never merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualTrack {
    /// Database ID (0 for the sentinel)
    pub id: i64,
    /// Absolute file path
    pub file_path: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_artist: String,
    pub genre: String,
    /// Release year (0 = unknown)
    pub year: i32,
    pub track_number: i32,
    pub disc_number: i32,
    /// Duration in seconds
    pub duration: i64,
    /// File size in bytes
    pub file_size: i64,
    pub play_count: i32,
    pub rating: i32,
    /// Unix timestamp in seconds (0 = never played)
    pub last_played: i64,
}

impl VirtualTrack {
    /// The "no data" record returned for unloaded or out-of-range positions.
    pub fn invalid() -> Self {
        Self::default()
    }

    /// A record is valid iff it has a positive ID and a file path.
    pub fn is_valid(&self) -> bool {
        self.id > 0 && !self.file_path.is_empty()
    }
}

/// Raw `tracks` row with nullable columns.
#[derive(Debug, Clone, FromRow)]
pub struct TrackRow {
    pub id: i64,
    pub file_path: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i64>,
    pub track_number: Option<i64>,
    pub disc_number: Option<i64>,
    pub duration: Option<i64>,
    pub file_size: Option<i64>,
    pub play_count: Option<i64>,
    pub rating: Option<i64>,
    pub last_played: Option<i64>,
}

impl From<TrackRow> for VirtualTrack {
    fn from(row: TrackRow) -> Self {
        Self {
            id: row.id,
            file_path: row.file_path,
            title: row.title.unwrap_or_default(),
            artist: row.artist.unwrap_or_default(),
            album: row.album.unwrap_or_default(),
            album_artist: row.album_artist.unwrap_or_default(),
            genre: row.genre.unwrap_or_default(),
            year: narrow(row.year),
            track_number: narrow(row.track_number),
            disc_number: narrow(row.disc_number),
            duration: row.duration.unwrap_or_default(),
            file_size: row.file_size.unwrap_or_default(),
            play_count: narrow(row.play_count),
            rating: narrow(row.rating),
            last_played: row.last_played.unwrap_or_default(),
        }
    }
}

/// SQLite integers are 64-bit; out-of-range values collapse to 0.
fn narrow(value: Option<i64>) -> i32 {
    value.and_then(|v| i32::try_from(v).ok()).unwrap_or_default()
}
