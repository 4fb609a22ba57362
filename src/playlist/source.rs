//! Backing-store collaborator for the virtual playlist.
//!
//! The cache never talks to a database directly. It asks a [`TrackSource`]
//! for the total count and for ordered pages, which keeps it testable with
//! an in-memory source and lets any ordered record store back it.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::db;
use crate::error::{Result, ResultExt};
use crate::model::VirtualTrack;

/// An ordered record store.
///
/// `count` must stay stable for the duration of one `load_all` cycle, and
/// `fetch` must page through the same canonical order `count` describes.
#[async_trait]
pub trait TrackSource: Send + Sync {
    /// Total number of records in canonical order.
    async fn count(&self) -> Result<usize>;

    /// Up to `limit` records starting at `offset`, in canonical order.
    async fn fetch(&self, limit: usize, offset: usize) -> Result<Vec<VirtualTrack>>;
}

/// [`TrackSource`] over the SQLite `tracks` table.
///
/// Holds a pool handle; each call checks a connection out of the pool for
/// the duration of the query.
#[derive(Debug, Clone)]
pub struct SqliteTrackSource {
    pool: SqlitePool,
}

impl SqliteTrackSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl TrackSource for SqliteTrackSource {
    async fn count(&self) -> Result<usize> {
        let count = db::count_tracks(&self.pool)
            .await
            .with_context("counting tracks")?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn fetch(&self, limit: usize, offset: usize) -> Result<Vec<VirtualTrack>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        db::fetch_tracks(&self.pool, limit, offset)
            .await
            .with_context(format!("fetching {} tracks at offset {}", limit, offset))
    }
}
