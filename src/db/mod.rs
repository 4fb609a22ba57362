//! Database module backing the virtual playlist.
//!
//! Uses SQLx with SQLite for lightweight, embedded storage. Provides the
//! two queries the playlist needs (total count and an ordered page) plus
//! insertion helpers for seeding a library.
//!
//! # Canonical order
//!
//! Every page is returned ordered by artist, album, disc number, track
//! number and finally ID, so that `count` and successive `fetch_tracks`
//! calls describe one stable sequence.
//!
//! # Example
//!
//! ```ignore
//! use virtual_playlist::db::{init_db, fetch_tracks};
//!
//! let pool = init_db("sqlite:library.db").await?;
//! let first_page = fetch_tracks(&pool, 50, 0).await?;
//! ```

use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::model::{TrackRow, VirtualTrack};

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "virtual_playlist.db";

const TRACK_COLUMNS: &str = "id, file_path, title, artist, album, album_artist, genre, year, \
     track_number, disc_number, duration, file_size, play_count, rating, last_played";

const CANONICAL_ORDER: &str = "artist COLLATE NOCASE, album COLLATE NOCASE, disc_number, track_number, id";

/// Build a SQLite database URL from an optional path.
///
/// If no path is provided, uses [`DEFAULT_DB_NAME`] in the current directory.
pub fn db_url(path: Option<&std::path::Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file if it doesn't exist, establishes a connection
/// pool with up to 5 connections, and runs all pending migrations.
///
/// # Errors
///
/// Returns an error if:
/// - Database creation fails
/// - Connection cannot be established
/// - Migration fails
pub async fn init_db(db_url: &str) -> Result<SqlitePool, sqlx::Error> {
    if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
        sqlx::Sqlite::create_database(db_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::debug!(target: "db", url = db_url, "Database ready");

    Ok(pool)
}

/// Total number of tracks in canonical order.
pub async fn count_tracks(pool: &SqlitePool) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tracks")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

/// Fetch up to `limit` tracks starting at `offset` in canonical order.
pub async fn fetch_tracks(
    pool: &SqlitePool,
    limit: i64,
    offset: i64,
) -> sqlx::Result<Vec<VirtualTrack>> {
    let sql = format!(
        "SELECT {} FROM tracks ORDER BY {} LIMIT ? OFFSET ?",
        TRACK_COLUMNS, CANONICAL_ORDER
    );
    let rows = sqlx::query_as::<_, TrackRow>(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(VirtualTrack::from).collect())
}

/// Insert or update a track record.
///
/// Uses SQLite's UPSERT keyed on the file path. The `id` field of the
/// given track is ignored; the stored ID is returned.
pub async fn insert_track(pool: &SqlitePool, track: &VirtualTrack) -> sqlx::Result<i64> {
    let mut conn = pool.acquire().await?;
    upsert(&mut conn, track).await
}

/// Insert multiple tracks in a single transaction.
///
/// Returns the number of tracks written.
pub async fn insert_tracks(pool: &SqlitePool, tracks: &[VirtualTrack]) -> sqlx::Result<usize> {
    let mut tx = pool.begin().await?;
    for track in tracks {
        upsert(&mut tx, track).await?;
    }
    tx.commit().await?;
    Ok(tracks.len())
}

async fn upsert(conn: &mut sqlx::SqliteConnection, track: &VirtualTrack) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO tracks (file_path, title, artist, album, album_artist, genre, year,
                            track_number, disc_number, duration, file_size, play_count,
                            rating, last_played)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(file_path) DO UPDATE SET
            title = excluded.title,
            artist = excluded.artist,
            album = excluded.album,
            album_artist = excluded.album_artist,
            genre = excluded.genre,
            year = excluded.year,
            track_number = excluded.track_number,
            disc_number = excluded.disc_number,
            duration = excluded.duration,
            file_size = excluded.file_size
        RETURNING id
        "#,
    )
    .bind(&track.file_path)
    .bind(&track.title)
    .bind(&track.artist)
    .bind(&track.album)
    .bind(&track.album_artist)
    .bind(&track.genre)
    .bind(track.year)
    .bind(track.track_number)
    .bind(track.disc_number)
    .bind(track.duration)
    .bind(track.file_size)
    .bind(track.play_count)
    .bind(track.rating)
    .bind((track.last_played > 0).then_some(track.last_played))
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.0)
}
