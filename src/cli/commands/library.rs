//! Track store maintenance commands.

use rand::Rng;
use tokio::runtime::Runtime;
use tracing::info;

use super::{Cli, open_pool, resolve_settings};
use crate::db;
use crate::model::VirtualTrack;

const SEED_BATCH: usize = 500;
const TRACKS_PER_ALBUM: usize = 12;
const ALBUMS_PER_ARTIST: usize = 4;
const GENRES: [&str; 6] = ["Rock", "Jazz", "Electronic", "Folk", "Classical", "Hip-Hop"];

/// Insert `count` synthetic tracks
pub fn cmd_seed(rt: &Runtime, cli: &Cli, count: usize) -> anyhow::Result<()> {
    let (database, _) = resolve_settings(cli);

    rt.block_on(async {
        let pool = open_pool(database.as_ref()).await?;
        let existing = usize::try_from(db::count_tracks(&pool).await?).unwrap_or(0);

        let mut rng = rand::rng();
        let tracks: Vec<VirtualTrack> = (existing..existing + count)
            .map(|n| synthetic_track(n, &mut rng))
            .collect();

        let mut written = 0;
        for batch in tracks.chunks(SEED_BATCH) {
            written += db::insert_tracks(&pool, batch).await?;
            print!("\rSeeded {}/{} tracks...", written, count);
            use std::io::Write;
            std::io::stdout().flush()?;
        }
        println!();

        info!(target: "cli::seed", written, "Seed complete");
        println!("Store now holds {} tracks.", db::count_tracks(&pool).await?);
        Ok(())
    })
}

/// Print the number of stored tracks
pub fn cmd_count(rt: &Runtime, cli: &Cli) -> anyhow::Result<()> {
    let (database, _) = resolve_settings(cli);

    rt.block_on(async {
        let pool = open_pool(database.as_ref()).await?;
        println!("{}", db::count_tracks(&pool).await?);
        Ok(())
    })
}

/// Demo track number `n`, grouped into albums and artists.
fn synthetic_track<R: Rng + ?Sized>(n: usize, rng: &mut R) -> VirtualTrack {
    let album_index = n / TRACKS_PER_ALBUM;
    let artist_index = album_index / ALBUMS_PER_ARTIST;
    let track_number = (n % TRACKS_PER_ALBUM + 1) as i32;

    let artist = format!("Artist {:04}", artist_index + 1);
    let album = format!("Album {:05}", album_index + 1);
    let title = format!("Song {}", n + 1);
    let last_played = if rng.random_bool(0.3) {
        rng.random_range(1_500_000_000..1_750_000_000)
    } else {
        0
    };

    VirtualTrack {
        id: 0,
        file_path: format!("/music/{}/{}/{:02} - {}.flac", artist, album, track_number, title),
        title,
        artist: artist.clone(),
        album,
        album_artist: artist,
        genre: GENRES[artist_index % GENRES.len()].to_string(),
        year: 1960 + (album_index % 65) as i32,
        track_number,
        disc_number: 1,
        duration: rng.random_range(90..600),
        file_size: rng.random_range(2_000_000..60_000_000),
        play_count: rng.random_range(0..50),
        rating: rng.random_range(0..=5),
        last_played,
    }
}
