//! CLI command definitions and dispatch.
//!
//! Each subcommand group lives in its own submodule:
//! - `library`: seeding and counting the track store
//! - `browse`: reading rows and shuffle order through the virtual playlist
//! - `load`: full background load with progress
//! - `settings`: writing the config file

mod browse;
mod library;
mod load;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use tokio::runtime::Runtime;

use crate::config::{self, PlaylistConfig};
use crate::db;
use crate::playlist::{SqliteTrackSource, VirtualPlaylist};

pub use browse::{cmd_show, cmd_shuffle};
pub use library::{cmd_count, cmd_seed};
pub use load::cmd_load;
pub use settings::cmd_save_config;

/// Virtual playlist CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the track database (defaults to the configured library)
    #[arg(long, global = true, env = "VIRTUAL_PLAYLIST_DB")]
    pub db: Option<PathBuf>,

    /// Path to a config file (defaults to the OS config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Rows fetched per background load
    #[arg(long, global = true)]
    pub chunk_size: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Insert synthetic tracks for trying things out
    Seed {
        /// Number of tracks to insert
        #[arg(short, long, default_value_t = 1000)]
        count: usize,
    },
    /// Print the number of tracks in the store
    Count,
    /// Print a window of rows
    Show {
        /// First row to print
        #[arg(short, long, default_value_t = 0)]
        offset: usize,
        /// Number of rows to print
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },
    /// Load the whole playlist in the background, reporting progress
    Load,
    /// Generate a shuffle order and print its first entries
    Shuffle {
        /// Position to play first
        #[arg(short, long)]
        anchor: Option<usize>,
        /// Number of entries to print
        #[arg(short, long, default_value_t = 10)]
        count: usize,
    },
    /// Write the effective settings to the config file
    SaveConfig,
}

/// Run the selected subcommand.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;

    match &cli.command {
        Commands::Seed { count } => cmd_seed(&rt, cli, *count),
        Commands::Count => cmd_count(&rt, cli),
        Commands::Show {
            offset,
            limit,
            json,
        } => cmd_show(&rt, cli, *offset, *limit, *json),
        Commands::Load => cmd_load(&rt, cli),
        Commands::Shuffle { anchor, count } => cmd_shuffle(&rt, cli, *anchor, *count),
        Commands::SaveConfig => cmd_save_config(cli),
    }
}

/// Load the config file and apply command-line overrides.
fn resolve_settings(cli: &Cli) -> (Option<PathBuf>, PlaylistConfig) {
    let config = match &cli.config {
        Some(path) => config::load_from(path),
        None => config::load(),
    };

    let database = cli.db.clone().or(config.library.database);
    let mut playlist = config.playlist;
    if let Some(chunk_size) = cli.chunk_size {
        playlist.chunk_size = chunk_size;
    }
    (database, playlist.normalized())
}

async fn open_pool(database: Option<&PathBuf>) -> anyhow::Result<SqlitePool> {
    let url = db::db_url(database.map(PathBuf::as_path));
    db::init_db(&url)
        .await
        .with_context(|| format!("Failed to open database {}", url))
}

/// Open the store and build a playlist over it on `rt`.
fn open_playlist(
    rt: &Runtime,
    cli: &Cli,
    configure: impl FnOnce(&mut PlaylistConfig),
) -> anyhow::Result<Arc<VirtualPlaylist>> {
    let (database, mut playlist_config) = resolve_settings(cli);
    configure(&mut playlist_config);

    let pool = rt.block_on(open_pool(database.as_ref()))?;
    let source = Arc::new(SqliteTrackSource::new(pool));
    Ok(Arc::new(VirtualPlaylist::with_handle(
        source,
        playlist_config,
        rt.handle().clone(),
    )))
}

/// `seconds` as `m:ss`, or `h:mm:ss` past an hour.
pub(crate) fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let (hours, minutes, secs) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}
