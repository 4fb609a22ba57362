//! Full background load with progress reporting.

use std::io::Write;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use tokio::runtime::Runtime;
use tracing::{info, warn};

use super::{Cli, format_duration, open_playlist};
use crate::playlist::PlaylistEvent;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Load every row with background fill and report progress
pub fn cmd_load(rt: &Runtime, cli: &Cli) -> anyhow::Result<()> {
    let playlist = open_playlist(rt, cli, |config| config.auto_fill = true)?;

    let (tx, rx) = crossbeam_channel::unbounded();
    let subscription = playlist.subscribe(move |event| {
        let _ = tx.send(event.clone());
    });

    let started = Instant::now();
    let total = rt.block_on(playlist.load_all())?;
    println!("Loading {} tracks...", total);

    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(PlaylistEvent::Progress { loaded, total }) => {
                print!("\rLoaded {}/{} tracks", loaded, total);
                std::io::stdout().flush()?;
            }
            Ok(PlaylistEvent::Finished) => break,
            Ok(PlaylistEvent::Warning(message)) => {
                eprintln!("\nWarning: {}", message);
                break;
            }
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => {
                if !playlist.is_loading() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!(target: "cli::load", "Playlist event channel closed");
                break;
            }
        }
    }
    println!();
    playlist.unsubscribe(subscription);

    let loaded = playlist.loaded_count();
    info!(target: "cli::load", loaded, total, elapsed_ms = started.elapsed().as_millis() as u64, "Load finished");
    println!(
        "Loaded {} of {} tracks in {:.2?} ({} total play time)",
        loaded,
        total,
        started.elapsed(),
        format_duration(playlist.total_duration())
    );
    if !playlist.is_fully_loaded() {
        println!("Ranges loaded: {:?}", playlist.loaded_ranges());
    }
    Ok(())
}
