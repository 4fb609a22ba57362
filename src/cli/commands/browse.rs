//! Read rows and shuffle order through the virtual playlist.

use std::ops::Range;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::runtime::Runtime;

use super::{Cli, format_duration, open_playlist};
use crate::list_model::{Role, RoleValue, TrackListModel};
use crate::model::VirtualTrack;
use crate::playlist::VirtualPlaylist;

/// Print rows `offset..offset + limit`
pub fn cmd_show(
    rt: &Runtime,
    cli: &Cli,
    offset: usize,
    limit: usize,
    json: bool,
) -> anyhow::Result<()> {
    let playlist = open_playlist(rt, cli, |_| {})?;
    let model = TrackListModel::new();
    model.set_playlist(Arc::clone(&playlist));

    let total = rt.block_on(playlist.load_all())?;
    let Some(rows) = row_window(offset, limit, total) else {
        println!("No rows at offset {} ({} tracks).", offset, total);
        return Ok(());
    };
    let end = rows.end;

    // Supersedes the first chunk from load_all
    playlist.request_range(offset, rows.len());
    rt.block_on(playlist.wait_until_idle());

    if json {
        let rows: Vec<VirtualTrack> = (offset..end).filter_map(|row| playlist.peek(row)).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!(
        "{:>7}  {:<30}  {:<20}  {:<24}  {:>7}  {}",
        "#", "Title", "Artist", "Album", "Length", "Last played"
    );
    for row in offset..end {
        let cell = |role: Role| model.data(row, role).unwrap_or(RoleValue::Integer(0));
        let integer = |role: Role| cell(role).as_integer().unwrap_or(0);
        println!(
            "{:>7}  {:<30}  {:<20}  {:<24}  {:>7}  {}",
            row,
            truncate(&cell(Role::Title).to_string(), 30),
            truncate(&cell(Role::Artist).to_string(), 20),
            truncate(&cell(Role::Album).to_string(), 24),
            format_duration(integer(Role::Duration)),
            format_last_played(integer(Role::LastPlayed)),
        );
    }
    println!(
        "Rows {}..{} of {} ({} loaded)",
        offset,
        end - 1,
        total,
        playlist.loaded_count()
    );
    Ok(())
}

/// Print the first `count` entries of a fresh shuffle order
pub fn cmd_shuffle(
    rt: &Runtime,
    cli: &Cli,
    anchor: Option<usize>,
    count: usize,
) -> anyhow::Result<()> {
    let playlist = open_playlist(rt, cli, |_| {})?;
    let total = rt.block_on(playlist.load_all())?;
    if total == 0 {
        println!("No tracks.");
        return Ok(());
    }
    if let Some(anchor) = anchor.filter(|&a| a >= total) {
        println!("Anchor {} is out of range, ignoring it.", anchor);
    }

    playlist.generate_shuffle(anchor);
    let order = playlist.shuffle_order();
    for (step, &position) in order.iter().take(count).enumerate() {
        let track = fetch_position(rt, &playlist, position);
        println!(
            "{:>4}. [{:>7}] {} - {}",
            step + 1,
            position,
            track.artist,
            track.title
        );
    }
    Ok(())
}

/// Load a single position and return it.
fn fetch_position(rt: &Runtime, playlist: &VirtualPlaylist, position: usize) -> VirtualTrack {
    if !playlist.is_loaded(position) {
        playlist.request_range(position, 1);
        rt.block_on(playlist.wait_until_idle());
    }
    playlist.peek(position).unwrap_or_default()
}

/// Rows to print, or `None` when the window is empty.
fn row_window(offset: usize, limit: usize, total: usize) -> Option<Range<usize>> {
    if limit == 0 || offset >= total {
        return None;
    }
    Some(offset..offset.saturating_add(limit).min(total))
}

fn format_last_played(timestamp: i64) -> String {
    if timestamp <= 0 {
        return "never".to_string();
    }
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "?".to_string())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(width.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}
