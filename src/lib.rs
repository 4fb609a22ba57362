//! Virtual Playlist - a lazily loaded, windowed view over a large track store.
//!
//! The core is [`playlist::VirtualPlaylist`], which sizes itself from the
//! store's row count and fills fixed-size chunks in the background as rows
//! are requested. [`list_model::TrackListModel`] adapts it to the row/role
//! shape list views expect, and [`cli`] drives both from the terminal.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod list_model;
pub mod model;
pub mod playlist;
#[cfg(test)]
pub mod test_utils;
