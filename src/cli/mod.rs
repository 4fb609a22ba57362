//! Command-line interface for virtual-playlist.
//!
//! Seeds and inspects a track store and drives a [`VirtualPlaylist`]
//! against it from the terminal.
//!
//! [`VirtualPlaylist`]: crate::playlist::VirtualPlaylist

mod commands;

pub use commands::{Cli, Commands, run_command};
