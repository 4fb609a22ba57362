//! Config file maintenance.

use std::path::PathBuf;

use super::{Cli, resolve_settings};
use crate::config::{self, Config, LibraryConfig};

/// Write the effective settings (config file plus flags) back to the config file
pub fn cmd_save_config(cli: &Cli) -> anyhow::Result<()> {
    let (database, playlist) = resolve_settings(cli);
    let config = Config {
        playlist,
        library: LibraryConfig { database },
    };

    let path: Option<PathBuf> = match &cli.config {
        Some(path) => {
            config::save_to(&config, path)?;
            Some(path.clone())
        }
        None => {
            config::save(&config)?;
            config::config_path()
        }
    };

    match path {
        Some(path) => println!("Saved config to {}", path.display()),
        None => println!("Saved config"),
    }
    Ok(())
}
