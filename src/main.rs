//! Virtual Playlist command-line front end.

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use virtual_playlist::cli;

/// Log filter when `RUST_LOG` is unset; covers the crate's explicit targets.
const DEFAULT_FILTER: &str = "warn,virtual_playlist=info,playlist=info,list_model=info,config=info,db=info,cli=info";

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
        .init();

    cli::run_command(&args)
}
