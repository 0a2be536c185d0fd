//! Music Steward - keeps a music library's files and catalog in step.
//!
//! Edits tags through an out-of-process rewrite, deletes songs and albums
//! across disk and database, and fetches new media into the library followed
//! by a background rescan. Everything is driven from the command line.

pub mod background;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod db;
pub mod deletion;
pub mod error;
pub mod ingest;
pub mod library;
pub mod metadata;
pub mod model;
pub mod mutation;
pub mod outcome;
pub mod path_locks;
pub mod rewriter;
pub mod scanner;
pub mod tags;
#[cfg(test)]
pub mod test_utils;
pub mod tools;

use clap::Parser;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    let crate_level: Directive = "music_steward=info".parse()?;
    let background_level: Directive = "background=info".parse()?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(
            EnvFilter::from_default_env()
                .add_directive(crate_level)
                .add_directive(background_level),
        )
        .init();

    cli::run_command(&args)
}
