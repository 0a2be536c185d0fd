//! Command-line interface for music-steward.
//!
//! Exposes every mutation (edit, delete, ingest) plus scanning, listing,
//! garbage collection and tool checks. Library code returns the typed
//! [`crate::error::Error`]; commands surface it through `anyhow`.

mod commands;

pub use commands::{Cli, Commands, run_command};
