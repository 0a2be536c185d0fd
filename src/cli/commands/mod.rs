//! CLI command definitions and dispatch.
//!
//! This module provides the command-line interface for Music Steward.
//! Each group of subcommands is implemented in its own submodule:
//! - `library`: scanning, listing and garbage collection
//! - `edit`: song and album tag edits
//! - `delete`: song and album deletion
//! - `ingest`: fetching new media
//! - `tools`: external tool checks

mod delete;
mod edit;
mod ingest;
mod library;
mod tools;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::background::{BackgroundDispatcher, BackgroundJob, DispatcherEvent};
use crate::config::{self, Config};
use crate::db::{self, SqliteCatalog};
use crate::deletion::DeletionCascade;
use crate::ingest::IngestCoordinator;
use crate::library::LibraryScanner;
use crate::mutation::MutationFacade;
use crate::path_locks::PathLocks;
use crate::rewriter::MetadataRewriter;

pub use delete::{cmd_delete_album, cmd_delete_song};
pub use edit::{cmd_edit_album, cmd_edit_song};
pub use ingest::cmd_ingest;
pub use library::{cmd_gc, cmd_list, cmd_scan};
pub use tools::{cmd_check_tools, cmd_init_config};

/// Music Steward CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: OS config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Catalog database path
    #[arg(long, global = true, env = "MUSIC_STEWARD_DB")]
    pub db: Option<PathBuf>,

    /// Library root directory
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile the catalog with the library on disk
    Scan {
        /// Re-read every file, not only changed ones
        #[arg(long)]
        full: bool,
    },
    /// List songs in the catalog
    List {
        /// Only songs of this album
        #[arg(long)]
        album: Option<i64>,
    },
    /// Rewrite tags of one song
    EditSong {
        id: i64,
        /// Tag assignment, e.g. --set title="New Title" (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE", required = true)]
        set: Vec<String>,
    },
    /// Rewrite tags of every song on an album
    EditAlbum {
        id: i64,
        /// Tag assignment, e.g. --set name="Album" (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE", required = true)]
        set: Vec<String>,
    },
    /// Delete a song's file and catalog record
    DeleteSong { id: i64 },
    /// Delete an album: songs, record and folders
    DeleteAlbum { id: i64 },
    /// Fetch media from a URL into the library
    Ingest {
        url: String,
        /// Subdirectory of the library root to fetch into
        #[arg(long)]
        into: Option<PathBuf>,
    },
    /// Purge albums and artists nothing references
    Gc,
    /// Check if the external tools are installed
    CheckTools,
    /// Write a default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Everything a command needs, wired from config and flags.
pub struct Session {
    pub config: Config,
    pub root: PathBuf,
    pub pool: SqlitePool,
    pub catalog: Arc<SqliteCatalog>,
    pub scanner: Arc<LibraryScanner>,
    pub dispatcher: BackgroundDispatcher,
    pub facade: MutationFacade,
    /// Cancelled on Ctrl-C
    pub cancel: CancellationToken,
    events: mpsc::Receiver<DispatcherEvent>,
}

impl Session {
    /// Open the catalog and start the background dispatcher.
    pub async fn open(cli: &Cli, config: Config) -> anyhow::Result<Self> {
        let root = match cli.root.clone().or_else(|| config.library.root.clone()) {
            Some(root) => root,
            None => std::env::current_dir().context("Could not determine working directory")?,
        };
        let db_path = cli.db.clone().or_else(|| config.library.database.clone());
        let url = db::db_url(db_path.as_deref());
        let pool = db::init_db(&url)
            .await
            .with_context(|| format!("Failed to open catalog {}", url))?;
        tracing::debug!(db = %url, root = %root.display(), "Session opened");

        let catalog = Arc::new(SqliteCatalog::new(pool.clone()));
        let scanner = Arc::new(LibraryScanner::new(pool.clone(), root.clone()));
        let (events_tx, events) = mpsc::channel(config.background.queue_capacity.max(1) + 1);
        let dispatcher = BackgroundDispatcher::start(
            scanner.clone(),
            catalog.clone(),
            config.background.clone(),
            Some(events_tx),
        );

        let locks = PathLocks::new();
        let facade = MutationFacade::new(
            catalog.clone(),
            MetadataRewriter::new(config.tools.ffmpeg.clone(), locks.clone()),
            DeletionCascade::new(
                catalog.clone(),
                locks,
                root.clone(),
                config.mutation.orphan_policy,
                dispatcher.handle(),
            ),
            IngestCoordinator::new(
                config.tools.fetcher.clone(),
                root.clone(),
                config.ingest.clone(),
                dispatcher.handle(),
            ),
        )
        .with_edit_concurrency(config.mutation.edit_concurrency);

        Ok(Self {
            config,
            root,
            pool,
            catalog,
            scanner,
            dispatcher,
            facade,
            cancel: interrupt_token(),
            events,
        })
    }

    /// Wait for queued background work (or cancel it after Ctrl-C), report
    /// how it went, then close the pool.
    pub async fn close(mut self) {
        if self.cancel.is_cancelled() {
            self.dispatcher.abort().await;
        } else {
            self.dispatcher.shutdown().await;
        }
        while let Ok(event) = self.events.try_recv() {
            eprintln!("{}", describe_event(&event));
        }
        self.pool.close().await;
    }
}

/// One-line summary of a finished background job.
fn describe_event(event: &DispatcherEvent) -> String {
    let name = |job: &BackgroundJob| match job {
        BackgroundJob::Rescan { full: true } => "Full library rescan",
        BackgroundJob::Rescan { full: false } => "Library rescan",
        BackgroundJob::CollectGarbage => "Garbage collection",
    };
    match event {
        DispatcherEvent::JobFinished(job) => format!("{} finished", name(job)),
        DispatcherEvent::JobFailed { job, error } => format!("{} failed: {}", name(job), error),
    }
}

/// A token cancelled on Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, cancelling...");
            trigger.cancel();
        }
    });
    token
}

/// Echo captured tool output to stderr before handing the error on.
pub fn report_tool_failure(error: crate::error::Error) -> anyhow::Error {
    if let Some(output) = error.tool_output().filter(|o| !o.trim().is_empty()) {
        eprintln!("--- tool output ---\n{}", output.trim_end());
    }
    error.into()
}

/// Print `value` as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(path: Option<&Path>) -> Config {
    match path {
        Some(path) => config::load_from(path),
        None => config::load(),
    }
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    if let Commands::InitConfig { force } = cli.command {
        return cmd_init_config(cli.config.as_deref(), force);
    }

    let rt = Runtime::new()?;
    let config = load_config(cli.config.as_deref());

    rt.block_on(async {
        // Tool checks don't need a catalog.
        if let Commands::CheckTools = cli.command {
            return cmd_check_tools(&config).await;
        }

        let session = Session::open(cli, config).await?;
        let result = dispatch(&session, cli).await;
        session.close().await;
        result
    })
}

async fn dispatch(session: &Session, cli: &Cli) -> anyhow::Result<()> {
    let json = cli.json;
    match &cli.command {
        Commands::Scan { full } => cmd_scan(session, *full, json).await,
        Commands::List { album } => cmd_list(session, *album, json).await,
        Commands::EditSong { id, set } => cmd_edit_song(session, *id, set, json).await,
        Commands::EditAlbum { id, set } => cmd_edit_album(session, *id, set, json).await,
        Commands::DeleteSong { id } => cmd_delete_song(session, *id, json).await,
        Commands::DeleteAlbum { id } => cmd_delete_album(session, *id, json).await,
        Commands::Ingest { url, into } => cmd_ingest(session, url, into.as_deref(), json).await,
        Commands::Gc => cmd_gc(session, json).await,
        Commands::CheckTools => cmd_check_tools(&session.config).await,
        Commands::InitConfig { force } => cmd_init_config(cli.config.as_deref(), *force),
    }
}
