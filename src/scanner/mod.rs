//! Library scanning seam and directory walk.
//!
//! [`Scanner`] is what the mutation components invoke to reconcile the catalog
//! with the disk (after an ingest, for example). [`scan`] is the directory
//! walk the bundled [`crate::library::LibraryScanner`] is built on.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::Stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::error::Result;

/// Totals reported by a scan pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    /// Files read and upserted
    pub updated: usize,
    /// Files skipped because they had not changed
    pub unchanged: usize,
    /// Catalog entries whose file was not found
    pub missing: usize,
    /// Files that could not be read or stored
    pub errors: usize,
}

/// Something that can reconcile the catalog with the library on disk.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Walk the whole library. With `full_rescan` every file is re-read,
    /// otherwise unchanged files are skipped.
    async fn scan_all(&self, cancel: &CancellationToken, full_rescan: bool) -> Result<ScanStats>;
}

/// Check if a path has an audio file extension (case-insensitive).
pub fn is_audio_file(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());
    matches!(ext.as_deref(), Some("mp3" | "flac" | "ogg" | "m4a" | "wav" | "opus"))
}

/// Scans the given root directory recursively for audio files.
///
/// Returns a Stream of PathBufs.
pub fn scan(root: PathBuf) -> impl Stream<Item = PathBuf> {
    let (tx, rx) = mpsc::channel(100);

    // Spawn a blocking task to perform the synchronous file system traversal
    tokio::task::spawn_blocking(move || {
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() && is_audio_file(entry.path()) {
                // If the receiver is dropped, blocking_send errors and we stop.
                if tx.blocking_send(entry.path().to_path_buf()).is_err() {
                    break;
                }
            }
        }
    });

    // Convert the mpsc Receiver into a Stream
    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|path| (path, rx))
    })
}
