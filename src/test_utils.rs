//! Test utilities and fixtures for music-steward tests.
//!
//! This module provides common test helpers, in-memory stand-ins for the
//! catalog and scanner seams, and shell-script stand-ins for the external
//! tools to reduce boilerplate in tests.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::{temp_db, insert_mock_track};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (pool, _dir) = temp_db().await;
//!     let id = insert_mock_track(&pool, "/music/Test Album/01.flac").await;
//!     // ... test logic
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::catalog::{Catalog, GcStats};
use crate::db::NewTrack;
use crate::error::{Error, Result};
use crate::model::{Album, MediaFile};
use crate::scanner::{ScanStats, Scanner};
use crate::tags::TagDiff;

/// Creates a temporary database for testing.
///
/// The database is created in a temporary directory that is automatically
/// cleaned up when the returned `TempDir` is dropped. Migrations are run
/// automatically.
///
/// # Returns
///
/// A tuple of (connection pool, temp directory handle).
/// Keep the TempDir alive for the duration of your test.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.display());

    let pool = crate::db::init_db(&db_url)
        .await
        .expect("Failed to initialize test database");

    (pool, dir)
}

/// Inserts a mock track into the database and returns its ID.
///
/// The track belongs to "Test Artist" / "Test Album", and its parent
/// directory is recorded as an album folder.
pub async fn insert_mock_track(pool: &SqlitePool, path: &str) -> i64 {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let artist_id = crate::db::get_or_create_artist(&mut conn, "Test Artist")
        .await
        .expect("Failed to create artist");
    let album_id = crate::db::get_or_create_album(&mut conn, "Test Album", Some(artist_id))
        .await
        .expect("Failed to create album");
    if let Some(folder) = Path::new(path).parent() {
        crate::db::add_album_folder(&mut conn, album_id, folder)
            .await
            .expect("Failed to add album folder");
    }

    crate::db::upsert_track(
        &mut conn,
        &NewTrack {
            path: path.to_string(),
            title: "Test Track".to_string(),
            artist_id: Some(artist_id),
            album_id: Some(album_id),
            track_number: Some(1),
            duration: Some(180),
            ..Default::default()
        },
    )
    .await
    .expect("Failed to insert track")
}

// ============================================================================
// In-memory catalog
// ============================================================================

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    songs: BTreeMap<i64, MediaFile>,
    albums: BTreeMap<i64, Album>,
    failing_deletes: HashSet<i64>,
    fail_tag_edits: bool,
    edits: Vec<(i64, TagDiff)>,
    gc_runs: usize,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// [`Catalog`] kept in memory, with knobs for injecting failures.
#[derive(Default)]
pub struct MemoryCatalog {
    state: Mutex<MemoryState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_album(&self, title: &str, folders: Vec<PathBuf>) -> i64 {
        let mut state = self.state.lock();
        let id = state.allocate_id();
        state.albums.insert(
            id,
            Album {
                id,
                title: title.to_string(),
                folders,
                ..Default::default()
            },
        );
        id
    }

    /// Register a song at `path`; the file itself is not created.
    pub fn add_song(&self, album_id: Option<i64>, path: &Path) -> i64 {
        let mut state = self.state.lock();
        let id = state.allocate_id();
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        state.songs.insert(
            id,
            MediaFile {
                id,
                path: path.to_string_lossy().into_owned(),
                album_id,
                missing: false,
                title,
                artist: "Test Artist".to_string(),
                album: "Test Album".to_string(),
                album_artist: None,
                genre: None,
                year: None,
                track_number: None,
                disc_number: None,
                comment: None,
                duration: None,
            },
        );
        id
    }

    pub fn set_missing(&self, id: i64, missing: bool) {
        if let Some(song) = self.state.lock().songs.get_mut(&id) {
            song.missing = missing;
        }
    }

    /// Make deleting this song's record fail.
    pub fn fail_record_delete(&self, id: i64) {
        self.state.lock().failing_deletes.insert(id);
    }

    /// Make every `record_tag_edit` fail.
    pub fn fail_tag_edits(&self) {
        self.state.lock().fail_tag_edits = true;
    }

    pub fn song(&self, id: i64) -> Option<MediaFile> {
        self.state.lock().songs.get(&id).cloned()
    }

    pub fn contains_song(&self, id: i64) -> bool {
        self.state.lock().songs.contains_key(&id)
    }

    pub fn contains_album(&self, id: i64) -> bool {
        self.state.lock().albums.contains_key(&id)
    }

    /// Recorded tag edits, in call order.
    pub fn edits(&self) -> Vec<(i64, TagDiff)> {
        self.state.lock().edits.clone()
    }

    pub fn gc_runs(&self) -> usize {
        self.state.lock().gc_runs
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn get_media_file(&self, id: i64) -> Result<Option<MediaFile>> {
        Ok(self.song(id))
    }

    async fn list_media_files_by_album(&self, album_id: i64) -> Result<Vec<MediaFile>> {
        Ok(self
            .state
            .lock()
            .songs
            .values()
            .filter(|s| s.album_id == Some(album_id))
            .cloned()
            .collect())
    }

    async fn get_album(&self, id: i64) -> Result<Option<Album>> {
        Ok(self.state.lock().albums.get(&id).cloned())
    }

    async fn count_album_members(&self, album_id: i64) -> Result<i64> {
        let state = self.state.lock();
        Ok(state
            .songs
            .values()
            .filter(|s| s.album_id == Some(album_id))
            .count() as i64)
    }

    async fn count_files_under(&self, folder: &Path) -> Result<i64> {
        let state = self.state.lock();
        Ok(state
            .songs
            .values()
            .filter(|s| Path::new(&s.path).starts_with(folder) && Path::new(&s.path) != folder)
            .count() as i64)
    }

    async fn delete_media_file(&self, id: i64) -> Result<()> {
        let mut state = self.state.lock();
        if state.failing_deletes.contains(&id) {
            return Err(Error::Persistence(sqlx::Error::PoolClosed));
        }
        state.songs.remove(&id);
        Ok(())
    }

    async fn delete_album_record(&self, id: i64) -> Result<()> {
        self.state.lock().albums.remove(&id);
        Ok(())
    }

    async fn mark_missing(&self, id: i64) -> Result<()> {
        self.set_missing(id, true);
        Ok(())
    }

    async fn record_tag_edit(&self, id: i64, diff: &TagDiff) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_tag_edits || !state.songs.contains_key(&id) {
            return Err(Error::Persistence(sqlx::Error::RowNotFound));
        }
        state.edits.push((id, diff.clone()));
        Ok(())
    }

    async fn run_garbage_collection(&self) -> Result<GcStats> {
        let mut state = self.state.lock();
        state.gc_runs += 1;

        let referenced: HashSet<i64> = state.songs.values().filter_map(|s| s.album_id).collect();
        let before = state.albums.len();
        state.albums.retain(|id, _| referenced.contains(id));

        Ok(GcStats {
            albums_removed: (before - state.albums.len()) as u64,
            artists_removed: 0,
        })
    }
}

// ============================================================================
// Scanner stand-in
// ============================================================================

/// [`Scanner`] that records each call's `full_rescan` flag.
///
/// A gated scanner blocks every scan until [`release`](Self::release) hands
/// out a permit, or fails with `Cancelled` when the token fires first.
pub struct MockScanner {
    calls: Mutex<Vec<bool>>,
    gate: Semaphore,
}

impl Default for MockScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockScanner {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            gate: Semaphore::new(Semaphore::MAX_PERMITS),
        }
    }

    pub fn gated() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            gate: Semaphore::new(0),
        }
    }

    /// Let `n` more scans through.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn calls(&self) -> Vec<bool> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Scanner for MockScanner {
    async fn scan_all(&self, cancel: &CancellationToken, full_rescan: bool) -> Result<ScanStats> {
        self.calls.lock().push(full_rescan);
        tokio::select! {
            permit = self.gate.acquire() => {
                if let Ok(permit) = permit {
                    permit.forget();
                }
                Ok(ScanStats::default())
            }
            _ = cancel.cancelled() => Err(Error::Cancelled {
                operation: "scan".to_string(),
            }),
        }
    }
}

// ============================================================================
// External tool stand-ins (unix only)
// ============================================================================

/// Write an executable `sh` script named `name` into `dir`.
#[cfg(unix)]
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write fake tool");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("Failed to make fake tool executable");
    path
}

/// Rewrite tool that copies the `-i` input to the last argument and appends
/// each `-metadata` directive as a line.
#[cfg(unix)]
pub fn fake_ffmpeg(dir: &Path) -> PathBuf {
    fake_tool(
        dir,
        "ffmpeg",
        r#"in=""; meta=""; prev=""
for arg; do
  case "$prev" in
    -i) in="$arg" ;;
    -metadata) meta="$meta$arg
" ;;
  esac
  prev="$arg"; last="$arg"
done
cp "$in" "$last" && printf '%s' "$meta" >> "$last""#,
    )
}

/// Fetch tool that announces a `.webm` download, writes `<stem>.mp3` into
/// its working directory and announces that as the extraction result.
#[cfg(unix)]
pub fn fake_fetcher(dir: &Path, stem: &str) -> PathBuf {
    fake_tool(
        dir,
        "yt-dlp",
        &format!(
            r#"echo "[download] Destination: {stem}.webm"
printf 'audio' > "{stem}.mp3"
echo "[ExtractAudio] Destination: {stem}.mp3""#
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_db_creates_working_database() {
        let (pool, _dir) = temp_db().await;

        let files = crate::db::list_media_files(&pool).await.unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_insert_mock_track() {
        let (pool, _dir) = temp_db().await;

        let id = insert_mock_track(&pool, "/test/song.mp3").await;
        assert!(id > 0);

        let files = crate::db::list_media_files(&pool).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "/test/song.mp3");
    }

    #[tokio::test]
    async fn test_memory_catalog_gc_purges_empty_albums() {
        let catalog = MemoryCatalog::new();
        let kept = catalog.add_album("Kept", vec![]);
        let empty = catalog.add_album("Empty", vec![]);
        catalog.add_song(Some(kept), Path::new("/m/a.mp3"));

        let stats = catalog.run_garbage_collection().await.unwrap();
        assert_eq!(stats.albums_removed, 1);
        assert!(catalog.contains_album(kept));
        assert!(!catalog.contains_album(empty));
        assert_eq!(catalog.gc_runs(), 1);
    }
}
