//! Cascading deletion of songs and albums.
//!
//! Files go first, catalog records second. For a single song a failed file
//! removal keeps the record, so the catalog never forgets a file that is
//! still on disk. For an album every song is attempted: file failures are
//! recorded per song, but a failed record deletion stops the whole operation
//! because the catalog would otherwise be left in an unknown shape.
//!
//! After the songs, the album record, its folders and finally the orphaned
//! albums and artists (via garbage collection) are cleaned up. These late
//! steps are best-effort and only logged. A folder that still holds songs of
//! another album is left in place.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::background::{BackgroundJob, DispatcherHandle};
use crate::catalog::{Catalog, GcStats};
use crate::config::OrphanPolicy;
use crate::error::{Error, Result, ResultExt};
use crate::outcome::{BulkSummary, MutationOutcome, TargetOutcome};
use crate::path_locks::PathLocks;

/// What happened to the file of a deleted song.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRemoval {
    Removed,
    AlreadyAbsent,
}

/// Result of [`DeletionCascade::delete_song`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SongDeletion {
    pub id: i64,
    pub path: PathBuf,
    pub file: FileRemoval,
    pub album_id: Option<i64>,
    /// The parent album has no songs left
    pub album_orphaned: bool,
    /// Garbage collection was queued by the orphan policy
    pub gc_scheduled: bool,
}

/// Result of [`DeletionCascade::delete_album`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlbumDeletion {
    pub album_id: i64,
    /// Disk outcome per song, in catalog order
    pub songs: BulkSummary,
    pub album_record_removed: bool,
    pub folders_removed: Vec<PathBuf>,
    pub gc: Option<GcStats>,
}

/// Deletes songs and albums from disk and catalog.
#[derive(Clone)]
pub struct DeletionCascade {
    catalog: Arc<dyn Catalog>,
    locks: PathLocks,
    library_root: PathBuf,
    orphan_policy: OrphanPolicy,
    jobs: DispatcherHandle,
}

impl DeletionCascade {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        locks: PathLocks,
        library_root: impl Into<PathBuf>,
        orphan_policy: OrphanPolicy,
        jobs: DispatcherHandle,
    ) -> Self {
        Self {
            catalog,
            locks,
            library_root: library_root.into(),
            orphan_policy,
            jobs,
        }
    }

    /// Delete one song's file, then its record.
    pub async fn delete_song(&self, song_id: i64) -> Result<SongDeletion> {
        let song = self
            .catalog
            .get_media_file(song_id)
            .await?
            .ok_or_else(|| Error::not_found("song", song_id))?;
        let path = song.path().to_path_buf();

        let file = {
            let _guard = self.locks.lock(&path).await;
            let file = remove_file(&path).await?;
            self.catalog.delete_media_file(song_id).await?;
            file
        };
        tracing::info!(id = song_id, path = %path.display(), ?file, "Song deleted");

        let mut album_orphaned = false;
        let mut gc_scheduled = false;
        if let Some(album_id) = song.album_id {
            match self.catalog.count_album_members(album_id).await {
                Ok(0) => {
                    album_orphaned = true;
                    tracing::info!(album_id, "Album has no songs left");
                    gc_scheduled = self.apply_orphan_policy();
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(album_id, error = %e, "Could not count remaining album songs");
                }
            }
        }

        Ok(SongDeletion {
            id: song_id,
            path,
            file,
            album_id: song.album_id,
            album_orphaned,
            gc_scheduled,
        })
    }

    /// Delete every song of an album, then the album and its folders.
    pub async fn delete_album(&self, album_id: i64) -> Result<AlbumDeletion> {
        let album = self
            .catalog
            .get_album(album_id)
            .await?
            .ok_or_else(|| Error::not_found("album", album_id))?;
        let songs = self.catalog.list_media_files_by_album(album_id).await?;
        tracing::info!(album_id, songs = songs.len(), title = %album.title, "Deleting album");

        let mut outcomes = Vec::with_capacity(songs.len());
        for song in songs {
            let path = song.path().to_path_buf();
            let _guard = self.locks.lock(&path).await;

            let outcome = if song.missing {
                MutationOutcome::skipped("missing")
            } else {
                match remove_file(&path).await {
                    Ok(FileRemoval::Removed) => MutationOutcome::Succeeded,
                    Ok(FileRemoval::AlreadyAbsent) => MutationOutcome::skipped("missing"),
                    Err(e) => {
                        tracing::warn!(id = song.id, path = %path.display(), error = %e, "Failed to delete song file");
                        MutationOutcome::failed(&e)
                    }
                }
            };

            self.catalog
                .delete_media_file(song.id)
                .await
                .with_context(format!("deleting song {} of album {}", song.id, album_id))?;

            outcomes.push(TargetOutcome {
                id: song.id,
                path,
                outcome,
            });
        }

        let album_record_removed = match self.catalog.delete_album_record(album_id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(album_id, error = %e, "Failed to delete album record, leaving it to garbage collection");
                false
            }
        };

        let mut folders_removed = Vec::new();
        for folder in &album.folders {
            if self.remove_folder(folder).await {
                folders_removed.push(folder.clone());
            }
        }

        let gc = match self.catalog.run_garbage_collection().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::warn!(error = %e, "Garbage collection after album delete failed");
                None
            }
        };

        let songs = BulkSummary::from_outcomes(outcomes);
        tracing::info!(
            album_id,
            removed = songs.succeeded,
            skipped = songs.skipped,
            failed = songs.failed,
            folders = folders_removed.len(),
            "Album deleted"
        );

        Ok(AlbumDeletion {
            album_id,
            songs,
            album_record_removed,
            folders_removed,
            gc,
        })
    }

    /// Queue garbage collection if the policy asks for it. The delete does
    /// not wait for the pass.
    fn apply_orphan_policy(&self) -> bool {
        match self.orphan_policy {
            OrphanPolicy::Deferred => false,
            OrphanPolicy::Immediate => self.jobs.submit(BackgroundJob::CollectGarbage),
        }
    }

    /// Remove an album folder recursively. Returns whether it was removed.
    async fn remove_folder(&self, folder: &Path) -> bool {
        if !is_within_root(folder, &self.library_root) {
            tracing::warn!(
                folder = %folder.display(),
                root = %self.library_root.display(),
                "Refusing to remove folder outside the library"
            );
            return false;
        }

        // Songs of other albums can share a folder (singles fetched into one
        // directory); their files must survive.
        match self.catalog.count_files_under(folder).await {
            Ok(0) => {}
            Ok(remaining) => {
                tracing::info!(
                    folder = %folder.display(),
                    remaining,
                    "Keeping album folder, other songs still live in it"
                );
                return false;
            }
            Err(e) => {
                tracing::warn!(folder = %folder.display(), error = %e, "Could not check folder for other songs, keeping it");
                return false;
            }
        }

        match tokio::fs::remove_dir_all(folder).await {
            Ok(()) => {
                tracing::debug!(folder = %folder.display(), "Album folder removed");
                true
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!(folder = %folder.display(), error = %e, "Failed to remove album folder");
                false
            }
        }
    }
}

/// Remove a file; an already absent file is not an error.
async fn remove_file(path: &Path) -> Result<FileRemoval> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(FileRemoval::Removed),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(FileRemoval::AlreadyAbsent),
        Err(e) => Err(Error::file_delete(path, e)),
    }
}

/// True if `folder` lies strictly below `root` without `..` components.
fn is_within_root(folder: &Path, root: &Path) -> bool {
    if folder
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return false;
    }
    folder.starts_with(root) && folder != root
}
