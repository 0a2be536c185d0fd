//! The bundled library scanner.
//!
//! Walks the library root, reads tags from new or changed files, upserts them
//! into the catalog and flags catalog entries whose file has disappeared.
//! Rewrite temp files (`*.tmp.<ext>`) are never catalogued.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use futures::StreamExt;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::db::{self, NewTrack};
use crate::error::{Error, Result, ResultExt};
use crate::metadata;
use crate::rewriter::is_temp_path;
use crate::scanner::{self, ScanStats, Scanner};

/// Scanner backed by the SQLite catalog.
#[derive(Debug, Clone)]
pub struct LibraryScanner {
    pool: SqlitePool,
    root: PathBuf,
}

impl LibraryScanner {
    pub fn new(pool: SqlitePool, root: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            root: root.into(),
        }
    }
}

#[async_trait]
impl Scanner for LibraryScanner {
    async fn scan_all(&self, cancel: &CancellationToken, full_rescan: bool) -> Result<ScanStats> {
        tracing::info!(root = %self.root.display(), full_rescan, "Library scan started");

        let known: HashMap<String, (i64, Option<i64>)> = db::get_track_stamps(&self.pool)
            .await
            .with_context("loading known tracks")?
            .into_iter()
            .map(|(id, path, modified_at)| (path, (id, modified_at)))
            .collect();

        let mut stats = ScanStats::default();
        let mut seen: HashSet<String> = HashSet::new();

        let stream = scanner::scan(self.root.clone());
        let mut stream = std::pin::pin!(stream);

        while let Some(path) = stream.next().await {
            if cancel.is_cancelled() {
                tracing::info!("Library scan cancelled");
                return Err(Error::Cancelled {
                    operation: "library scan".to_string(),
                });
            }
            if is_temp_path(&path) {
                continue;
            }

            let key = path.to_string_lossy().into_owned();
            seen.insert(key.clone());

            let modified_at = modified_secs(&path);
            let recorded = known.get(&key).and_then(|(_, stamp)| *stamp);
            if !full_rescan && modified_at.is_some() && recorded == modified_at {
                stats.unchanged += 1;
                continue;
            }

            match index_file(&self.pool, &path, modified_at).await {
                Ok(_) => stats.updated += 1,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to index file");
                    stats.errors += 1;
                }
            }
        }

        for (path, (id, _)) in &known {
            if Path::new(path).starts_with(&self.root) && !seen.contains(path) {
                db::set_track_missing(&self.pool, *id, true)
                    .await
                    .with_context(format!("flagging {} as missing", path))?;
                stats.missing += 1;
            }
        }

        tracing::info!(
            updated = stats.updated,
            unchanged = stats.unchanged,
            missing = stats.missing,
            errors = stats.errors,
            "Library scan finished"
        );
        Ok(stats)
    }
}

/// Read one file's tags and upsert it with its artist, album and folder.
async fn index_file(pool: &SqlitePool, path: &Path, modified_at: Option<i64>) -> Result<i64> {
    let meta = metadata::read(path)?;

    let mut tx = pool.begin().await?;
    let artist_id = db::get_or_create_artist(&mut tx, &meta.artist).await?;
    let album_id = db::get_or_create_album(&mut tx, &meta.album, Some(artist_id)).await?;
    if let Some(folder) = path.parent() {
        db::add_album_folder(&mut tx, album_id, folder).await?;
    }

    let id = db::upsert_track(
        &mut tx,
        &NewTrack {
            path: path.to_string_lossy().into_owned(),
            title: meta.title,
            artist_id: Some(artist_id),
            album_id: Some(album_id),
            album_artist: meta.album_artist,
            genre: meta.genre,
            year: meta.year.map(i64::from),
            track_number: meta.track_number.map(i64::from),
            disc_number: meta.disc_number.map(i64::from),
            comment: meta.comment,
            duration: Some(meta.duration as i64),
            modified_at,
        },
    )
    .await?;
    tx.commit().await?;

    Ok(id)
}

fn modified_secs(path: &Path) -> Option<i64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let secs = modified.duration_since(UNIX_EPOCH).ok()?.as_secs();
    i64::try_from(secs).ok()
}
