//! SQLite-backed [`Catalog`].

use std::path::Path;

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::catalog::{Catalog, GcStats};
use crate::error::Result;
use crate::model::{Album, MediaFile};
use crate::tags::TagDiff;

/// [`Catalog`] implementation over a SQLx pool.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Catalog for SqliteCatalog {
    async fn get_media_file(&self, id: i64) -> Result<Option<MediaFile>> {
        Ok(super::get_media_file(&self.pool, id).await?)
    }

    async fn list_media_files_by_album(&self, album_id: i64) -> Result<Vec<MediaFile>> {
        Ok(super::list_media_files_by_album(&self.pool, album_id).await?)
    }

    async fn get_album(&self, id: i64) -> Result<Option<Album>> {
        Ok(super::get_album(&self.pool, id).await?)
    }

    async fn count_album_members(&self, album_id: i64) -> Result<i64> {
        Ok(super::count_album_tracks(&self.pool, album_id).await?)
    }

    async fn count_files_under(&self, folder: &Path) -> Result<i64> {
        Ok(super::count_tracks_under(&self.pool, folder).await?)
    }

    async fn delete_media_file(&self, id: i64) -> Result<()> {
        if !super::delete_track(&self.pool, id).await? {
            tracing::debug!(id, "Track record was already gone");
        }
        Ok(())
    }

    async fn delete_album_record(&self, id: i64) -> Result<()> {
        if !super::delete_album(&self.pool, id).await? {
            tracing::debug!(id, "Album record was already gone");
        }
        Ok(())
    }

    async fn mark_missing(&self, id: i64) -> Result<()> {
        Ok(super::set_track_missing(&self.pool, id, true).await?)
    }

    async fn record_tag_edit(&self, id: i64, diff: &TagDiff) -> Result<()> {
        Ok(super::update_track_tags(&self.pool, id, diff).await?)
    }

    async fn run_garbage_collection(&self) -> Result<GcStats> {
        Ok(super::run_garbage_collection(&self.pool).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{insert_mock_track, temp_db};

    #[tokio::test]
    async fn test_catalog_round_trip_through_trait() {
        let (pool, _dir) = temp_db().await;
        let id = insert_mock_track(&pool, "/music/Test Album/a.mp3").await;
        let catalog: &dyn Catalog = &SqliteCatalog::new(pool);

        let file = catalog.get_media_file(id).await.unwrap().unwrap();
        let album_id = file.album_id.unwrap();
        assert_eq!(catalog.count_album_members(album_id).await.unwrap(), 1);

        catalog.mark_missing(id).await.unwrap();
        assert!(catalog.get_media_file(id).await.unwrap().unwrap().missing);

        catalog.delete_media_file(id).await.unwrap();
        // Idempotent
        catalog.delete_media_file(id).await.unwrap();
        assert_eq!(catalog.count_album_members(album_id).await.unwrap(), 0);

        let stats = catalog.run_garbage_collection().await.unwrap();
        assert_eq!(stats.albums_removed, 1);
        assert!(catalog.get_album(album_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_tag_edit_unknown_id_is_persistence_error() {
        let (pool, _dir) = temp_db().await;
        let catalog = SqliteCatalog::new(pool);
        let diff = TagDiff::new().with(crate::tags::TagField::Comment, "x");
        let err = catalog.record_tag_edit(404, &diff).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::PersistenceFailed);
    }
}
