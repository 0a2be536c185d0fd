//! The catalog seam.
//!
//! The mutation components never talk to the database directly; they go
//! through [`Catalog`]. Production code uses [`crate::db::SqliteCatalog`],
//! tests can substitute an in-memory implementation.

use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::model::{Album, MediaFile};
use crate::tags::TagDiff;

/// What a garbage-collection pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GcStats {
    pub albums_removed: u64,
    pub artists_removed: u64,
}

/// Read/write access to the persistent metadata store.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Look up one media file.
    async fn get_media_file(&self, id: i64) -> Result<Option<MediaFile>>;

    /// All media files of an album, in catalog (insertion) order.
    async fn list_media_files_by_album(&self, album_id: i64) -> Result<Vec<MediaFile>>;

    /// Look up an album including its folders.
    async fn get_album(&self, id: i64) -> Result<Option<Album>>;

    /// Number of media files still attached to an album.
    async fn count_album_members(&self, album_id: i64) -> Result<i64>;

    /// Number of media files stored anywhere below `folder`, whatever album
    /// they belong to.
    async fn count_files_under(&self, folder: &Path) -> Result<i64>;

    /// Delete a media file record. Deleting an unknown id is not an error.
    async fn delete_media_file(&self, id: i64) -> Result<()>;

    /// Delete an album record and its folder rows.
    async fn delete_album_record(&self, id: i64) -> Result<()>;

    /// Flag a media file as absent from disk.
    async fn mark_missing(&self, id: i64) -> Result<()>;

    /// Mirror a successful tag rewrite onto the catalog row.
    async fn record_tag_edit(&self, id: i64, diff: &TagDiff) -> Result<()>;

    /// Purge albums and artists that nothing references any more.
    async fn run_garbage_collection(&self) -> Result<GcStats>;
}
