//! Database module for track, artist, and album persistence.
//!
//! Uses SQLx with SQLite for lightweight, embedded database storage.
//! Provides async operations for:
//! - Track upserts from the scanner and lookups for the mutation components
//! - Cascading deletes and orphan garbage collection
//! - Mirroring tag edits onto catalog rows
//!
//! [`SqliteCatalog`] wraps these functions behind the
//! [`Catalog`](crate::catalog::Catalog) trait.
//!
//! # Example
//!
//! ```ignore
//! use music_steward::db::{init_db, get_media_file};
//!
//! let pool = init_db("sqlite:music_steward.db").await?;
//! let song = get_media_file(&pool, 42).await?;
//! ```

mod catalog;

pub use catalog::SqliteCatalog;

use std::path::{Path, PathBuf};

use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};

use crate::catalog::GcStats;
use crate::model::{Album, MediaFile};
use crate::tags::{TagDiff, TagField};

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "music_steward.db";

/// Columns selected for a [`MediaFile`], with artist/album names joined in.
const MEDIA_FILE_SELECT: &str = r#"
    SELECT
        t.id, t.path, t.album_id, t.missing, t.title,
        COALESCE(a.name, 'Unknown Artist') AS artist,
        COALESCE(al.title, 'Unknown Album') AS album,
        t.album_artist, t.genre, t.year, t.track_number, t.disc_number,
        t.comment, t.duration
    FROM tracks t
    LEFT JOIN artists a ON t.artist_id = a.id
    LEFT JOIN albums al ON t.album_id = al.id
"#;

/// Build a SQLite database URL from an optional path.
///
/// If no path is provided, uses [`DEFAULT_DB_NAME`] in the current directory.
pub fn db_url(path: Option<&Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file if it doesn't exist, establishes a connection
/// pool with up to 5 connections, and runs all pending migrations.
///
/// # Errors
///
/// Returns an error if:
/// - Database creation fails
/// - Connection cannot be established
/// - Migration fails
pub async fn init_db(db_url: &str) -> Result<SqlitePool, sqlx::Error> {
    if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
        sqlx::Sqlite::create_database(db_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Get or create an artist by name.
///
/// Idempotent: calling with the same name always returns the same ID.
pub async fn get_or_create_artist(conn: &mut SqliteConnection, name: &str) -> sqlx::Result<i64> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM artists WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;

    if let Some((id,)) = row {
        Ok(id)
    } else {
        let result = sqlx::query("INSERT INTO artists (name) VALUES (?)")
            .bind(name)
            .execute(&mut *conn)
            .await?;
        Ok(result.last_insert_rowid())
    }
}

/// Get or create an album by title and artist.
pub async fn get_or_create_album(
    conn: &mut SqliteConnection,
    title: &str,
    artist_id: Option<i64>,
) -> sqlx::Result<i64> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM albums WHERE title = ? AND artist_id IS ?")
            .bind(title)
            .bind(artist_id)
            .fetch_optional(&mut *conn)
            .await?;

    if let Some((id,)) = row {
        Ok(id)
    } else {
        let result = sqlx::query("INSERT INTO albums (title, artist_id) VALUES (?, ?)")
            .bind(title)
            .bind(artist_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.last_insert_rowid())
    }
}

/// Record that `folder` holds files of `album_id`.
pub async fn add_album_folder(
    conn: &mut SqliteConnection,
    album_id: i64,
    folder: &Path,
) -> sqlx::Result<()> {
    sqlx::query("INSERT OR IGNORE INTO album_folders (album_id, folder) VALUES (?, ?)")
        .bind(album_id)
        .bind(folder.to_string_lossy().as_ref())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Everything the scanner knows about a file.
#[derive(Debug, Clone, Default)]
pub struct NewTrack {
    pub path: String,
    pub title: String,
    pub artist_id: Option<i64>,
    pub album_id: Option<i64>,
    pub album_artist: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i64>,
    pub track_number: Option<i64>,
    pub disc_number: Option<i64>,
    pub comment: Option<String>,
    pub duration: Option<i64>,
    /// File modification time, seconds since the epoch
    pub modified_at: Option<i64>,
}

/// Insert or update a track record keyed by path.
///
/// A re-scanned track is always un-flagged as missing.
pub async fn upsert_track(conn: &mut SqliteConnection, track: &NewTrack) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO tracks (
            title, artist_id, album_id, path, duration, track_number, disc_number,
            album_artist, genre, year, comment, missing, modified_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
        ON CONFLICT(path) DO UPDATE SET
            title = excluded.title,
            artist_id = excluded.artist_id,
            album_id = excluded.album_id,
            duration = excluded.duration,
            track_number = excluded.track_number,
            disc_number = excluded.disc_number,
            album_artist = excluded.album_artist,
            genre = excluded.genre,
            year = excluded.year,
            comment = excluded.comment,
            missing = 0,
            modified_at = excluded.modified_at
        RETURNING id
        "#,
    )
    .bind(&track.title)
    .bind(track.artist_id)
    .bind(track.album_id)
    .bind(&track.path)
    .bind(track.duration)
    .bind(track.track_number)
    .bind(track.disc_number)
    .bind(&track.album_artist)
    .bind(&track.genre)
    .bind(track.year)
    .bind(&track.comment)
    .bind(track.modified_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.0)
}

/// Get a media file by its database ID.
pub async fn get_media_file(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<MediaFile>> {
    sqlx::query_as::<_, MediaFile>(&format!("{MEDIA_FILE_SELECT} WHERE t.id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Get all media files of an album in insertion order.
pub async fn list_media_files_by_album(
    pool: &SqlitePool,
    album_id: i64,
) -> sqlx::Result<Vec<MediaFile>> {
    sqlx::query_as::<_, MediaFile>(&format!(
        "{MEDIA_FILE_SELECT} WHERE t.album_id = ? ORDER BY t.id"
    ))
    .bind(album_id)
    .fetch_all(pool)
    .await
}

/// Get every media file in the catalog.
pub async fn list_media_files(pool: &SqlitePool) -> sqlx::Result<Vec<MediaFile>> {
    sqlx::query_as::<_, MediaFile>(&format!("{MEDIA_FILE_SELECT} ORDER BY t.id"))
        .fetch_all(pool)
        .await
}

/// Path and recorded modification time of every track (for incremental scans).
pub async fn get_track_stamps(pool: &SqlitePool) -> sqlx::Result<Vec<(i64, String, Option<i64>)>> {
    sqlx::query_as("SELECT id, path, modified_at FROM tracks")
        .fetch_all(pool)
        .await
}

/// Get an album with its folders.
pub async fn get_album(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<Album>> {
    let album: Option<Album> =
        sqlx::query_as("SELECT id, title, artist_id, year FROM albums WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

    let Some(mut album) = album else {
        return Ok(None);
    };

    let folders: Vec<(String,)> =
        sqlx::query_as("SELECT folder FROM album_folders WHERE album_id = ? ORDER BY folder")
            .bind(id)
            .fetch_all(pool)
            .await?;
    album.folders = folders
        .into_iter()
        .map(|(folder,)| PathBuf::from(folder))
        .collect();

    Ok(Some(album))
}

/// Count the tracks still attached to an album.
pub async fn count_album_tracks(pool: &SqlitePool, album_id: i64) -> sqlx::Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tracks WHERE album_id = ?")
        .bind(album_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Count tracks whose path lies below `folder`.
///
/// Compares a literal prefix (`<folder>/`), so `Singles2/a.mp3` is not under
/// `Singles` and `%`/`_` in folder names match only themselves.
pub async fn count_tracks_under(pool: &SqlitePool, folder: &Path) -> sqlx::Result<i64> {
    let folder = folder.to_string_lossy();
    let prefix = format!(
        "{}{}",
        folder.trim_end_matches(std::path::MAIN_SEPARATOR),
        std::path::MAIN_SEPARATOR
    );
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM tracks WHERE substr(path, 1, length(?)) = ?")
            .bind(&prefix)
            .bind(&prefix)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

/// Delete a track record. Returns whether a row was removed.
pub async fn delete_track(pool: &SqlitePool, id: i64) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM tracks WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete an album and its folder rows.
pub async fn delete_album(pool: &SqlitePool, id: i64) -> sqlx::Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM album_folders WHERE album_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM albums WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

/// Set or clear the `missing` flag of a track.
pub async fn set_track_missing(pool: &SqlitePool, id: i64, missing: bool) -> sqlx::Result<()> {
    sqlx::query("UPDATE tracks SET missing = ? WHERE id = ?")
        .bind(missing)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Apply a tag diff to a track row.
///
/// Scalar columns are updated in place. Artist and album changes re-link the
/// track by name the same way the scanner does, which may leave the previous
/// album or artist orphaned for the next garbage-collection pass.
pub async fn update_track_tags(pool: &SqlitePool, id: i64, diff: &TagDiff) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;

    let current: Option<(String, Option<i64>)> =
        sqlx::query_as("SELECT path, artist_id FROM tracks WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some((path, mut artist_id)) = current else {
        return Err(sqlx::Error::RowNotFound);
    };

    for (field, value) in diff.iter() {
        let column = match field {
            TagField::Title => "title",
            TagField::AlbumArtist => "album_artist",
            TagField::Genre => "genre",
            TagField::Comment => "comment",
            TagField::Year => "year",
            TagField::TrackNumber => "track_number",
            TagField::DiscNumber => "disc_number",
            TagField::Artist | TagField::Album => continue,
        };
        let query = format!("UPDATE tracks SET {column} = ? WHERE id = ?");
        if field.is_numeric() {
            let number = value.parse::<i64>().ok();
            sqlx::query(&query)
                .bind(number)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        } else {
            sqlx::query(&query)
                .bind(value)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
    }

    if let Some(artist) = diff.get(TagField::Artist) {
        let new_artist = get_or_create_artist(&mut tx, artist).await?;
        sqlx::query("UPDATE tracks SET artist_id = ? WHERE id = ?")
            .bind(new_artist)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        artist_id = Some(new_artist);
    }

    if let Some(album) = diff.get(TagField::Album) {
        let album_id = get_or_create_album(&mut tx, album, artist_id).await?;
        sqlx::query("UPDATE tracks SET album_id = ? WHERE id = ?")
            .bind(album_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if let Some(folder) = Path::new(&path).parent() {
            add_album_folder(&mut tx, album_id, folder).await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

/// Purge albums with no tracks and artists referenced by nothing.
pub async fn run_garbage_collection(pool: &SqlitePool) -> sqlx::Result<GcStats> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        DELETE FROM album_folders
        WHERE album_id NOT IN (SELECT album_id FROM tracks WHERE album_id IS NOT NULL)
        "#,
    )
    .execute(&mut *tx)
    .await?;

    let albums = sqlx::query(
        r#"
        DELETE FROM albums
        WHERE id NOT IN (SELECT album_id FROM tracks WHERE album_id IS NOT NULL)
        "#,
    )
    .execute(&mut *tx)
    .await?;

    let artists = sqlx::query(
        r#"
        DELETE FROM artists
        WHERE id NOT IN (SELECT artist_id FROM tracks WHERE artist_id IS NOT NULL)
          AND id NOT IN (SELECT artist_id FROM albums WHERE artist_id IS NOT NULL)
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(GcStats {
        albums_removed: albums.rows_affected(),
        artists_removed: artists.rows_affected(),
    })
}
