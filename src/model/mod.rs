//! Core data models for the music library.
//!
//! Defines the catalog entities: [`MediaFile`] and [`Album`]. Artists are
//! only ever seen through the name joined onto a file or album.
//! These are derived from SQLx for database mapping.
//!
//! # Database Schema
//!
//! The models map to the following tables:
//! - `artists` - Artist records with unique names
//! - `albums` - Albums with optional artist reference
//! - `album_folders` - On-disk directories backing each album
//! - `tracks` - Individual audio files with their tags and `missing` flag

use std::path::{Path, PathBuf};

use serde::Serialize;
use sqlx::FromRow;

/// An album in the music library.
#[derive(Debug, Clone, Default, FromRow, Serialize)]
pub struct Album {
    /// Database ID (auto-generated)
    pub id: i64,
    /// Album title
    pub title: String,
    /// Optional artist ID (albums can exist without artist)
    pub artist_id: Option<i64>,
    /// Release year (optional)
    pub year: Option<i64>,
    /// Directories holding the album's files, loaded separately
    #[sqlx(skip)]
    pub folders: Vec<PathBuf>,
}

/// A media file (track) with its artist and album names joined in.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MediaFile {
    /// Database ID
    pub id: i64,
    /// Absolute file path
    pub path: String,
    /// Parent album
    pub album_id: Option<i64>,
    /// True when the last scan could not find the file
    pub missing: bool,
    pub title: String,
    /// Artist name (or "Unknown Artist")
    pub artist: String,
    /// Album title (or "Unknown Album")
    pub album: String,
    pub album_artist: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i64>,
    pub track_number: Option<i64>,
    pub disc_number: Option<i64>,
    pub comment: Option<String>,
    /// Duration in seconds
    pub duration: Option<i64>,
}

impl MediaFile {
    /// The path as a [`Path`].
    pub fn path(&self) -> &Path {
        Path::new(&self.path)
    }
}
