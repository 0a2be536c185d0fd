//! Editable tag fields and tag diffs.
//!
//! A [`TagDiff`] maps a fixed set of [`TagField`]s to new values. Only fields
//! present in the diff are forwarded to the rewrite tool; everything else on
//! the file is left alone.
//!
//! Request keys are resolved per [`TagScope`] through static lookup tables.
//! Keys are matched case-insensitively with `-` and `_` ignored, so
//! `albumArtist`, `album_artist` and `album-artist` all name the same field.
//! Keys that are not in the table are dropped, not rejected.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A tag field that can be edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TagField {
    Title,
    Artist,
    Album,
    AlbumArtist,
    Genre,
    Year,
    TrackNumber,
    DiscNumber,
    Comment,
}

impl TagField {
    /// All editable fields, in tool argument order.
    pub const ALL: [TagField; 9] = [
        TagField::Title,
        TagField::Artist,
        TagField::Album,
        TagField::AlbumArtist,
        TagField::Genre,
        TagField::Year,
        TagField::TrackNumber,
        TagField::DiscNumber,
        TagField::Comment,
    ];

    /// Metadata key understood by the rewrite tool (ffmpeg).
    pub const fn tool_key(self) -> &'static str {
        match self {
            TagField::Title => "title",
            TagField::Artist => "artist",
            TagField::Album => "album",
            TagField::AlbumArtist => "album_artist",
            TagField::Genre => "genre",
            TagField::Year => "date",
            TagField::TrackNumber => "track",
            TagField::DiscNumber => "disc",
            TagField::Comment => "comment",
        }
    }

    /// Human-readable name, as used in song-scope requests.
    pub const fn name(self) -> &'static str {
        match self {
            TagField::Title => "title",
            TagField::Artist => "artist",
            TagField::Album => "album",
            TagField::AlbumArtist => "album-artist",
            TagField::Genre => "genre",
            TagField::Year => "year",
            TagField::TrackNumber => "track-number",
            TagField::DiscNumber => "disc-number",
            TagField::Comment => "comment",
        }
    }

    /// Whether the value must be a non-negative integer.
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            TagField::Year | TagField::TrackNumber | TagField::DiscNumber
        )
    }
}

/// Normalized request key → field, song scope.
const SONG_KEYS: &[(&str, TagField)] = &[
    ("title", TagField::Title),
    ("artist", TagField::Artist),
    ("album", TagField::Album),
    ("albumartist", TagField::AlbumArtist),
    ("genre", TagField::Genre),
    ("year", TagField::Year),
    ("tracknumber", TagField::TrackNumber),
    ("discnumber", TagField::DiscNumber),
    ("comment", TagField::Comment),
];

/// Normalized request key → field, album scope. `name` is the album title.
const ALBUM_KEYS: &[(&str, TagField)] = &[
    ("name", TagField::Album),
    ("artist", TagField::Artist),
    ("albumartist", TagField::AlbumArtist),
    ("genre", TagField::Genre),
    ("year", TagField::Year),
    ("comment", TagField::Comment),
];

/// Which request vocabulary a set of keys comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagScope {
    /// Editing a single song
    Song,
    /// Editing every song of an album
    Album,
}

impl TagScope {
    fn keys(self) -> &'static [(&'static str, TagField)] {
        match self {
            TagScope::Song => SONG_KEYS,
            TagScope::Album => ALBUM_KEYS,
        }
    }

    /// Resolve a request key to a field, or `None` if the key is unknown.
    pub fn lookup(self, key: &str) -> Option<TagField> {
        let normalized = normalize_key(key);
        self.keys()
            .iter()
            .find(|(k, _)| *k == normalized)
            .map(|(_, field)| *field)
    }

    /// Whether `field` may be set in this scope.
    pub fn accepts(self, field: TagField) -> bool {
        self.keys().iter().any(|(_, f)| *f == field)
    }
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// A set of tag changes to apply to one or more files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagDiff {
    fields: BTreeMap<TagField, String>,
}

impl TagDiff {
    /// Create an empty diff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, field: TagField, value: impl Into<String>) -> Self {
        self.fields.insert(field, value.into());
        self
    }

    /// Build a diff from request key/value pairs.
    ///
    /// Unknown keys are dropped (and logged at debug level). Numeric fields
    /// must hold a non-negative integer.
    pub fn from_pairs<I, K, V>(scope: TagScope, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut diff = TagDiff::new();
        for (key, value) in pairs {
            let key = key.as_ref();
            let Some(field) = scope.lookup(key) else {
                tracing::debug!(key, ?scope, "Dropping unrecognized tag key");
                continue;
            };
            let value = value.into();
            if field.is_numeric() {
                let trimmed = value.trim();
                if trimmed.parse::<u32>().is_err() {
                    return Err(Error::invalid(format!(
                        "{} must be a non-negative integer, got {:?}",
                        field.name(),
                        value
                    )));
                }
                diff.fields.insert(field, trimmed.to_string());
            } else {
                diff.fields.insert(field, value);
            }
        }
        Ok(diff)
    }

    /// Parse `key=value` strings (CLI form).
    pub fn parse_assignments<S: AsRef<str>>(scope: TagScope, assignments: &[S]) -> Result<Self> {
        let mut pairs = Vec::with_capacity(assignments.len());
        for raw in assignments {
            let raw = raw.as_ref();
            let (key, value) = raw
                .split_once('=')
                .ok_or_else(|| Error::invalid(format!("expected key=value, got {:?}", raw)))?;
            pairs.push((key.trim().to_string(), value.to_string()));
        }
        Self::from_pairs(scope, pairs)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn get(&self, field: TagField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    /// Iterate fields in stable order.
    pub fn iter(&self) -> impl Iterator<Item = (TagField, &str)> {
        self.fields.iter().map(|(f, v)| (*f, v.as_str()))
    }

    /// Copy of this diff without the fields `scope` does not accept.
    pub fn restricted_to(&self, scope: TagScope) -> TagDiff {
        TagDiff {
            fields: self
                .fields
                .iter()
                .filter(|(field, _)| scope.accepts(**field))
                .map(|(field, value)| (*field, value.clone()))
                .collect(),
        }
    }

    /// Rewrite-tool directives: one `-metadata key=value` pair per field.
    pub fn tool_directives(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.fields.len() * 2);
        for (field, value) in self.iter() {
            args.push("-metadata".to_string());
            args.push(format!("{}={}", field.tool_key(), value));
        }
        args
    }
}
