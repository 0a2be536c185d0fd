//! Application-wide error types.
//!
//! Library modules return [`Error`] via the [`Result`] alias, while the
//! CLI/main layer uses `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! - [`Error`]: one enum covering every failure the orchestrator can surface
//! - [`ErrorKind`]: a flat, copyable classification used when an error has to
//!   be recorded (bulk outcomes) or mapped onto a transport status
//! - Context chains via [`ResultExt::with_context`]; [`Error::kind`] looks
//!   through them
//!
//! # Example
//!
//! ```ignore
//! use music_steward::error::{Error, Result};
//!
//! fn delete(path: &Path) -> Result<()> {
//!     std::fs::remove_file(path).map_err(|e| Error::file_delete(path, e))?;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;

use serde::Serialize;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request was malformed (empty diff, bad id, unsafe subpath, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Id does not resolve in the catalog
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Target file is absent from disk where presence was required
    #[error("File is missing: {0}")]
    ResourceMissing(PathBuf),

    /// External tool could not be spawned or exited non-zero
    #[error("{tool} failed: {cause}")]
    ToolInvocationFailed {
        tool: String,
        cause: String,
        /// Combined stdout/stderr of the tool, for diagnostics
        output: String,
    },

    /// Operation was cancelled (external tools are killed, not abandoned)
    #[error("{operation} was cancelled")]
    Cancelled { operation: String },

    /// The external operation succeeded but its result could not be moved
    /// into place
    #[error("Failed to commit {temp} onto {target}: {source}")]
    CommitFailed {
        temp: PathBuf,
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file exists but could not be removed
    #[error("Failed to delete {path}: {source}")]
    FileDeleteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A destination directory could not be created
    #[error("Directory unavailable {path}: {source}")]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Database write or read failed
    #[error("Database error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata reading error
    #[error("Metadata error for {path}: {message}")]
    Metadata { path: PathBuf, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

/// Flat classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    ResourceMissing,
    ToolInvocationFailed,
    Cancelled,
    CommitFailed,
    FileDeleteFailed,
    DirectoryUnavailable,
    PersistenceFailed,
    Io,
    Metadata,
    Config,
}

impl Error {
    /// Create an invalid argument error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a not found error for a catalog entity.
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Create a missing-file error.
    pub fn missing(path: impl Into<PathBuf>) -> Self {
        Self::ResourceMissing(path.into())
    }

    /// Create a file deletion error.
    pub fn file_delete(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileDeleteFailed {
            path: path.into(),
            source,
        }
    }

    /// Create a metadata error.
    pub fn metadata(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Metadata {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// Classify this error, looking through any context wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::ResourceMissing(_) => ErrorKind::ResourceMissing,
            Self::ToolInvocationFailed { .. } => ErrorKind::ToolInvocationFailed,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::CommitFailed { .. } => ErrorKind::CommitFailed,
            Self::FileDeleteFailed { .. } => ErrorKind::FileDeleteFailed,
            Self::DirectoryUnavailable { .. } => ErrorKind::DirectoryUnavailable,
            Self::Persistence(_) => ErrorKind::PersistenceFailed,
            Self::Io(_) => ErrorKind::Io,
            Self::Metadata { .. } => ErrorKind::Metadata,
            Self::Config(_) => ErrorKind::Config,
            Self::WithContext { source, .. } => source.kind(),
        }
    }

    /// Captured tool output, if this error came from an external tool.
    pub fn tool_output(&self) -> Option<&str> {
        match self {
            Self::ToolInvocationFailed { output, .. } => Some(output),
            Self::WithContext { source, .. } => source.tool_output(),
            _ => None,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Persistence(e).context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = Error::not_found("song", 42);
        assert_eq!(err.to_string(), "song 42 not found");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_kind_looks_through_context() {
        let err = Error::Persistence(sqlx::Error::RowNotFound).context("deleting track 3");
        assert!(err.to_string().contains("deleting track 3"));
        assert_eq!(err.kind(), ErrorKind::PersistenceFailed);
    }

    #[test]
    fn test_tool_output_is_preserved() {
        let err = Error::ToolInvocationFailed {
            tool: "ffmpeg".to_string(),
            cause: "exit status 1".to_string(),
            output: "Invalid data found when processing input".to_string(),
        }
        .context("rewriting /music/a.flac");

        assert_eq!(err.kind(), ErrorKind::ToolInvocationFailed);
        assert_eq!(
            err.tool_output(),
            Some("Invalid data found when processing input")
        );
        assert!(!err.to_string().contains("Invalid data"));
    }

    #[test]
    fn test_file_delete_error_mentions_path() {
        let io = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        let err = Error::file_delete("/music/song.mp3", io);
        assert!(err.to_string().contains("/music/song.mp3"));
        assert_eq!(err.kind(), ErrorKind::FileDeleteFailed);
    }

    #[test]
    fn test_result_ext() {
        let result: Result<()> = Err(Error::invalid("no tags to update"));
        let with_ctx = result.with_context("editing album 7");
        let err = with_ctx.unwrap_err();
        assert!(err.to_string().contains("editing album 7"));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ToolInvocationFailed).unwrap();
        assert_eq!(json, "\"tool_invocation_failed\"");
    }
}
