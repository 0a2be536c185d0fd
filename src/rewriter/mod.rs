//! Atomic tag rewrites through the external rewrite tool.
//!
//! The tool never writes over the original. It reads `<dir>/<stem>.<ext>` and
//! writes a sibling `<dir>/<stem>.tmp.<ext>`, which is renamed onto the
//! original only after the tool exits cleanly. A failed or cancelled run
//! leaves the original untouched and removes the temp file.
//!
//! # Example
//!
//! ```ignore
//! let rewriter = MetadataRewriter::new("ffmpeg", PathLocks::new());
//! let diff = TagDiff::new().with(TagField::Title, "New");
//! rewriter.rewrite_tags(Path::new("/music/a.flac"), &diff, &cancel).await?;
//! ```

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::path_locks::PathLocks;
use crate::tags::TagDiff;
use crate::tools;

/// Marker inserted between stem and extension of rewrite temp files.
const TEMP_MARKER: &str = "tmp";

/// Sibling temp path for a rewrite of `path`.
///
/// `/music/a.flac` becomes `/music/a.tmp.flac`; a file without extension gets
/// a `.tmp` suffix.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let stem = path.file_stem().unwrap_or(path.as_os_str());
    let mut name = OsString::from(stem);
    name.push(".");
    name.push(TEMP_MARKER);
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

/// Whether `path` looks like a rewrite temp file (`*.tmp.<ext>` or `*.tmp`).
pub fn is_temp_path(path: &Path) -> bool {
    let Some(stem) = path.file_stem() else {
        return false;
    };
    if path.extension().is_some_and(|ext| ext == TEMP_MARKER) {
        return true;
    }
    Path::new(stem)
        .extension()
        .is_some_and(|ext| ext == TEMP_MARKER)
}

/// Refresh the modification time of `path` to now.
pub fn touch(path: &Path) -> io::Result<()> {
    let file = std::fs::File::options().write(true).open(path)?;
    file.set_modified(SystemTime::now())
}

/// Rewrites tags of single files through the external rewrite tool.
#[derive(Debug, Clone)]
pub struct MetadataRewriter {
    tool: PathBuf,
    label: String,
    locks: PathLocks,
}

impl MetadataRewriter {
    /// Create a rewriter running `tool`, serializing per path through `locks`.
    pub fn new(tool: impl Into<PathBuf>, locks: PathLocks) -> Self {
        let tool = tool.into();
        let label = tool
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ffmpeg".to_string());
        Self { tool, label, locks }
    }

    /// Apply `diff` to the file at `path`.
    ///
    /// Fails with `InvalidArgument` for an empty diff (before anything is
    /// spawned), `ResourceMissing` if the file is absent, `ToolInvocationFailed`
    /// or `Cancelled` if the tool did not finish cleanly, and `CommitFailed` if
    /// the rewritten file could not be renamed into place. In the last case
    /// the temp file is kept.
    pub async fn rewrite_tags(
        &self,
        path: &Path,
        diff: &TagDiff,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if diff.is_empty() {
            return Err(Error::invalid("no recognized tag fields to update"));
        }

        let _guard = self.locks.lock(path).await;

        if !path.is_file() {
            return Err(Error::missing(path));
        }

        let temp = temp_path_for(path);
        let args = build_args(path, diff, &temp);
        tracing::debug!(path = %path.display(), fields = diff.len(), "Rewriting tags");

        if let Err(e) = tools::run(&self.tool, &args, None, cancel).await {
            remove_temp(&temp).await;
            let err = e.into_error(&self.label);
            tracing::warn!(path = %path.display(), error = %err, "Tag rewrite failed");
            return Err(err);
        }

        if let Err(source) = tokio::fs::rename(&temp, path).await {
            tracing::error!(
                temp = %temp.display(),
                target = %path.display(),
                error = %source,
                "Rewritten file could not be moved into place"
            );
            return Err(Error::CommitFailed {
                temp,
                target: path.to_path_buf(),
                source,
            });
        }

        tracing::info!(path = %path.display(), "Tags rewritten");
        Ok(())
    }
}

/// Rewrite-tool arguments: read `input`, apply the diff, stream-copy to `output`.
pub fn build_args(input: &Path, diff: &TagDiff, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-i".into(),
        input.as_os_str().to_owned(),
    ];
    args.extend(diff.tool_directives().into_iter().map(OsString::from));
    args.extend(["-codec".into(), "copy".into(), "-y".into()]);
    args.push(output.as_os_str().to_owned());
    args
}

async fn remove_temp(temp: &Path) {
    match tokio::fs::remove_file(temp).await {
        Ok(()) => tracing::debug!(temp = %temp.display(), "Removed partial temp file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(temp = %temp.display(), error = %e, "Failed to remove temp file"),
    }
}
