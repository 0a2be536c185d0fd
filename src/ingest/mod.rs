//! Fetching new media into the library.
//!
//! The fetch tool (`yt-dlp`) downloads and extracts audio straight into a
//! directory under the library root. Its output announces where it wrote
//! files; the last announced file that actually exists is reported back.
//! The catalog learns about the new file through a rescan queued on the
//! [`BackgroundDispatcher`](crate::background::BackgroundDispatcher), which
//! the caller does not wait for.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::background::{BackgroundJob, DispatcherHandle};
use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::tools;

/// Where the receipt's filename came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilenameSource {
    /// Announced by the fetch tool and present on disk
    Reported,
    /// The tool's output named no existing file; this is a guess
    Placeholder,
}

/// Result of a successful ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReceipt {
    pub filename: String,
    pub filename_source: FilenameSource,
    pub directory: PathBuf,
    /// Whether the follow-up rescan was queued
    pub rescan_scheduled: bool,
}

/// Drives the fetch tool and schedules reconciliation.
#[derive(Debug, Clone)]
pub struct IngestCoordinator {
    fetcher: PathBuf,
    label: String,
    library_root: PathBuf,
    settings: IngestConfig,
    dispatcher: DispatcherHandle,
}

impl IngestCoordinator {
    pub fn new(
        fetcher: impl Into<PathBuf>,
        library_root: impl Into<PathBuf>,
        settings: IngestConfig,
        dispatcher: DispatcherHandle,
    ) -> Self {
        let fetcher = fetcher.into();
        let label = fetcher
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "yt-dlp".to_string());
        Self {
            fetcher,
            label,
            library_root: library_root.into(),
            settings,
            dispatcher,
        }
    }

    /// Fetch `source_url` into the library root, or into `target_subpath`
    /// below it.
    pub async fn ingest(
        &self,
        source_url: &str,
        target_subpath: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<IngestReceipt> {
        let source_url = source_url.trim();
        if source_url.is_empty() {
            return Err(Error::invalid("source URL is empty"));
        }

        let directory = match target_subpath {
            Some(sub) => {
                validate_subpath(sub)?;
                self.library_root.join(sub)
            }
            None => self.library_root.clone(),
        };
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|source| Error::DirectoryUnavailable {
                path: directory.clone(),
                source,
            })?;

        tracing::info!(url = source_url, dir = %directory.display(), "Fetching");
        let args = build_args(&self.settings, &directory, source_url);
        let output = tools::run(&self.fetcher, &args, Some(&directory), cancel)
            .await
            .map_err(|e| e.into_error(&self.label))?;

        let (filename, filename_source) = match reported_file(&output.combined, &directory) {
            Some(name) => (name, FilenameSource::Reported),
            None => {
                let guess = format!("downloaded_file.{}", self.settings.audio_format);
                tracing::warn!(dir = %directory.display(), guess = %guess, "Fetch tool did not report an existing output file");
                (guess, FilenameSource::Placeholder)
            }
        };
        tracing::info!(file = %filename, dir = %directory.display(), "Fetch complete");

        let rescan_scheduled = self.dispatcher.submit(BackgroundJob::Rescan {
            full: self.settings.full_rescan,
        });

        Ok(IngestReceipt {
            filename,
            filename_source,
            directory,
            rescan_scheduled,
        })
    }
}

/// Fetch-tool arguments: extract audio in `settings.audio_format`, embed
/// metadata and thumbnail, name the output after `settings.output_template`.
pub fn build_args(settings: &IngestConfig, directory: &Path, url: &str) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-x".into(),
        "--audio-format".into(),
        settings.audio_format.clone().into(),
        "--add-metadata".into(),
        "--no-write-comments".into(),
        "--no-write-description".into(),
        "--embed-thumbnail".into(),
        "-o".into(),
    ];
    args.push(directory.join(&settings.output_template).into_os_string());
    // Keeps a URL starting with '-' from being read as an option.
    args.push("--".into());
    args.push(url.into());
    args
}

/// Paths announced by the fetch tool, in output order.
///
/// Recognizes `[<stage>] Destination: <path>` and
/// `[download] <path> has already been downloaded`.
pub fn parse_destinations(output: &str) -> Vec<PathBuf> {
    output
        .lines()
        .filter_map(|line| {
            let (_, rest) = line.trim().strip_prefix('[')?.split_once(']')?;
            let rest = rest.trim();
            let announced = match rest.strip_prefix("Destination:") {
                Some(path) => path,
                None => rest.strip_suffix("has already been downloaded")?,
            };
            let announced = announced.trim();
            (!announced.is_empty()).then(|| PathBuf::from(announced))
        })
        .collect()
}

/// File name of the last announced path that exists, relative paths being
/// resolved against `directory`.
fn reported_file(output: &str, directory: &Path) -> Option<String> {
    parse_destinations(output)
        .into_iter()
        .rev()
        .map(|path| directory.join(path))
        .find(|path| path.is_file())
        .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
}

fn validate_subpath(sub: &Path) -> Result<()> {
    for component in sub.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(Error::invalid(format!(
                    "target path must stay inside the library: {}",
                    sub.display()
                )));
            }
        }
    }
    Ok(())
}
