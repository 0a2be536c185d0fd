//! Entry point for library mutations.
//!
//! [`MutationFacade`] is what request handlers (the CLI here) call. It
//! resolves catalog ids to files and sequences the rewriter, the deletion
//! cascade and the ingest coordinator for one logical operation.
//!
//! Single-target operations return the first hard error as-is. Album edits
//! record a [`MutationOutcome`] per song and never fail as a whole because of
//! one song.

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::catalog::Catalog;
use crate::deletion::{AlbumDeletion, DeletionCascade, SongDeletion};
use crate::error::{Error, Result};
use crate::ingest::{IngestCoordinator, IngestReceipt};
use crate::model::MediaFile;
use crate::outcome::{BulkSummary, MutationOutcome, TargetOutcome};
use crate::rewriter::{self, MetadataRewriter};
use crate::tags::{TagDiff, TagScope};

/// Sequences edits, deletes and ingests.
#[derive(Clone)]
pub struct MutationFacade {
    catalog: Arc<dyn Catalog>,
    rewriter: MetadataRewriter,
    deletion: DeletionCascade,
    ingest: IngestCoordinator,
    edit_concurrency: usize,
}

impl MutationFacade {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        rewriter: MetadataRewriter,
        deletion: DeletionCascade,
        ingest: IngestCoordinator,
    ) -> Self {
        Self {
            catalog,
            rewriter,
            deletion,
            ingest,
            edit_concurrency: 4,
        }
    }

    /// How many songs of an album edit are rewritten at once (at least 1).
    pub fn with_edit_concurrency(mut self, n: usize) -> Self {
        self.edit_concurrency = n.max(1);
        self
    }

    /// Rewrite the tags of one song.
    pub async fn edit_song(
        &self,
        song_id: i64,
        diff: &TagDiff,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if diff.is_empty() {
            return Err(Error::invalid("no recognized tag fields to update"));
        }

        let song = self
            .catalog
            .get_media_file(song_id)
            .await?
            .ok_or_else(|| Error::not_found("song", song_id))?;

        self.apply_edit(&song, diff, cancel).await
    }

    /// Rewrite the tags of every song on an album.
    ///
    /// Only album-level fields are applied; song-only fields such as the
    /// title or track number are dropped. Songs flagged missing are skipped,
    /// as are songs not yet started when `cancel` fires. Outcomes are in
    /// catalog order.
    pub async fn edit_album(
        &self,
        album_id: i64,
        diff: &TagDiff,
        cancel: &CancellationToken,
    ) -> Result<BulkSummary> {
        let album_diff = diff.restricted_to(TagScope::Album);
        if album_diff.len() < diff.len() {
            tracing::warn!(
                album_id,
                dropped = diff.len() - album_diff.len(),
                "Ignoring song-only fields in album edit"
            );
        }
        if album_diff.is_empty() {
            return Err(Error::invalid("no album-level tag fields to update"));
        }
        let diff = &album_diff;

        let songs = self.catalog.list_media_files_by_album(album_id).await?;
        if songs.is_empty() {
            return Err(Error::not_found("album", album_id));
        }
        tracing::info!(album_id, songs = songs.len(), fields = diff.len(), "Editing album");

        let outcomes: Vec<TargetOutcome> = futures::stream::iter(songs)
            .map(|song| async move {
                let outcome = if song.missing {
                    MutationOutcome::skipped("missing")
                } else if cancel.is_cancelled() {
                    MutationOutcome::skipped("cancelled")
                } else {
                    match self.apply_edit(&song, diff, cancel).await {
                        Ok(()) => MutationOutcome::Succeeded,
                        Err(e) => MutationOutcome::failed(&e),
                    }
                };
                TargetOutcome {
                    id: song.id,
                    path: song.path().to_path_buf(),
                    outcome,
                }
            })
            .buffered(self.edit_concurrency)
            .collect()
            .await;

        let summary = BulkSummary::from_outcomes(outcomes);
        tracing::info!(
            album_id,
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            "Album edit finished"
        );
        Ok(summary)
    }

    pub async fn delete_song(&self, song_id: i64) -> Result<SongDeletion> {
        self.deletion.delete_song(song_id).await
    }

    pub async fn delete_album(&self, album_id: i64) -> Result<AlbumDeletion> {
        self.deletion.delete_album(album_id).await
    }

    pub async fn ingest(
        &self,
        source_url: &str,
        target_subpath: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<IngestReceipt> {
        self.ingest.ingest(source_url, target_subpath, cancel).await
    }

    /// Rewrite one resolved song, then refresh its mtime and catalog row.
    async fn apply_edit(
        &self,
        song: &MediaFile,
        diff: &TagDiff,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let path = song.path();
        if song.missing {
            return Err(Error::missing(path));
        }
        if !path.exists() {
            tracing::warn!(id = song.id, path = %path.display(), "Song file vanished, flagging it missing");
            if let Err(e) = self.catalog.mark_missing(song.id).await {
                tracing::warn!(id = song.id, error = %e, "Failed to flag song missing");
            }
            return Err(Error::missing(path));
        }

        self.rewriter.rewrite_tags(path, diff, cancel).await?;

        if let Err(e) = rewriter::touch(path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to refresh modification time");
        }
        if let Err(e) = self.catalog.record_tag_edit(song.id, diff).await {
            tracing::warn!(id = song.id, error = %e, "Tags rewritten but catalog not updated; next scan will reconcile");
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::background::{BackgroundDispatcher, DispatcherConfig};
    use crate::config::{IngestConfig, OrphanPolicy};
    use crate::error::ErrorKind;
    use crate::path_locks::PathLocks;
    use crate::tags::TagField;
    use crate::test_utils::{MemoryCatalog, MockScanner, fake_ffmpeg, fake_fetcher, fake_tool};
    use std::path::PathBuf;
    use std::time::Duration;

    struct Fixture {
        dir: tempfile::TempDir,
        catalog: Arc<MemoryCatalog>,
        dispatcher: BackgroundDispatcher,
    }

    impl Fixture {
        fn new() -> Self {
            let catalog = Arc::new(MemoryCatalog::new());
            let dispatcher = BackgroundDispatcher::start(
                Arc::new(MockScanner::new()),
                catalog.clone(),
                DispatcherConfig::default(),
                None,
            );
            Self {
                dir: tempfile::tempdir().unwrap(),
                catalog,
                dispatcher,
            }
        }

        fn root(&self) -> PathBuf {
            self.dir.path().join("library")
        }

        fn facade_with(&self, ffmpeg: PathBuf) -> MutationFacade {
            let locks = PathLocks::new();
            MutationFacade::new(
                self.catalog.clone(),
                MetadataRewriter::new(ffmpeg, locks.clone()),
                DeletionCascade::new(
                    self.catalog.clone(),
                    locks,
                    self.root(),
                    OrphanPolicy::Deferred,
                    self.dispatcher.handle(),
                ),
                IngestCoordinator::new(
                    fake_fetcher(self.dir.path(), "Artist - Song"),
                    self.root(),
                    IngestConfig::default(),
                    self.dispatcher.handle(),
                ),
            )
        }

        fn facade(&self) -> MutationFacade {
            self.facade_with(fake_ffmpeg(self.dir.path()))
        }

        fn song(&self, album: Option<i64>, name: &str) -> (i64, PathBuf) {
            let folder = self.root().join("Album");
            std::fs::create_dir_all(&folder).unwrap();
            let path = folder.join(name);
            std::fs::write(&path, format!("{}\n", name)).unwrap();
            (self.catalog.add_song(album, &path), path)
        }
    }

    fn title(value: &str) -> TagDiff {
        TagDiff::new().with(TagField::Title, value)
    }

    fn genre(value: &str) -> TagDiff {
        TagDiff::new().with(TagField::Genre, value)
    }

    #[tokio::test]
    async fn test_edit_song_rewrites_and_records() {
        let fx = Fixture::new();
        let (id, path) = fx.song(None, "a.flac");

        fx.facade()
            .edit_song(id, &title("New"), &CancellationToken::new())
            .await
            .unwrap();

        assert!(std::fs::read_to_string(&path).unwrap().contains("title=New"));
        assert_eq!(fx.catalog.edits(), vec![(id, title("New"))]);
    }

    #[tokio::test]
    async fn test_edit_song_errors() {
        let fx = Fixture::new();
        let facade = fx.facade();
        let token = CancellationToken::new();

        let (id, _) = fx.song(None, "a.flac");
        let empty = facade.edit_song(id, &TagDiff::new(), &token).await.unwrap_err();
        assert_eq!(empty.kind(), ErrorKind::InvalidArgument);

        let unknown = facade.edit_song(404, &title("x"), &token).await.unwrap_err();
        assert_eq!(unknown.kind(), ErrorKind::NotFound);

        let flagged = fx.catalog.add_song(None, &fx.root().join("flagged.flac"));
        fx.catalog.set_missing(flagged, true);
        let err = facade.edit_song(flagged, &title("x"), &token).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceMissing);
        assert!(fx.catalog.edits().is_empty());
    }

    #[tokio::test]
    async fn test_edit_song_vanished_file_is_flagged_missing() {
        let fx = Fixture::new();
        let id = fx.catalog.add_song(None, &fx.root().join("vanished.flac"));

        let err = fx
            .facade()
            .edit_song(id, &title("x"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ResourceMissing);
        assert!(fx.catalog.song(id).unwrap().missing);
    }

    #[tokio::test]
    async fn test_catalog_refresh_failure_is_not_fatal() {
        let fx = Fixture::new();
        let (id, path) = fx.song(None, "a.flac");
        fx.catalog.fail_tag_edits();

        fx.facade()
            .edit_song(id, &title("New"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("title=New"));
    }

    #[tokio::test]
    async fn test_edit_album_partial_failure_in_catalog_order() {
        let fx = Fixture::new();
        let album = fx.catalog.add_album("Album", vec![fx.root().join("Album")]);
        let (a, _) = fx.song(Some(album), "1.flac");
        let b = fx.catalog.add_song(Some(album), &fx.root().join("Album").join("2.flac"));
        fx.catalog.set_missing(b, true);
        let c = fx.catalog.add_song(Some(album), &fx.root().join("Album").join("3.flac"));
        let (d, path_d) = fx.song(Some(album), "4.flac");

        let summary = fx
            .facade()
            .with_edit_concurrency(2)
            .edit_album(album, &genre("Same"), &CancellationToken::new())
            .await
            .unwrap();

        let ids: Vec<i64> = summary.outcomes.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![a, b, c, d]);
        assert_eq!(summary.outcomes[0].outcome, MutationOutcome::Succeeded);
        assert_eq!(summary.outcomes[1].outcome, MutationOutcome::skipped("missing"));
        assert!(matches!(
            summary.outcomes[2].outcome,
            MutationOutcome::Failed {
                kind: ErrorKind::ResourceMissing,
                ..
            }
        ));
        assert_eq!(summary.outcomes[3].outcome, MutationOutcome::Succeeded);
        assert_eq!(summary.status, crate::outcome::BulkStatus::PartialFailure);
        assert!(std::fs::read_to_string(path_d).unwrap().contains("genre=Same"));
    }

    #[tokio::test]
    async fn test_edit_album_errors() {
        let fx = Fixture::new();
        let facade = fx.facade();
        let token = CancellationToken::new();
        let album = fx.catalog.add_album("Empty", vec![]);

        let err = facade.edit_album(album, &genre("x"), &token).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let (_, _) = fx.song(Some(album), "1.flac");
        let err = facade
            .edit_album(album, &TagDiff::new(), &token)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_edit_album_applies_only_album_fields() {
        let fx = Fixture::new();
        let token = CancellationToken::new();
        let album = fx.catalog.add_album("Album", vec![]);
        let (id, path) = fx.song(Some(album), "1.flac");
        let mixed = TagDiff::new()
            .with(TagField::Title, "Clobbered")
            .with(TagField::TrackNumber, "9")
            .with(TagField::Genre, "Jazz");

        let summary = fx.facade().edit_album(album, &mixed, &token).await.unwrap();

        assert_eq!(summary.succeeded, 1);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("genre=Jazz"));
        assert!(!contents.contains("title="));
        assert!(!contents.contains("track="));
        assert_eq!(fx.catalog.edits(), vec![(id, genre("Jazz"))]);

        let err = fx
            .facade()
            .edit_album(album, &title("Only"), &token)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_delete_waits_for_rewrite_of_same_file() {
        let fx = Fixture::new();
        let log = fx.dir.path().join("events.log");
        let tool = fake_tool(
            fx.dir.path(),
            "ffmpeg",
            &format!(
                r#"echo start >> "{log}"
in=""; prev=""
for arg; do
  [ "$prev" = "-i" ] && in="$arg"
  prev="$arg"; last="$arg"
done
sleep 0.5
cp "$in" "$last"
echo end >> "{log}""#,
                log = log.display()
            ),
        );
        let (id, path) = fx.song(None, "a.flac");
        let facade = fx.facade_with(tool);

        let edit = {
            let facade = facade.clone();
            tokio::spawn(async move {
                facade
                    .edit_song(id, &title("New"), &CancellationToken::new())
                    .await
            })
        };
        tokio::time::timeout(Duration::from_secs(5), async {
            while !log.exists() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("rewrite tool did not start");

        let deleted = facade.delete_song(id).await.unwrap();

        assert_eq!(std::fs::read_to_string(&log).unwrap(), "start\nend\n");
        assert_eq!(deleted.file, crate::deletion::FileRemoval::Removed);
        assert!(!path.exists());
        assert!(!rewriter::temp_path_for(&path).exists());
        edit.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_edit_album_cancellation_skips_unstarted_songs() {
        let fx = Fixture::new();
        let tool = fake_tool(
            fx.dir.path(),
            "ffmpeg",
            r#"for last; do :; done
echo partial > "$last"
exec sleep 30"#,
        );
        let album = fx.catalog.add_album("Album", vec![]);
        let ids: Vec<i64> = (1..=4)
            .map(|n| fx.song(Some(album), &format!("{}.flac", n)).0)
            .collect();

        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let summary = tokio::time::timeout(
            Duration::from_secs(10),
            fx.facade_with(tool)
                .with_edit_concurrency(1)
                .edit_album(album, &genre("x"), &token),
        )
        .await
        .expect("cancellation should end the batch")
        .unwrap();

        assert_eq!(summary.outcomes.len(), ids.len());
        assert!(matches!(
            summary.outcomes[0].outcome,
            MutationOutcome::Failed {
                kind: ErrorKind::Cancelled,
                ..
            }
        ));
        for target in &summary.outcomes[1..] {
            assert_eq!(target.outcome, MutationOutcome::skipped("cancelled"));
        }
    }

    #[tokio::test]
    async fn test_delete_and_ingest_delegate() {
        let fx = Fixture::new();
        let facade = fx.facade();
        let album = fx.catalog.add_album("Album", vec![fx.root().join("Album")]);
        let (a, path_a) = fx.song(Some(album), "1.flac");
        let (b, _) = fx.song(Some(album), "2.flac");

        let deleted = facade.delete_song(a).await.unwrap();
        assert_eq!(deleted.id, a);
        assert!(!path_a.exists());

        let album_result = facade.delete_album(album).await.unwrap();
        assert_eq!(album_result.songs.outcomes[0].id, b);
        assert!(!fx.catalog.contains_album(album));

        let receipt = facade
            .ingest("https://x.test/v", None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(receipt.filename, "Artist - Song.mp3");
    }
}
