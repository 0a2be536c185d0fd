//! Background job dispatcher.
//!
//! Work that a request starts but does not wait for (the rescan after an
//! ingest, a garbage-collection pass) is queued here. Jobs run on a single
//! worker task under the dispatcher's own cancellation token, so cancelling
//! the request that queued them has no effect on them.
//!
//! Queued rescans are coalesced: a burst of ingests produces one scan, which
//! is a full scan if any of the requests asked for one.
//!
//! # Usage
//!
//! ```ignore
//! let (events_tx, events) = mpsc::channel(16);
//! let dispatcher = BackgroundDispatcher::start(scanner, catalog, config, Some(events_tx));
//! dispatcher.handle().submit(BackgroundJob::Rescan { full: false });
//! // ...
//! dispatcher.shutdown().await; // drains the queue; `abort()` cancels instead
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::catalog::Catalog;
use crate::scanner::Scanner;

/// Configuration for the dispatcher (`[background]` in the config file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// How many jobs may wait in the queue (default: 32)
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { queue_capacity: 32 }
    }
}

/// Work the dispatcher knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum BackgroundJob {
    /// Reconcile the catalog with the library on disk
    Rescan { full: bool },
    /// Purge albums and artists nothing references
    CollectGarbage,
}

/// Events emitted by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatcherEvent {
    JobFinished(BackgroundJob),
    JobFailed { job: BackgroundJob, error: String },
}

/// Cheap, cloneable handle for queueing jobs.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<BackgroundJob>,
}

impl DispatcherHandle {
    /// Queue a job without waiting.
    ///
    /// Returns `false` (and logs) if the queue is full or the dispatcher has
    /// shut down.
    pub fn submit(&self, job: BackgroundJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => {
                tracing::debug!(target: "background", ?job, "Job queued");
                true
            }
            Err(TrySendError::Full(job)) => {
                tracing::warn!(target: "background", ?job, "Job queue full, dropping job");
                false
            }
            Err(TrySendError::Closed(job)) => {
                tracing::warn!(target: "background", ?job, "Dispatcher stopped, dropping job");
                false
            }
        }
    }
}

/// Owns the worker task. Dropping it without [`shutdown`](Self::shutdown)
/// leaves the worker running until every handle is gone.
pub struct BackgroundDispatcher {
    handle: DispatcherHandle,
    stop: CancellationToken,
    jobs_cancel: CancellationToken,
    worker: JoinHandle<()>,
}

impl BackgroundDispatcher {
    /// Start a dispatcher, optionally reporting job results on `events`.
    pub fn start(
        scanner: Arc<dyn Scanner>,
        catalog: Arc<dyn Catalog>,
        config: DispatcherConfig,
        events: Option<mpsc::Sender<DispatcherEvent>>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let stop = CancellationToken::new();
        let jobs_cancel = CancellationToken::new();

        let worker = Worker {
            scanner,
            catalog,
            event_tx: events,
            cancel: jobs_cancel.clone(),
        };
        let worker = tokio::spawn(worker.run(rx, stop.clone()));

        Self {
            handle: DispatcherHandle { tx },
            stop,
            jobs_cancel,
            worker,
        }
    }

    pub fn handle(&self) -> DispatcherHandle {
        self.handle.clone()
    }

    /// Stop accepting jobs, run everything already queued and wait for the
    /// worker to finish.
    pub async fn shutdown(self) {
        self.stop.cancel();
        if let Err(e) = self.worker.await {
            tracing::error!(target: "background", error = %e, "Dispatcher worker panicked");
        }
    }

    /// Like [`shutdown`](Self::shutdown), but also cancels the running job.
    /// Queued jobs are dropped instead of run.
    pub async fn abort(self) {
        self.jobs_cancel.cancel();
        self.shutdown().await;
    }
}

struct Worker {
    scanner: Arc<dyn Scanner>,
    catalog: Arc<dyn Catalog>,
    event_tx: Option<mpsc::Sender<DispatcherEvent>>,
    cancel: CancellationToken,
}

impl Worker {
    /// Main run loop.
    async fn run(self, mut rx: mpsc::Receiver<BackgroundJob>, stop: CancellationToken) {
        tracing::info!(target: "background", "Dispatcher started");

        let mut pending: Option<BackgroundJob> = None;
        let mut draining = false;

        loop {
            let next = match pending.take() {
                Some(job) => Some(job),
                None if draining => rx.recv().await,
                None => {
                    tokio::select! {
                        job = rx.recv() => job,
                        _ = stop.cancelled() => {
                            // No new jobs; whatever is buffered still runs.
                            rx.close();
                            draining = true;
                            continue;
                        }
                    }
                }
            };
            let Some(job) = next else {
                break;
            };

            let job = match job {
                BackgroundJob::Rescan { mut full } => {
                    // Fold queued rescans into this one.
                    while let Ok(queued) = rx.try_recv() {
                        match queued {
                            BackgroundJob::Rescan { full: f } => full |= f,
                            other => {
                                pending = Some(other);
                                break;
                            }
                        }
                    }
                    BackgroundJob::Rescan { full }
                }
                other => other,
            };

            self.execute(job).await;
        }

        tracing::info!(target: "background", "Dispatcher stopped");
    }

    async fn execute(&self, job: BackgroundJob) {
        if self.cancel.is_cancelled() {
            tracing::debug!(target: "background", ?job, "Dispatcher aborted, skipping job");
            return;
        }

        let result = match job {
            BackgroundJob::Rescan { full } => self
                .scanner
                .scan_all(&self.cancel, full)
                .await
                .map(|stats| {
                    tracing::info!(
                        target: "background",
                        updated = stats.updated,
                        missing = stats.missing,
                        errors = stats.errors,
                        "Rescan finished"
                    );
                }),
            BackgroundJob::CollectGarbage => {
                self.catalog.run_garbage_collection().await.map(|stats| {
                    tracing::info!(
                        target: "background",
                        albums = stats.albums_removed,
                        artists = stats.artists_removed,
                        "Garbage collection finished"
                    );
                })
            }
        };

        match result {
            Ok(()) => self.emit(DispatcherEvent::JobFinished(job)),
            Err(e) => {
                tracing::warn!(target: "background", ?job, error = %e, "Background job failed");
                self.emit(DispatcherEvent::JobFailed {
                    job,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Report to the observer without ever blocking the worker on it.
    fn emit(&self, event: DispatcherEvent) {
        if let Some(tx) = &self.event_tx {
            if let Err(e) = tx.try_send(event) {
                tracing::debug!(target: "background", error = %e, "Dropping dispatcher event");
            }
        }
    }
}
