//! Per-document polling jobs and their snapshots.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use docwatch_core::{CommentFetcher, CommentSnapshot, DocumentId, ReplyDispatcher};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, Mutex as AsyncMutex};

use crate::diff::diff_snapshots;
use crate::scheduler::{TickScheduler, Ticker};


#[derive(Debug, Error, PartialEq, Eq)]
pub enum MonitorError {
    #[error("monitor interval must be greater than zero")]
    InvalidInterval,
    #[error("monitor scheduling requires an active Tokio runtime")]
    RuntimeUnavailable,
    #[error("document '{0}' is not monitored")]
    NotFound(DocumentId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorStart {
    pub document_id: DocumentId,
    pub interval_ms: u64,
    /// True when an existing job for the document was replaced.
    pub restarted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped,
    NotFound,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub fetched_replies: usize,
    pub new_replies: usize,
    pub dispatched: usize,
    pub failed_dispatches: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
/// Result of one poll tick.
pub enum TickOutcome {
    /// First successful fetch of a job; nothing is reported as new.
    Baseline { fetched_replies: usize },
    Polled(TickReport),
    /// Fetch failed; the stored snapshot was left untouched.
    FetchFailed { error: String },
    /// The job was stopped or replaced while the tick was in flight.
    Discarded,
}

struct MonitorJob {
    generation: u64,
    interval: Duration,
    last_snapshot: Option<CommentSnapshot>,
    tick_gate: Arc<AsyncMutex<()>>,
    cancel_tx: watch::Sender<bool>,
}

struct RegistryInner {
    fetcher: Arc<dyn CommentFetcher>,
    dispatcher: Arc<dyn ReplyDispatcher>,
    scheduler: Arc<dyn TickScheduler>,
    jobs: Mutex<HashMap<DocumentId, MonitorJob>>,
    next_generation: AtomicU64,
}

#[derive(Clone)]
/// Owns every monitor job. Cloning shares the same job table.
pub struct MonitorRegistry {
    inner: Arc<RegistryInner>,
}

impl MonitorRegistry {
    pub fn new(
        fetcher: Arc<dyn CommentFetcher>,
        dispatcher: Arc<dyn ReplyDispatcher>,
        scheduler: Arc<dyn TickScheduler>,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                fetcher,
                dispatcher,
                scheduler,
                jobs: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Starts (or restarts) monitoring `document_id`.
    ///
    /// A restart discards the previous job's snapshot, so the next successful
    /// poll is a fresh baseline. Returns as soon as the job loop is spawned.
    pub fn start(
        &self,
        document_id: DocumentId,
        interval: Duration,
    ) -> Result<MonitorStart, MonitorError> {
        if interval.is_zero() {
            return Err(MonitorError::InvalidInterval);
        }
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| MonitorError::RuntimeUnavailable)?;

        let generation = self
            .inner
            .next_generation
            .fetch_add(1, Ordering::Relaxed)
            .saturating_add(1);
        let ticker = self.inner.scheduler.ticker(&document_id, interval);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let tick_gate = Arc::new(AsyncMutex::new(()));

        let restarted = {
            let mut jobs = self.inner.lock_jobs();
            let previous = jobs.insert(
                document_id.clone(),
                MonitorJob {
                    generation,
                    interval,
                    last_snapshot: None,
                    tick_gate: Arc::clone(&tick_gate),
                    cancel_tx,
                },
            );
            match previous {
                Some(previous) => {
                    let _ = previous.cancel_tx.send(true);
                    true
                }
                None => false,
            }
        };

        runtime.spawn(run_job_loop(
            Arc::clone(&self.inner),
            document_id.clone(),
            generation,
            ticker,
            cancel_rx,
            tick_gate,
        ));

        let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            document_id = %document_id,
            interval_ms,
            restarted,
            "monitor started"
        );
        Ok(MonitorStart {
            document_id,
            interval_ms,
            restarted,
        })
    }

    /// Cancels future ticks and drops the job's snapshot.
    pub fn stop(&self, document_id: &DocumentId) -> StopOutcome {
        let removed = self.inner.lock_jobs().remove(document_id);
        match removed {
            Some(job) => {
                let _ = job.cancel_tx.send(true);
                tracing::info!(document_id = %document_id, "monitor stopped");
                StopOutcome::Stopped
            }
            None => {
                tracing::debug!(document_id = %document_id, "monitor stop requested for unknown document");
                StopOutcome::NotFound
            }
        }
    }

    /// Stops every job and returns how many were running.
    pub fn stop_all(&self) -> usize {
        let drained = self.inner.lock_jobs().drain().collect::<Vec<_>>();
        for (_, job) in &drained {
            let _ = job.cancel_tx.send(true);
        }
        if !drained.is_empty() {
            tracing::info!(stopped = drained.len(), "all monitors stopped");
        }
        drained.len()
    }

    pub fn list(&self) -> Vec<DocumentId> {
        let mut ids = self.inner.lock_jobs().keys().cloned().collect::<Vec<_>>();
        ids.sort();
        ids
    }

    pub fn interval(&self, document_id: &DocumentId) -> Option<Duration> {
        self.inner
            .lock_jobs()
            .get(document_id)
            .map(|job| job.interval)
    }

    /// Copy of the stored snapshot, for inspection only.
    pub fn snapshot(&self, document_id: &DocumentId) -> Option<CommentSnapshot> {
        self.inner
            .lock_jobs()
            .get(document_id)
            .and_then(|job| job.last_snapshot.clone())
    }

    /// Runs one tick right now, serialized with the job's scheduled ticks.
    pub async fn poll_now(&self, document_id: &DocumentId) -> Result<TickOutcome, MonitorError> {
        let (generation, tick_gate) = self
            .inner
            .lock_jobs()
            .get(document_id)
            .map(|job| (job.generation, Arc::clone(&job.tick_gate)))
            .ok_or_else(|| MonitorError::NotFound(document_id.clone()))?;
        Ok(self
            .inner
            .run_tick(document_id, generation, &tick_gate)
            .await)
    }
}

impl RegistryInner {
    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<DocumentId, MonitorJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the job if it still belongs to `generation`.
    fn current_snapshot(
        &self,
        document_id: &DocumentId,
        generation: u64,
    ) -> Option<Option<CommentSnapshot>> {
        self.lock_jobs()
            .get(document_id)
            .filter(|job| job.generation == generation)
            .map(|job| job.last_snapshot.clone())
    }

    /// Replaces the snapshot unless the job was stopped or replaced.
    fn commit_snapshot(
        &self,
        document_id: &DocumentId,
        generation: u64,
        snapshot: CommentSnapshot,
    ) -> bool {
        let mut jobs = self.lock_jobs();
        match jobs
            .get_mut(document_id)
            .filter(|job| job.generation == generation)
        {
            Some(job) => {
                job.last_snapshot = Some(snapshot);
                true
            }
            None => false,
        }
    }

    async fn run_tick(
        &self,
        document_id: &DocumentId,
        generation: u64,
        tick_gate: &AsyncMutex<()>,
    ) -> TickOutcome {
        let _gate = tick_gate.lock().await;

        let Some(previous) = self.current_snapshot(document_id, generation) else {
            return TickOutcome::Discarded;
        };

        let current = match self.fetcher.fetch(document_id).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                tracing::warn!(
                    document_id = %document_id,
                    error = %error,
                    "comment fetch failed; skipping tick"
                );
                return TickOutcome::FetchFailed {
                    error: error.to_string(),
                };
            }
        };

        let fetched_replies = current.reply_count();
        let new_replies = diff_snapshots(document_id, previous.as_ref(), &current);
        let is_baseline = previous.is_none();

        // Commit before dispatch: a failing dispatch must not be re-detected.
        if !self.commit_snapshot(document_id, generation, current) {
            tracing::debug!(
                document_id = %document_id,
                "monitor job changed during tick; discarding fetched snapshot"
            );
            return TickOutcome::Discarded;
        }

        if is_baseline {
            tracing::info!(
                document_id = %document_id,
                fetched_replies,
                "monitor baseline captured"
            );
            return TickOutcome::Baseline { fetched_replies };
        }

        let mut report = TickReport {
            fetched_replies,
            new_replies: new_replies.len(),
            ..TickReport::default()
        };
        for new_reply in &new_replies {
            tracing::info!(
                document_id = %document_id,
                comment_id = %new_reply.comment_id,
                reply_id = %new_reply.reply_id(),
                author = %new_reply.reply.author,
                "new comment reply detected"
            );
            match self.dispatcher.dispatch(new_reply).await {
                Ok(()) => report.dispatched = report.dispatched.saturating_add(1),
                Err(error) => {
                    report.failed_dispatches = report.failed_dispatches.saturating_add(1);
                    tracing::error!(
                        document_id = %document_id,
                        reply_id = %new_reply.reply_id(),
                        error = %error,
                        "reply dispatch failed"
                    );
                }
            }
        }

        tracing::info!(
            document_id = %document_id,
            fetched = report.fetched_replies,
            new = report.new_replies,
            dispatched = report.dispatched,
            failed = report.failed_dispatches,
            "monitor poll"
        );
        TickOutcome::Polled(report)
    }
}

async fn run_job_loop(
    inner: Arc<RegistryInner>,
    document_id: DocumentId,
    generation: u64,
    mut ticker: Box<dyn Ticker>,
    mut cancel_rx: watch::Receiver<bool>,
    tick_gate: Arc<AsyncMutex<()>>,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel_rx.changed() => break,
            fired = ticker.tick() => {
                if !fired {
                    break;
                }
            }
        }
        if *cancel_rx.borrow() {
            break;
        }
        // The tick itself is not raced against cancellation so an in-flight
        // poll always finishes its snapshot bookkeeping.
        let _ = inner.run_tick(&document_id, generation, &tick_gate).await;
    }
    tracing::debug!(document_id = %document_id, generation, "monitor loop exited");
}
