//! Spammer - races several submissions of the same operation and keeps the first success.
//!
//! Attempts are spawned `interval_ms` apart without waiting for earlier ones to finish.
//! Spawned attempts are never cancelled; once a winner exists no new attempt is spawned,
//! and results of attempts that succeed afterwards are kept for reconciliation.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::task::errors::TaskError;

const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(30);
const PENDING_LOG_INTERVAL: Duration = Duration::from_secs(3);

/// A named race configuration.
pub struct SpammerInput<F> {
    pub identifier: String,
    pub interval_ms: u64,
    pub spam_count: usize,
    /// Produces the attempt with the given index
    pub spam_fn: F,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpamProgress {
    pub spawned: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl SpamProgress {
    pub fn pending(&self) -> usize {
        self.spawned.saturating_sub(self.succeeded + self.failed)
    }
}

struct RaceResults<T> {
    winner: Option<T>,
    claimed: bool,
    late: Vec<T>,
}

struct Shared<T> {
    spawned: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    results: Mutex<RaceResults<T>>,
    notify: Notify,
}

impl<T> Shared<T> {
    fn results(&self) -> MutexGuard<'_, RaceResults<T>> {
        self.results.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn progress(&self) -> SpamProgress {
        SpamProgress {
            spawned: self.spawned.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

/// Single-race executor. Create one per raced operation.
pub struct Spammer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> Default for Spammer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Spammer<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                spawned: AtomicUsize::new(0),
                succeeded: AtomicUsize::new(0),
                failed: AtomicUsize::new(0),
                results: Mutex::new(RaceResults {
                    winner: None,
                    claimed: false,
                    late: Vec::new(),
                }),
                notify: Notify::new(),
            }),
        }
    }

    pub fn progress(&self) -> SpamProgress {
        self.shared.progress()
    }

    /// Resolves with the first attempt to complete successfully, or fails with
    /// `AllAttemptsFailed` once every attempt has completed with an error.
    pub async fn start_spamming<F, Fut, E>(&self, input: SpammerInput<F>) -> Result<T, TaskError>
    where
        F: Fn(usize) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let SpammerInput {
            identifier,
            interval_ms,
            spam_count,
            spam_fn,
        } = input;
        let interval = Duration::from_millis(interval_ms);
        let _progress_logger = self.spawn_progress_logger(identifier.clone());

        info!("Spamming {}: up to {} attempts every {}ms", identifier, spam_count, interval_ms);
        for index in 0..spam_count {
            if index > 0 {
                sleep(interval).await;
            }
            if let Some(winner) = self.claim_winner() {
                info!("{} succeeded after spawning {} attempts", identifier, index);
                return Ok(winner);
            }
            self.spawn_attempt(identifier.clone(), index, spam_fn(index));
        }

        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(winner) = self.claim_winner() {
                info!("{} succeeded after spawning all {} attempts", identifier, spam_count);
                return Ok(winner);
            }
            if self.shared.progress().pending() == 0 {
                warn!("All {} attempts of {} failed", spam_count, identifier);
                return Err(TaskError::AllAttemptsFailed { identifier });
            }
            notified.await;
        }
    }

    /// Waits until every spawned attempt has completed.
    pub async fn wait_for_pending_tasks(&self) {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let progress = self.shared.progress();
            if progress.pending() == 0 {
                return;
            }
            if timeout(PENDING_LOG_INTERVAL, notified).await.is_err() {
                info!("Waiting for {} pending spam attempts", progress.pending());
            }
        }
    }

    /// Successful results other than the one returned by `start_spamming`.
    pub fn take_late_results(&self) -> Vec<T> {
        let mut results = self.shared.results();
        let mut late = std::mem::take(&mut results.late);
        // A winner nobody claimed (the race returned an error first) is late too.
        if let Some(unclaimed) = results.winner.take() {
            late.insert(0, unclaimed);
        }
        late
    }

    fn claim_winner(&self) -> Option<T> {
        let mut results = self.shared.results();
        let winner = results.winner.take();
        if winner.is_some() {
            results.claimed = true;
        }
        winner
    }

    fn spawn_attempt<Fut, E>(&self, identifier: String, index: usize, attempt: Fut)
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let shared = self.shared.clone();
        shared.spawned.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            match attempt.await {
                Ok(value) => {
                    {
                        let mut results = shared.results();
                        if results.claimed || results.winner.is_some() {
                            results.late.push(value);
                        } else {
                            results.winner = Some(value);
                        }
                    }
                    shared.succeeded.fetch_add(1, Ordering::SeqCst);
                    debug!("{} attempt #{} succeeded", identifier, index);
                }
                Err(e) => {
                    shared.failed.fetch_add(1, Ordering::SeqCst);
                    warn!("{} attempt #{} failed: {}", identifier, index, e);
                }
            }
            shared.notify.notify_waiters();
        });
    }

    /// Logs race progress until the returned sender is dropped.
    fn spawn_progress_logger(&self, identifier: String) -> oneshot::Sender<()> {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let shared = self.shared.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = sleep(PROGRESS_LOG_INTERVAL) => {
                        let progress = shared.progress();
                        info!(
                            "{} progress: spawned {}, succeeded {}, failed {}",
                            identifier, progress.spawned, progress.succeeded, progress.failed
                        );
                    }
                }
            }
        });
        stop_tx
    }
}
