//! Bounded job scheduler: a concurrency cap and an admission-rate cap.
//!
//! Jobs are queued on an unbounded channel and admitted by a single
//! dispatcher task, strictly in submission order. A job is admitted once a
//! concurrency permit is free *and* the sliding rate window has room; it then
//! runs on its own Tokio task, so a slow or failing job never holds up
//! anything but its own permit.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::time::Instant;

use crate::config::GenOptions;
use crate::error::{PipelineError, PipelineResult};

/// Admission limits for a [`Scheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerLimits {
    /// Maximum jobs running at once
    pub concurrency: usize,
    /// Maximum jobs admitted within any `rate_window`
    pub rate_limit: usize,
    pub rate_window: Duration,
}

impl Default for SchedulerLimits {
    fn default() -> Self {
        Self {
            concurrency: 10,
            rate_limit: 10,
            rate_window: Duration::from_millis(1000),
        }
    }
}

impl From<&GenOptions> for SchedulerLimits {
    fn from(options: &GenOptions) -> Self {
        Self {
            concurrency: options.concurrency,
            rate_limit: options.rate_limit,
            rate_window: options.rate_window,
        }
    }
}

type QueuedJob = BoxFuture<'static, ()>;

/// Runs submitted jobs under a concurrency ceiling and a rate ceiling.
///
/// Cloning is cheap; clones share the same queue and limits.
#[derive(Clone)]
pub struct Scheduler {
    queue: mpsc::UnboundedSender<QueuedJob>,
    limits: Arc<SchedulerLimits>,
}

impl Scheduler {
    /// Create a scheduler and spawn its dispatcher on the current runtime.
    ///
    /// Fails if called outside a Tokio runtime.
    pub fn new(limits: SchedulerLimits) -> PipelineResult<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PipelineError::Runtime(e.to_string()))?;
        let (tx, rx) = mpsc::unbounded_channel();
        runtime.spawn(dispatch(rx, limits.clone()));

        tracing::debug!(
            concurrency = limits.concurrency,
            rate_limit = limits.rate_limit,
            rate_window_ms = limits.rate_window.as_millis() as u64,
            "Scheduler started"
        );

        Ok(Self {
            queue: tx,
            limits: Arc::new(limits),
        })
    }

    pub fn limits(&self) -> &SchedulerLimits {
        &self.limits
    }

    /// Queue a job and return a handle resolving to its output.
    ///
    /// Enqueueing is synchronous: jobs submitted one after another are
    /// admitted in that order. Dropping the handle does not cancel the job.
    pub fn submit<F, T>(&self, job: F) -> JobHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let task: QueuedJob = Box::pin(async move {
            // A closed receiver only means the caller stopped listening.
            let _ = tx.send(job.await);
        });

        if self.queue.send(task).is_err() {
            tracing::warn!("Scheduler dispatcher has stopped; job dropped");
        }

        JobHandle { rx }
    }
}

/// Resolves to the output of one submitted job.
pub struct JobHandle<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for JobHandle<T> {
    type Output = PipelineResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map_err(|_| PipelineError::Scheduler("job dropped before completing".to_string()))
    }
}

/// Admit queued jobs in order, one permit and one rate slot each.
async fn dispatch(mut queue: mpsc::UnboundedReceiver<QueuedJob>, limits: SchedulerLimits) {
    let permits = Arc::new(Semaphore::new(limits.concurrency));
    let mut window = RateWindow::new(limits.rate_limit, limits.rate_window);

    while let Some(job) = queue.recv().await {
        let permit = match permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!("Scheduler semaphore closed unexpectedly");
                break;
            }
        };
        window.admit().await;

        tokio::spawn(async move {
            job.await;
            drop(permit);
        });
    }

    tracing::trace!("Scheduler queue closed");
}

/// Sliding window over the most recent admission instants.
struct RateWindow {
    limit: usize,
    window: Duration,
    admitted: VecDeque<Instant>,
}

impl RateWindow {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            admitted: VecDeque::with_capacity(limit),
        }
    }

    /// Wait until one more admission keeps at most `limit` inside the window.
    async fn admit(&mut self) {
        if self.admitted.len() >= self.limit {
            if let Some(oldest) = self.admitted.pop_front() {
                tokio::time::sleep_until(oldest + self.window).await;
            }
        }
        self.admitted.push_back(Instant::now());
    }
}
