//! Paced FIFO job queue.
//!
//! Jobs are admitted in call order, run one at a time (or `N` at a time with
//! [`PacedQueue::with_concurrency`]), and no two consecutive starts are closer
//! together than the configured minimum interval.
//!
//! A job first wins a slot, then waits out whatever is left of the interval.
//! The start instant is reserved under the queue lock at the moment the slot
//! is granted, so a job further back in line can never use the pacing delay
//! to overtake one ahead of it.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, trace};

use crate::error::LimiterError;
use crate::handle::JobHandle;
use crate::types::{JobId, QueueStats};

/// Serializes and paces asynchronous jobs.
///
/// Cloning is cheap and every clone drives the same queue. Pass the queue
/// explicitly to whatever needs outbound pacing.
#[derive(Clone)]
pub struct PacedQueue {
    shared: Arc<Shared>,
}

struct Shared {
    min_interval: Duration,
    slots: NonZeroUsize,
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    next_id: u64,
    /// Start instant most recently handed out. Never decreases.
    last_start: Option<Instant>,
    running: HashSet<JobId>,
    waiting: VecDeque<Waiter>,
    submitted: u64,
    succeeded: u64,
    failed: u64,
}

struct Waiter {
    id: JobId,
    release: oneshot::Sender<Instant>,
}

impl fmt::Debug for PacedQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacedQueue")
            .field("min_interval", &self.shared.min_interval)
            .field("concurrency", &self.shared.slots)
            .field("state", &"<Mutex<QueueState>>")
            .finish()
    }
}

impl PacedQueue {
    /// Single-slot queue. `Duration::ZERO` turns pacing off and leaves plain
    /// mutual exclusion.
    pub fn new(min_interval: Duration) -> Self {
        Self::with_concurrency(min_interval, NonZeroUsize::MIN)
    }

    /// Queue that lets up to `slots` jobs hold a slot at once. Starts are
    /// still spaced by `min_interval`.
    pub fn with_concurrency(min_interval: Duration, slots: NonZeroUsize) -> Self {
        Self {
            shared: Arc::new(Shared {
                min_interval,
                slots,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    #[inline]
    pub fn min_interval(&self) -> Duration {
        self.shared.min_interval
    }

    #[inline]
    pub fn concurrency(&self) -> usize {
        self.shared.slots.get()
    }

    /// Snapshot of the queue's counters.
    pub fn stats(&self) -> QueueStats {
        let state = self.shared.lock();
        QueueStats {
            min_interval: self.shared.min_interval,
            concurrency: self.shared.slots.get(),
            waiting: state.waiting.len(),
            running: state.running.len(),
            submitted: state.submitted,
            succeeded: state.succeeded,
            failed: state.failed,
        }
    }

    /// Admit `job` and return a handle to its outcome.
    ///
    /// Admission happens before this returns, so jobs submitted earlier always
    /// start no later than jobs submitted after them. The job body runs on a
    /// spawned Tokio task.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn submit<F, Fut, T, E>(&self, job: F) -> JobHandle<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let (id, phase) = self.shared.admit();
        let mut ticket = Ticket {
            shared: Arc::clone(&self.shared),
            id,
            phase,
            succeeded: false,
        };

        let task = tokio::spawn(async move {
            let start_at = match ticket.admitted().await {
                Ok(at) => at,
                Err(err) => {
                    error!(job = %id, error = %err, "paced queue bookkeeping is corrupt");
                    panic!("{err}");
                }
            };

            let delay = start_at.saturating_duration_since(Instant::now());
            if !delay.is_zero() {
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                trace!(job = %id, delay_ms, "waiting out pacing interval");
                tokio::time::sleep_until(start_at).await;
            }

            debug!(job = %id, "job started");
            let outcome = job().await;
            ticket.succeeded = outcome.is_ok();
            debug!(job = %id, succeeded = ticket.succeeded, "job finished");

            // Hand the slot on before the caller sees the result.
            drop(ticket);
            outcome
        });

        JobHandle::new(id, task)
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self) -> (JobId, Phase) {
        let mut state = self.lock();
        let id = JobId(state.next_id);
        state.next_id += 1;
        state.submitted += 1;

        if state.waiting.is_empty() && state.running.len() < self.slots.get() {
            state.running.insert(id);
            let start_at = self.reserve_start(&mut state);
            debug!(job = %id, "job admitted without waiting");
            (id, Phase::Admitted(start_at))
        } else {
            let (release, rx) = oneshot::channel();
            state.waiting.push_back(Waiter { id, release });
            debug!(job = %id, position = state.waiting.len(), "job queued");
            (id, Phase::Queued(rx))
        }
    }

    fn reserve_start(&self, state: &mut QueueState) -> Instant {
        let start_at = self.next_start(state);
        state.last_start = Some(start_at);
        start_at
    }

    /// Earliest start the next job may have. Saturates instead of
    /// overflowing when the interval is huge.
    fn next_start(&self, state: &QueueState) -> Instant {
        let now = Instant::now();
        match state.last_start {
            Some(last) => last
                .checked_add(self.min_interval)
                .unwrap_or_else(|| far_future(last.max(now)))
                .max(now),
            None => now,
        }
    }

    fn complete(&self, id: JobId, succeeded: bool) -> Result<(), LimiterError> {
        let mut state = self.lock();
        if !state.running.remove(&id) {
            return Err(LimiterError::NotRunning(id));
        }
        if succeeded {
            state.succeeded += 1;
        } else {
            state.failed += 1;
        }
        self.release_waiters(&mut state);
        Ok(())
    }

    /// Drop a job whose task went away before it was seen to start.
    fn withdraw(&self, id: JobId) {
        let mut state = self.lock();
        if let Some(pos) = state.waiting.iter().position(|w| w.id == id) {
            state.waiting.remove(pos);
            debug!(job = %id, "queued job withdrawn");
            return;
        }
        // Released, but the task never observed it.
        if state.running.remove(&id) {
            debug!(job = %id, "released job withdrawn");
            self.release_waiters(&mut state);
        }
    }

    fn release_waiters(&self, state: &mut QueueState) {
        while state.running.len() < self.slots.get() {
            let Some(waiter) = state.waiting.pop_front() else {
                break;
            };
            let start_at = self.next_start(state);
            if waiter.release.send(start_at).is_err() {
                debug!(job = %waiter.id, "waiter went away before release");
                continue;
            }
            state.running.insert(waiter.id);
            state.last_start = Some(start_at);
            debug!(job = %waiter.id, "job released");
        }
    }
}

/// Roughly thirty years past `from`, or `from` itself if even that overflows.
fn far_future(from: Instant) -> Instant {
    from.checked_add(FAR_FUTURE).unwrap_or(from)
}

const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

enum Phase {
    Queued(oneshot::Receiver<Instant>),
    Admitted(Instant),
}

/// Owns one job's place in the queue. Dropping it gives the place back.
struct Ticket {
    shared: Arc<Shared>,
    id: JobId,
    phase: Phase,
    succeeded: bool,
}

impl Ticket {
    async fn admitted(&mut self) -> Result<Instant, LimiterError> {
        let id = self.id;
        let start_at = match &mut self.phase {
            Phase::Admitted(at) => return Ok(*at),
            Phase::Queued(rx) => rx.await.map_err(|_| LimiterError::ReleaseDropped(id))?,
        };
        self.phase = Phase::Admitted(start_at);
        Ok(start_at)
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        match self.phase {
            Phase::Queued(_) => self.shared.withdraw(self.id),
            Phase::Admitted(_) => {
                if let Err(err) = self.shared.complete(self.id, self.succeeded) {
                    error!(job = %self.id, error = %err, "paced queue bookkeeping is corrupt");
                    if !std::thread::panicking() {
                        panic!("{err}");
                    }
                }
            }
        }
    }
}
