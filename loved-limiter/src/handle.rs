//! Caller-side handle for a submitted job.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::task::JoinHandle;

use crate::types::JobId;

/// Resolves with the job's own outcome once the queue has run it.
///
/// Dropping the handle does not withdraw the job; the queue still runs it in
/// its turn and discards the result.
///
/// # Panics
///
/// Awaiting the handle resumes the job's panic if the job body panicked, and
/// panics if the runtime was shut down before the job finished.
pub struct JobHandle<T, E> {
    id: JobId,
    task: JoinHandle<Result<T, E>>,
}

impl<T, E> JobHandle<T, E> {
    pub(crate) fn new(id: JobId, task: JoinHandle<Result<T, E>>) -> Self {
        Self { id, task }
    }

    /// Identity the queue assigned at submission.
    #[inline]
    pub fn id(&self) -> JobId {
        self.id
    }

    /// True once the job has run to completion (or panicked).
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<T, E> fmt::Debug for JobHandle<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id)
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

impl<T, E> Future for JobHandle<T, E> {
    type Output = Result<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        match ready!(Pin::new(&mut self.task).poll(cx)) {
            Ok(outcome) => Poll::Ready(outcome),
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => panic!("paced job {id} was cancelled before completing: {err}"),
        }
    }
}
