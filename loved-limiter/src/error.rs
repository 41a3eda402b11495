//! Error types for the paced queue and the job client.

use thiserror::Error;

use crate::types::JobId;

/// Bookkeeping faults inside a [`PacedQueue`](crate::PacedQueue).
///
/// These never describe a job's own failure. Seeing one means the queue lost
/// track of which jobs hold a slot, so the queue raises it as a panic instead
/// of handing it to a caller.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LimiterError {
    #[error("queue desync: job {0} completed but was not running")]
    NotRunning(JobId),

    #[error("queue desync: release signal for job {0} was dropped before being sent")]
    ReleaseDropped(JobId),
}

/// Errors that may occur while interacting with the job client.
#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("no executor registered for job type: {0}")]
    UnknownJobType(String),

    #[error("job execution failed: {0}")]
    ExecutionFailed(String),
}
