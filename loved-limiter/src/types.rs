//! Core types shared by the queue and the job client.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Identity of a job inside one [`PacedQueue`](crate::PacedQueue).
///
/// Allocated in submission order, so comparing two ids from the same queue
/// tells which job was admitted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub(crate) u64);

impl JobId {
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Point-in-time view of a queue's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    #[serde(with = "duration_ms")]
    pub min_interval: Duration,
    pub concurrency: usize,
    pub waiting: usize,
    pub running: usize,
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl QueueStats {
    /// True when nothing is running or waiting.
    #[inline]
    pub const fn is_idle(&self) -> bool {
        self.waiting == 0 && self.running == 0
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Request to run a registered job type through the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub job_type: String,
    pub payload: Value,
}

impl JobRequest {
    #[inline]
    pub fn new(job_type: impl Into<String>, payload: Value) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
        }
    }
}

/// Result returned after a job has been enqueued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueResult {
    pub job_id: Uuid,
}

/// Lifecycle of a tracked job run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Waiting,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Returns true if this status represents a terminal state.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

/// A record of one job passing through the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub id: Uuid,
    pub job_name: String,
    pub status: JobStatus,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub payload: Option<Value>,
    pub output: Option<Value>,
}

impl JobRun {
    /// Create a new waiting run.
    #[inline]
    pub fn new(job_name: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_name: job_name.into(),
            status: JobStatus::Waiting,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error_message: None,
            payload,
            output: None,
        }
    }

    /// Mark the run as started.
    #[inline]
    pub fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Mark the run as completed with the executor's output.
    #[inline]
    pub fn complete(&mut self, output: Value) {
        self.status = JobStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.output = Some(output);
    }

    /// Mark the run as failed with an error message.
    #[inline]
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error_message = Some(message.into());
    }

    /// Time spent waiting for admission and pacing, if the run has started.
    pub fn queue_delay(&self) -> Option<chrono::Duration> {
        self.started_at.map(|s| s - self.queued_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_serializes_lowercase() {
        let s = serde_json::to_string(&JobStatus::Waiting).unwrap();
        assert_eq!(s, "\"waiting\"");
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn run_lifecycle() {
        let mut run = JobRun::new("osu.beatmapset", Some(json!({"id": 1})));
        assert_eq!(run.status, JobStatus::Waiting);
        assert!(run.queue_delay().is_none());

        run.start();
        assert_eq!(run.status, JobStatus::Running);
        assert!(run.queue_delay().is_some());

        run.fail("boom");
        assert_eq!(run.status, JobStatus::Failed);
        assert_eq!(run.error_message.as_deref(), Some("boom"));
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn stats_serialize_interval_as_millis() {
        let stats = QueueStats {
            min_interval: Duration::from_millis(1500),
            concurrency: 1,
            waiting: 0,
            running: 0,
            submitted: 3,
            succeeded: 2,
            failed: 1,
        };
        assert!(stats.is_idle());
        let v = serde_json::to_value(stats).unwrap();
        assert_eq!(v["min_interval"], json!(1500));
        assert_eq!(v["failed"], json!(1));
    }
}
