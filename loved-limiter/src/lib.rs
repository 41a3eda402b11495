//! Paced job queue for outbound API calls.
//!
//! [`PacedQueue`] runs asynchronous jobs one at a time, in the order they were
//! submitted, and keeps at least a fixed interval between the start of one job
//! and the start of the next. It exists to keep a process under an external
//! API's rate limit without letting any caller cut in line.
//!
//! # Architecture
//!
//! - [`PacedQueue`] - FIFO admission plus start pacing
//! - [`JobHandle`] - Future resolving with a submitted job's own outcome
//! - [`PacedJobClient`] - Runs registered [`JobExecutor`]s through a queue and tracks [`JobRun`]s
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use loved_limiter::PacedQueue;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     // One request per second.
//!     let queue = PacedQueue::new(Duration::from_secs(1));
//!
//!     let first = queue.submit(|| async { Ok::<_, std::io::Error>("first") });
//!     let second = queue.submit(|| async { Ok::<_, std::io::Error>("second") });
//!
//!     assert_eq!(first.await.unwrap(), "first");
//!     assert_eq!(second.await.unwrap(), "second");
//! }
//! ```

mod client;
mod error;
mod executor;
mod handle;
mod limiter;
mod types;

pub use client::PacedJobClient;
pub use error::{JobQueueError, LimiterError};
pub use executor::{FnExecutor, JobExecutor};
pub use handle::JobHandle;
pub use limiter::PacedQueue;
pub use types::{EnqueueResult, JobId, JobRequest, JobRun, JobStatus, QueueStats};

// Re-export async_trait for convenience when implementing JobExecutor
pub use async_trait::async_trait;
