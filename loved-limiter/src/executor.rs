//! Job executor trait for implementing job handlers.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::JobQueueError;

/// Trait for implementing job executors.
///
/// Each job type run through a [`PacedJobClient`](crate::PacedJobClient) has
/// one executor. The executor's body is what the queue paces.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Returns the job type this executor handles.
    fn job_type(&self) -> &str;

    /// Execute the job with the given payload.
    async fn execute(&self, payload: Value) -> Result<Value, JobQueueError>;
}

type BoxedJobFuture = Pin<Box<dyn Future<Output = Result<Value, JobQueueError>> + Send>>;

/// Executor backed by an async closure.
pub struct FnExecutor {
    job_type: String,
    run: Box<dyn Fn(Value) -> BoxedJobFuture + Send + Sync>,
}

impl FnExecutor {
    pub fn new<F, Fut>(job_type: impl Into<String>, run: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, JobQueueError>> + Send + 'static,
    {
        Self {
            job_type: job_type.into(),
            run: Box::new(move |payload| Box::pin(run(payload))),
        }
    }
}

impl fmt::Debug for FnExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnExecutor")
            .field("job_type", &self.job_type)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl JobExecutor for FnExecutor {
    fn job_type(&self) -> &str {
        &self.job_type
    }

    async fn execute(&self, payload: Value) -> Result<Value, JobQueueError> {
        (self.run)(payload).await
    }
}
