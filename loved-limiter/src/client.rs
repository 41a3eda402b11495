//! Job client that runs registered executors through a [`PacedQueue`].

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::JobQueueError;
use crate::executor::JobExecutor;
use crate::handle::JobHandle;
use crate::limiter::PacedQueue;
use crate::types::{EnqueueResult, JobRequest, JobRun, JobStatus, QueueStats};

/// Maximum number of job runs to keep in memory.
const MAX_JOB_RUNS: usize = 1000;

/// Run history optimized for both iteration and lookup by ID.
#[derive(Debug, Default)]
struct RunLog {
    /// Ordered list of job run IDs (oldest first).
    order: VecDeque<Uuid>,
    runs: HashMap<Uuid, JobRun>,
}

impl RunLog {
    /// Insert a new job run, maintaining the size limit.
    fn insert(&mut self, run: JobRun) {
        let id = run.id;
        self.runs.insert(id, run);
        self.order.push_back(id);
        self.trim();
    }

    /// Evict the oldest finished runs until the log fits. Runs still waiting
    /// or running are never evicted, so the log may sit above the limit until
    /// they finish.
    fn trim(&mut self) {
        while self.order.len() > MAX_JOB_RUNS {
            let oldest_finished = self.order.iter().position(|id| {
                self.runs
                    .get(id)
                    .map_or(true, |run| run.status.is_terminal())
            });
            let Some(pos) = oldest_finished else {
                break;
            };
            if let Some(old_id) = self.order.remove(pos) {
                self.runs.remove(&old_id);
            }
        }
    }

    #[inline]
    fn get(&self, id: &Uuid) -> Option<&JobRun> {
        self.runs.get(id)
    }

    #[inline]
    fn get_mut(&mut self, id: &Uuid) -> Option<&mut JobRun> {
        self.runs.get_mut(id)
    }

    /// Iterate over all runs, most recent first.
    fn iter_recent(&self) -> impl Iterator<Item = &JobRun> {
        self.order.iter().rev().filter_map(|id| self.runs.get(id))
    }

    fn count(&self, job_name: Option<&str>) -> usize {
        match job_name {
            Some(name) => self.runs.values().filter(|r| r.job_name == name).count(),
            None => self.runs.len(),
        }
    }

    fn clear(&mut self) {
        self.order.clear();
        self.runs.clear();
    }
}

/// Runs registered job types through a shared [`PacedQueue`] and keeps a
/// bounded history of what ran.
#[derive(Clone)]
pub struct PacedJobClient {
    queue: PacedQueue,
    log: Arc<RwLock<RunLog>>,
    executors: Arc<RwLock<HashMap<String, Arc<dyn JobExecutor>>>>,
}

impl fmt::Debug for PacedJobClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacedJobClient")
            .field("queue", &self.queue)
            .field("log", &"<RwLock<RunLog>>")
            .field(
                "executors",
                &"<RwLock<HashMap<String, Arc<dyn JobExecutor>>>>",
            )
            .finish()
    }
}

impl PacedJobClient {
    pub fn new(queue: PacedQueue) -> Self {
        Self {
            queue,
            log: Arc::new(RwLock::new(RunLog::default())),
            executors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The queue every job from this client goes through.
    #[inline]
    pub fn queue(&self) -> &PacedQueue {
        &self.queue
    }

    #[inline]
    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Register a job executor for its job type, replacing any previous one.
    pub async fn register_executor<E: JobExecutor + 'static>(&self, executor: E) {
        let job_type = executor.job_type().to_owned();
        let mut executors = self.executors.write().await;
        if executors.insert(job_type.clone(), Arc::new(executor)).is_some() {
            warn!(job_type = %job_type, "replaced existing executor");
        }
    }

    /// Submit a job and return without waiting for it to run.
    pub async fn enqueue(&self, request: JobRequest) -> Result<EnqueueResult, JobQueueError> {
        let (job_id, _handle) = self.submit(request).await?;
        Ok(EnqueueResult { job_id })
    }

    /// Submit a job, wait for the queue to run it, and return its final record.
    ///
    /// An executor failure is recorded on the run rather than returned.
    pub async fn run_job(
        &self,
        job_name: impl Into<String>,
        payload: Option<Value>,
    ) -> Result<JobRun, JobQueueError> {
        let request = JobRequest::new(job_name, payload.unwrap_or(Value::Null));
        let (queued, handle) = self.submit_run(request).await?;
        let outcome = handle.await;

        if let Some(run) = self.get_run(queued.id).await {
            return Ok(run);
        }
        // History was cleared while the job was pending.
        let mut run = queued;
        match outcome {
            Ok(output) => run.complete(output),
            Err(e) => run.fail(e.to_string()),
        }
        Ok(run)
    }

    /// Submit a job and hand back both its run id and the queue handle for
    /// its raw outcome.
    pub async fn submit(
        &self,
        request: JobRequest,
    ) -> Result<(Uuid, JobHandle<Value, JobQueueError>), JobQueueError> {
        let (run, handle) = self.submit_run(request).await?;
        Ok((run.id, handle))
    }

    /// Submit a job, returning the run record as it was when queued.
    async fn submit_run(
        &self,
        request: JobRequest,
    ) -> Result<(JobRun, JobHandle<Value, JobQueueError>), JobQueueError> {
        let JobRequest {
            job_type: job_name,
            payload,
        } = request;
        let executor = {
            let executors = self.executors.read().await;
            executors.get(&job_name).cloned()
        }
        .ok_or_else(|| JobQueueError::UnknownJobType(job_name.clone()))?;

        let run = JobRun::new(&job_name, Some(payload.clone()));
        let job_id = run.id;
        self.log.write().await.insert(run.clone());

        let log = Arc::clone(&self.log);
        let handle = self.queue.submit(move || async move {
            if let Some(run) = log.write().await.get_mut(&job_id) {
                run.start();
            }

            let outcome = executor.execute(payload).await;

            {
                let mut log = log.write().await;
                if let Some(run) = log.get_mut(&job_id) {
                    match &outcome {
                        Ok(output) => run.complete(output.clone()),
                        Err(e) => run.fail(e.to_string()),
                    }
                }
                log.trim();
            }
            outcome
        });

        debug!(job_id = %job_id, queue_job = %handle.id(), job_name = %job_name, "job enqueued");
        Ok((run, handle))
    }

    /// List job runs, most recent first, optionally filtered by job name.
    pub async fn list_runs(
        &self,
        job_name: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Vec<JobRun> {
        let log = self.log.read().await;

        let iter = log.iter_recent();

        match job_name {
            Some(name) => iter
                .filter(|r| r.job_name == name)
                .skip(offset)
                .take(limit)
                .cloned()
                .collect(),
            None => iter.skip(offset).take(limit).cloned().collect(),
        }
    }

    /// Total count of job runs, optionally filtered by job name.
    pub async fn count_runs(&self, job_name: Option<&str>) -> usize {
        let log = self.log.read().await;
        log.count(job_name)
    }

    /// Count runs currently in the given status.
    pub async fn count_by_status(&self, status: JobStatus) -> usize {
        let log = self.log.read().await;
        log.runs.values().filter(|r| r.status == status).count()
    }

    /// Clear the run history. Jobs already in the queue still run.
    pub async fn clear_runs(&self) {
        let mut log = self.log.write().await;
        log.clear();
    }

    pub async fn get_run(&self, id: Uuid) -> Option<JobRun> {
        let log = self.log.read().await;
        log.get(&id).cloned()
    }
}
