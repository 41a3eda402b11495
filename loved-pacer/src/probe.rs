//! Probe batch: pushes synthetic jobs through the queue and reports when each started.

use std::time::Duration;

use anyhow::Context;
use loved_limiter::{FnExecutor, JobRequest, JobStatus, PacedJobClient, QueueStats};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::Instant;

pub const PROBE_JOB: &str = "probe.sleep";

#[derive(Debug, Serialize)]
pub struct ProbeReport {
    pub min_interval_ms: u64,
    pub concurrency: usize,
    pub elapsed_ms: u64,
    /// Smallest gap seen between two consecutive starts.
    pub smallest_gap_ms: Option<u64>,
    pub jobs: Vec<ProbeResult>,
    pub stats: QueueStats,
}

#[derive(Debug, Serialize)]
pub struct ProbeResult {
    pub index: usize,
    pub status: JobStatus,
    pub started_ms: Option<u64>,
    pub error: Option<String>,
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn probe_executor(origin: Instant, work: Duration) -> FnExecutor {
    FnExecutor::new(PROBE_JOB, move |payload: Value| async move {
        let started_ms = millis(origin.elapsed());
        if !work.is_zero() {
            tokio::time::sleep(work).await;
        }
        Ok(json!({
            "index": payload.get("index").cloned().unwrap_or(Value::Null),
            "started_ms": started_ms,
        }))
    })
}

/// Smallest difference between consecutive start offsets.
pub fn smallest_gap(starts: &[u64]) -> Option<u64> {
    let mut sorted = starts.to_vec();
    sorted.sort_unstable();
    sorted.windows(2).map(|w| w[1] - w[0]).min()
}

/// Run `jobs` probes through `client` and collect what happened.
pub async fn run(
    client: &PacedJobClient,
    jobs: usize,
    work: Duration,
) -> anyhow::Result<ProbeReport> {
    let origin = Instant::now();
    client.register_executor(probe_executor(origin, work)).await;

    let mut submitted = Vec::with_capacity(jobs);
    for index in 0..jobs {
        let request = JobRequest::new(PROBE_JOB, json!({ "index": index }));
        let (run_id, handle) = client.submit(request).await?;
        submitted.push((index, run_id, handle));
    }

    let mut results = Vec::with_capacity(jobs);
    for (index, run_id, handle) in submitted {
        if let Err(e) = handle.await {
            tracing::warn!(index, error = %e, "probe job failed");
        }
        let run = client
            .get_run(run_id)
            .await
            .with_context(|| format!("probe run {run_id} missing from history"))?;
        let started_ms = run
            .output
            .as_ref()
            .and_then(|o| o.get("started_ms"))
            .and_then(Value::as_u64);
        tracing::debug!(index, started_ms, status = %run.status, "probe finished");
        results.push(ProbeResult {
            index,
            status: run.status,
            started_ms,
            error: run.error_message,
        });
    }

    let starts: Vec<u64> = results.iter().filter_map(|r| r.started_ms).collect();
    let queue = client.queue();
    Ok(ProbeReport {
        min_interval_ms: millis(queue.min_interval()),
        concurrency: queue.concurrency(),
        elapsed_ms: millis(origin.elapsed()),
        smallest_gap_ms: smallest_gap(&starts),
        jobs: results,
        stats: client.stats(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use loved_limiter::PacedQueue;

    #[test]
    fn gap_of_unordered_starts() {
        assert_eq!(smallest_gap(&[200, 0, 100, 350]), Some(100));
        assert_eq!(smallest_gap(&[5]), None);
        assert_eq!(smallest_gap(&[]), None);
    }

    #[test]
    fn millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn probes_start_one_interval_apart() {
        let client = PacedJobClient::new(PacedQueue::new(Duration::from_millis(100)));

        let report = run(&client, 3, Duration::from_millis(20)).await.unwrap();

        let starts: Vec<_> = report.jobs.iter().map(|j| j.started_ms).collect();
        assert_eq!(starts, vec![Some(0), Some(100), Some(200)]);
        assert_eq!(report.smallest_gap_ms, Some(100));
        assert_eq!(report.elapsed_ms, 220);
        assert!(report
            .jobs
            .iter()
            .all(|j| j.status == JobStatus::Completed && j.error.is_none()));
        assert_eq!(report.stats.succeeded, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn work_longer_than_interval_gates_starts() {
        let client = PacedJobClient::new(PacedQueue::new(Duration::from_millis(50)));

        let report = run(&client, 2, Duration::from_millis(200)).await.unwrap();

        assert_eq!(report.smallest_gap_ms, Some(200));
        assert_eq!(report.min_interval_ms, 50);
        assert_eq!(report.concurrency, 1);
    }
}
