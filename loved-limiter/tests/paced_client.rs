use std::sync::{Arc, Mutex};
use std::time::Duration;

use loved_limiter::{
    FnExecutor, JobQueueError, JobRequest, JobStatus, PacedJobClient, PacedQueue,
};
use serde_json::{json, Value};
use tokio::sync::Notify;
use tokio::time::Instant;

fn client(interval_ms: u64) -> PacedJobClient {
    PacedJobClient::new(PacedQueue::new(Duration::from_millis(interval_ms)))
}

fn echo() -> FnExecutor {
    FnExecutor::new("osu.echo", |payload: Value| async move { Ok(payload) })
}

fn failing() -> FnExecutor {
    FnExecutor::new("osu.broken", |_payload: Value| async move {
        Err(JobQueueError::ExecutionFailed("api returned 500".to_string()))
    })
}

/// Executor that holds the queue until `gate` is notified.
fn gated(gate: &Arc<Notify>) -> FnExecutor {
    let gate = Arc::clone(gate);
    FnExecutor::new("osu.gate", move |_payload: Value| {
        let gate = Arc::clone(&gate);
        async move {
            gate.notified().await;
            Ok(Value::Null)
        }
    })
}

#[tokio::test(start_paused = true)]
async fn run_job_returns_completed_record() {
    let client = client(100);
    client.register_executor(echo()).await;

    let run = client
        .run_job("osu.echo", Some(json!({"beatmapset": 42})))
        .await
        .expect("run job");

    assert_eq!(run.status, JobStatus::Completed);
    assert_eq!(run.output, Some(json!({"beatmapset": 42})));
    assert!(run.started_at.is_some());
    assert!(run.finished_at.is_some());
    assert!(run.error_message.is_none());
}

#[tokio::test(start_paused = true)]
async fn failed_job_is_recorded_and_queue_moves_on() {
    let client = client(50);
    client.register_executor(echo()).await;
    client.register_executor(failing()).await;

    let failed = client.run_job("osu.broken", None).await.expect("run job");
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(
        failed.error_message.as_deref(),
        Some("job execution failed: api returned 500")
    );

    let next = client.run_job("osu.echo", Some(json!(1))).await.expect("run job");
    assert_eq!(next.status, JobStatus::Completed);

    let stats = client.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.succeeded, 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_job_type_is_rejected_before_queueing() {
    let client = client(50);

    let err = client.run_job("osu.missing", None).await.unwrap_err();
    assert!(matches!(err, JobQueueError::UnknownJobType(ref t) if t == "osu.missing"));

    let err = client
        .enqueue(JobRequest::new("osu.missing", Value::Null))
        .await
        .unwrap_err();
    assert!(matches!(err, JobQueueError::UnknownJobType(_)));

    assert_eq!(client.stats().submitted, 0);
    assert_eq!(client.count_runs(None).await, 0);
}

#[tokio::test(start_paused = true)]
async fn enqueued_jobs_are_paced_and_tracked() {
    let client = client(100);
    let origin = Instant::now();
    let starts = Arc::new(Mutex::new(Vec::new()));
    {
        let starts = Arc::clone(&starts);
        client
            .register_executor(FnExecutor::new("osu.lookup", move |payload: Value| {
                let starts = Arc::clone(&starts);
                async move {
                    starts.lock().unwrap().push(origin.elapsed());
                    Ok(payload)
                }
            }))
            .await;
    }

    let first = client
        .enqueue(JobRequest::new("osu.lookup", json!(1)))
        .await
        .expect("enqueue");
    let second = client
        .enqueue(JobRequest::new("osu.lookup", json!(2)))
        .await
        .expect("enqueue");

    let queued = client.get_run(second.job_id).await.expect("tracked");
    assert_eq!(queued.status, JobStatus::Waiting);

    // FIFO: this finishes only after both enqueued jobs have run.
    let third = client
        .run_job("osu.lookup", Some(json!(3)))
        .await
        .expect("run job");
    assert_eq!(third.status, JobStatus::Completed);

    for id in [first.job_id, second.job_id] {
        let run = client.get_run(id).await.expect("tracked");
        assert_eq!(run.status, JobStatus::Completed);
    }
    assert_eq!(
        *starts.lock().unwrap(),
        vec![
            Duration::ZERO,
            Duration::from_millis(100),
            Duration::from_millis(200)
        ]
    );
    assert_eq!(client.count_by_status(JobStatus::Completed).await, 3);
}

#[tokio::test(start_paused = true)]
async fn list_runs_is_most_recent_first_and_filterable() {
    let client = client(10);
    client.register_executor(echo()).await;
    client.register_executor(failing()).await;

    for i in 0..3 {
        client.run_job("osu.echo", Some(json!(i))).await.unwrap();
    }
    client.run_job("osu.broken", None).await.unwrap();

    assert_eq!(client.count_runs(None).await, 4);
    assert_eq!(client.count_runs(Some("osu.echo")).await, 3);

    let recent = client.list_runs(None, 2, 0).await;
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].job_name, "osu.broken");
    assert_eq!(recent[1].payload, Some(json!(2)));

    let echoes = client.list_runs(Some("osu.echo"), 10, 1).await;
    let payloads: Vec<_> = echoes.iter().map(|r| r.payload.clone()).collect();
    assert_eq!(payloads, vec![Some(json!(1)), Some(json!(0))]);

    client.clear_runs().await;
    assert_eq!(client.count_runs(None).await, 0);
}

#[tokio::test(start_paused = true)]
async fn run_job_survives_a_backlog_larger_than_the_history() {
    let client = client(0);
    let gate = Arc::new(Notify::new());
    client.register_executor(echo()).await;
    client.register_executor(gated(&gate)).await;

    client
        .enqueue(JobRequest::new("osu.gate", Value::Null))
        .await
        .expect("enqueue");
    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.run_job("osu.echo", Some(json!("mine"))).await })
    };
    while client.count_runs(None).await < 2 {
        tokio::task::yield_now().await;
    }

    for i in 0..1001 {
        client
            .enqueue(JobRequest::new("osu.echo", json!(i)))
            .await
            .expect("enqueue");
    }
    // Nothing has finished, so nothing was evicted.
    assert_eq!(client.count_runs(None).await, 1003);
    gate.notify_one();

    let run = pending.await.expect("join").expect("run job");
    assert_eq!(run.status, JobStatus::Completed);
    assert_eq!(run.output, Some(json!("mine")));

    let (_, last) = client
        .submit(JobRequest::new("osu.echo", json!("last")))
        .await
        .expect("submit");
    last.await.expect("last job");
    assert_eq!(client.count_runs(None).await, 1000);
    assert_eq!(client.count_by_status(JobStatus::Waiting).await, 0);
}

#[tokio::test(start_paused = true)]
async fn run_job_reports_outcome_after_history_is_cleared() {
    let client = client(0);
    let gate = Arc::new(Notify::new());
    client.register_executor(echo()).await;
    client.register_executor(gated(&gate)).await;

    client
        .enqueue(JobRequest::new("osu.gate", Value::Null))
        .await
        .expect("enqueue");
    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.run_job("osu.echo", Some(json!(7))).await })
    };
    while client.count_runs(None).await < 2 {
        tokio::task::yield_now().await;
    }

    client.clear_runs().await;
    gate.notify_one();

    let run = pending.await.expect("join").expect("run job");
    assert_eq!(run.status, JobStatus::Completed);
    assert_eq!(run.output, Some(json!(7)));
    assert!(run.finished_at.is_some());
    assert_eq!(client.count_runs(None).await, 0);
}
