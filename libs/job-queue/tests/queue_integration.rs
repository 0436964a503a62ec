use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use job_queue::{AddOptions, JobHandler, ProgressReporter, Queue, QueueEntry, QueueEvent, WorkerConfig};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

async fn connect() -> Option<Queue> {
    match Queue::connect("redis://127.0.0.1:6379", format!("test-{}", Uuid::new_v4())).await {
        Ok(q) => Some(q),
        Err(_) => {
            eprintln!("skipping test: redis not available on 127.0.0.1:6379");
            None
        }
    }
}

struct EchoHandler;

#[async_trait]
impl JobHandler for EchoHandler {
    async fn handle(&self, entry: &QueueEntry, progress: ProgressReporter) -> Result<serde_json::Value, String> {
        progress.progress(100).await;
        Ok(entry.payload.clone())
    }
}

struct AlwaysFailHandler;

#[async_trait]
impl JobHandler for AlwaysFailHandler {
    async fn handle(&self, _entry: &QueueEntry, _progress: ProgressReporter) -> Result<serde_json::Value, String> {
        Err("synthetic failure".to_string())
    }
}

#[tokio::test]
async fn add_then_get_entry_round_trips_payload() {
    let Some(queue) = connect().await else { return };
    let job_id = Uuid::new_v4();
    let payload = serde_json::json!({"originalKey": "raw/in.mp4"});
    let entry_id = queue.add(job_id, payload.clone(), AddOptions::default()).await.unwrap();

    let entry = queue.get_entry(entry_id).await.unwrap().unwrap();
    assert_eq!(entry.job_id, job_id);
    assert_eq!(entry.payload, payload);
    assert_eq!(entry.attempts_made, 0);
}

#[tokio::test]
async fn pause_stops_worker_from_picking_up_waiting_entries() {
    let Some(queue) = connect().await else { return };
    queue.pause().await.unwrap();
    assert!(queue.is_paused().await.unwrap());

    let job_id = Uuid::new_v4();
    queue.add(job_id, serde_json::json!({}), AddOptions::default()).await.unwrap();

    let (event_tx, mut event_rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handler: Arc<dyn JobHandler> = Arc::new(EchoHandler);
    let config = WorkerConfig { concurrency: 1, ..WorkerConfig::default() };
    let worker = tokio::spawn(queue.clone().process(handler, config, event_tx, shutdown_rx));

    let saw_active = tokio::time::timeout(Duration::from_millis(300), event_rx.recv()).await;
    assert!(saw_active.is_err() || matches!(saw_active, Ok(None)));

    queue.resume().await.unwrap();
    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(2), worker).await;
}

#[tokio::test]
async fn worker_processes_waiting_entry_to_completion() {
    let Some(queue) = connect().await else { return };
    let job_id = Uuid::new_v4();
    let payload = serde_json::json!({"hello": "world"});
    queue.add(job_id, payload.clone(), AddOptions::default()).await.unwrap();

    let (event_tx, mut event_rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handler: Arc<dyn JobHandler> = Arc::new(EchoHandler);
    let config = WorkerConfig {
        concurrency: 1,
        poll_interval: Duration::from_millis(20),
        ..WorkerConfig::default()
    };
    let worker = tokio::spawn(queue.clone().process(handler, config, event_tx, shutdown_rx));

    let mut saw_completed = false;
    for _ in 0..20 {
        match tokio::time::timeout(Duration::from_millis(200), event_rx.recv()).await {
            Ok(Some(QueueEvent::Completed(entry, result))) => {
                assert_eq!(entry.job_id, job_id);
                assert_eq!(result, payload);
                saw_completed = true;
                break;
            }
            Ok(Some(_)) => continue,
            _ => break,
        }
    }
    assert!(saw_completed, "expected a Completed event within the timeout");

    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(2), worker).await;
}

#[tokio::test]
async fn exhausted_retries_emit_terminal_failure() {
    let Some(queue) = connect().await else { return };
    let job_id = Uuid::new_v4();
    let opts = AddOptions {
        attempts: 1,
        backoff: job_queue::Backoff { base_ms: 10 },
        ..AddOptions::default()
    };
    queue.add(job_id, serde_json::json!({}), opts).await.unwrap();

    let (event_tx, mut event_rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handler: Arc<dyn JobHandler> = Arc::new(AlwaysFailHandler);
    let config = WorkerConfig {
        concurrency: 1,
        poll_interval: Duration::from_millis(20),
        ..WorkerConfig::default()
    };
    let worker = tokio::spawn(queue.clone().process(handler, config, event_tx, shutdown_rx));

    let mut saw_terminal_failure = false;
    for _ in 0..20 {
        match tokio::time::timeout(Duration::from_millis(200), event_rx.recv()).await {
            Ok(Some(QueueEvent::Failed { entry, terminal, .. })) if entry.job_id == job_id => {
                assert!(terminal);
                saw_terminal_failure = true;
                break;
            }
            Ok(Some(_)) => continue,
            _ => break,
        }
    }
    assert!(saw_terminal_failure, "expected a terminal Failed event within the timeout");

    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(2), worker).await;
}
