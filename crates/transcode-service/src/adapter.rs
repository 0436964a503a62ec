use media_core::{JobStatus, LogLevel};
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::db;

/// Translates queue lifecycle events into job-store writes. Kept as its own
/// task so the queue backend never touches the job store directly.
pub async fn run(job_store: SqlitePool, mut events: mpsc::Receiver<job_queue::QueueEvent>) {
    use job_queue::QueueEvent;

    while let Some(event) = events.recv().await {
        match event {
            QueueEvent::Active(entry) => {
                if let Err(e) = db::jobs::update_status(&job_store, entry.job_id, JobStatus::Processing).await {
                    warn!(job_id = %entry.job_id, error = %e, "failed to mark job processing");
                }
            }
            QueueEvent::Progress(entry, pct) => {
                if let Err(e) = db::jobs::update_progress(&job_store, entry.job_id, pct).await {
                    warn!(job_id = %entry.job_id, error = %e, "failed to persist progress");
                }
            }
            QueueEvent::Completed(entry, result) => {
                let output_key = result.get("outputKey").and_then(|v| v.as_str()).unwrap_or("").to_string();
                let total_size = result.get("totalSize").and_then(|v| v.as_i64()).unwrap_or(0);
                let duration = result.get("durationSeconds").and_then(|v| v.as_f64()).unwrap_or(0.0);
                if let Err(e) =
                    db::jobs::complete_job(&job_store, entry.job_id, &output_key, total_size, duration).await
                {
                    error!(job_id = %entry.job_id, error = %e, "failed to mark job completed");
                }
            }
            QueueEvent::Failed { entry, error: message, terminal } => {
                let _ = db::logs::add_log(
                    &job_store,
                    entry.job_id,
                    LogLevel::Error,
                    &message,
                    None,
                    None,
                )
                .await;
                if terminal {
                    if let Err(e) = db::jobs::set_error(&job_store, entry.job_id, &message).await {
                        error!(job_id = %entry.job_id, error = %e, "failed to persist error message");
                    }
                    if let Err(e) =
                        db::jobs::update_status(&job_store, entry.job_id, JobStatus::Failed).await
                    {
                        error!(job_id = %entry.job_id, error = %e, "failed to mark job failed");
                    }
                } else {
                    warn!(job_id = %entry.job_id, attempts = entry.attempts_made, "attempt failed, will retry");
                }
            }
            QueueEvent::Stalled(entry) => {
                warn!(job_id = %entry.job_id, "entry stalled, returned to waiting");
                let _ = db::logs::add_log(
                    &job_store,
                    entry.job_id,
                    LogLevel::Warn,
                    "worker stalled; entry returned to waiting",
                    None,
                    None,
                )
                .await;
            }
        }
    }
}
