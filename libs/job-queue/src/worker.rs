use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use uuid::Uuid;

use crate::entry::{QueueEntry, QueueEntryState};
use crate::error::QueueError;
use crate::events::QueueEvent;
use crate::queue::Queue;

/// Implemented by the pipeline adapter; `handle` runs one queue entry to
/// completion. `progress` lets the handler report a percentage, which also
/// refreshes the entry's stall heartbeat.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(
        &self,
        entry: &QueueEntry,
        progress: ProgressReporter,
    ) -> Result<serde_json::Value, String>;
}

#[derive(Clone)]
pub struct ProgressReporter {
    queue: Queue,
    entry_id: Uuid,
    event_tx: mpsc::Sender<QueueEvent>,
}

impl ProgressReporter {
    pub async fn progress(&self, p: u8) {
        let mut conn = self.queue.conn.clone();
        let now_ms = Utc::now().timestamp_millis();
        let _: Result<(), _> = conn
            .hset::<_, _, _, ()>(self.queue.key("heartbeat"), self.entry_id.to_string(), now_ms)
            .await;
        if let Ok(Some(entry)) = self.queue.get_entry(self.entry_id).await {
            let _ = self.event_tx.send(QueueEvent::Progress(entry, p)).await;
        }
    }
}

/// Worker-pool configuration: how many entries from this queue may be active
/// on this process simultaneously, and the polling/stall/clean cadence.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub poll_interval: Duration,
    pub stall_window: Duration,
    pub stall_check_interval: Duration,
    pub clean_interval: Duration,
    pub retention_age: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            concurrency: 2,
            poll_interval: Duration::from_millis(500),
            stall_window: Duration::from_secs(30),
            stall_check_interval: Duration::from_secs(15),
            clean_interval: Duration::from_secs(3600),
            retention_age: Duration::from_secs(24 * 3600),
        }
    }
}

impl Queue {
    /// Promotes any delayed entries whose delay has expired into `waiting`.
    async fn promote_due_delayed(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let now_ms = Utc::now().timestamp_millis();
        let due: Vec<String> = conn
            .zrangebyscore(self.key("delayed"), f64::MIN, now_ms as f64)
            .await?;
        for entry_id in due {
            let _: () = conn.zrem(self.key("delayed"), &entry_id).await?;
            if let Some(mut entry) = self.get_entry(Uuid::parse_str(&entry_id).unwrap()).await? {
                entry.state = QueueEntryState::Waiting;
                self.save_entry(&entry).await?;
                let score = Self::waiting_score(entry.priority, Utc::now().timestamp_millis());
                let _: () = conn.zadd(self.key("waiting"), &entry_id, score).await?;
            }
        }
        Ok(())
    }

    async fn pop_next_waiting(&self) -> Result<Option<QueueEntry>, QueueError> {
        let mut conn = self.conn.clone();
        let popped: Vec<(String, f64)> = conn.zpopmin(self.key("waiting"), 1).await?;
        match popped.into_iter().next() {
            Some((entry_id, _score)) => self.get_entry(Uuid::parse_str(&entry_id).unwrap()).await,
            None => Ok(None),
        }
    }

    async fn mark_active(&self, mut entry: QueueEntry) -> Result<QueueEntry, QueueError> {
        let mut conn = self.conn.clone();
        entry.state = QueueEntryState::Active;
        entry.processed_at = Some(Utc::now());
        self.save_entry(&entry).await?;
        let _: () = conn.sadd(self.key("active"), entry.entry_id.to_string()).await?;
        let _: () = conn
            .hset(self.key("heartbeat"), entry.entry_id.to_string(), Utc::now().timestamp_millis())
            .await?;
        Ok(entry)
    }

    async fn clear_active(&self, entry_id: Uuid) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: () = conn.srem(self.key("active"), entry_id.to_string()).await?;
        let _: () = conn.hdel(self.key("heartbeat"), entry_id.to_string()).await?;
        Ok(())
    }

    /// Runs `config.concurrency` worker loops against `handler`, emitting
    /// lifecycle events on `event_tx`, until `shutdown` fires. A BullMQ-style
    /// `process(name, concurrency, handler)` contract.
    pub async fn process(
        self,
        handler: Arc<dyn JobHandler>,
        config: WorkerConfig,
        event_tx: mpsc::Sender<QueueEvent>,
        shutdown: watch::Receiver<bool>,
    ) {
        let mut tasks = tokio::task::JoinSet::new();
        for worker_idx in 0..config.concurrency {
            let queue = self.clone();
            let handler = handler.clone();
            let event_tx = event_tx.clone();
            let mut shutdown = shutdown.clone();
            tasks.spawn(async move {
                loop {
                    if *shutdown.borrow() {
                        break;
                    }
                    if let Err(e) = queue.worker_tick(&handler, &event_tx, worker_idx).await {
                        warn!(error = %e, "queue worker tick failed");
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(config.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            });
        }
        tasks.spawn(self.clone().stall_monitor(config, event_tx.clone(), shutdown.clone()));
        tasks.spawn(self.clone().cleaner(config, shutdown));
        while tasks.join_next().await.is_some() {}
    }

    async fn worker_tick(
        &self,
        handler: &Arc<dyn JobHandler>,
        event_tx: &mpsc::Sender<QueueEvent>,
        worker_idx: usize,
    ) -> Result<(), QueueError> {
        if self.is_paused().await? {
            return Ok(());
        }
        self.promote_due_delayed().await?;
        let Some(entry) = self.pop_next_waiting().await? else {
            return Ok(());
        };
        let entry = self.mark_active(entry).await?;
        let _ = event_tx.send(QueueEvent::Active(entry.clone())).await;
        info!(entry_id = %entry.entry_id, worker_idx, "entry active");

        let progress = ProgressReporter {
            queue: self.clone(),
            entry_id: entry.entry_id,
            event_tx: event_tx.clone(),
        };

        match handler.handle(&entry, progress).await {
            Ok(result) => self.finish_completed(entry, result, event_tx).await,
            Err(error) => self.finish_failed(entry, error, event_tx).await,
        }
    }

    async fn finish_completed(
        &self,
        mut entry: QueueEntry,
        result: serde_json::Value,
        event_tx: &mpsc::Sender<QueueEvent>,
    ) -> Result<(), QueueError> {
        self.clear_active(entry.entry_id).await?;
        entry.state = QueueEntryState::Completed;
        entry.finished_at = Some(Utc::now());
        self.save_entry(&entry).await?;

        let opts = self.get_opts(entry.entry_id).await?;
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(self.key("completed"), entry.entry_id.to_string()).await?;
        let _: () = conn
            .ltrim(self.key("completed"), 0, opts.remove_on_complete as isize - 1)
            .await?;
        let _ = event_tx.send(QueueEvent::Completed(entry, result)).await;
        Ok(())
    }

    async fn finish_failed(
        &self,
        mut entry: QueueEntry,
        error: String,
        event_tx: &mpsc::Sender<QueueEvent>,
    ) -> Result<(), QueueError> {
        self.clear_active(entry.entry_id).await?;
        let opts = self.get_opts(entry.entry_id).await?;
        entry.attempts_made += 1;
        entry.last_error = Some(error.clone());

        if entry.attempts_made < opts.attempts {
            let delay = opts.backoff.delay_ms(entry.attempts_made);
            entry.state = QueueEntryState::Delayed;
            self.save_entry(&entry).await?;
            let mut conn = self.conn.clone();
            let ready_at_ms = Utc::now().timestamp_millis() + delay as i64;
            let _: () = conn
                .zadd(self.key("delayed"), entry.entry_id.to_string(), ready_at_ms)
                .await?;
            let _ = event_tx
                .send(QueueEvent::Failed { entry, error, terminal: false })
                .await;
        } else {
            entry.state = QueueEntryState::Failed;
            entry.finished_at = Some(Utc::now());
            self.save_entry(&entry).await?;
            let mut conn = self.conn.clone();
            let _: () = conn.lpush(self.key("failed"), entry.entry_id.to_string()).await?;
            let _: () = conn
                .ltrim(self.key("failed"), 0, opts.remove_on_fail as isize - 1)
                .await?;
            let _ = event_tx
                .send(QueueEvent::Failed { entry, error, terminal: true })
                .await;
        }
        Ok(())
    }

    async fn stall_monitor(
        self,
        config: WorkerConfig,
        event_tx: mpsc::Sender<QueueEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.check_stalled(config.stall_window, &event_tx).await {
                warn!(error = %e, "stall check failed");
            }
            tokio::select! {
                _ = tokio::time::sleep(config.stall_check_interval) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    async fn check_stalled(
        &self,
        stall_window: Duration,
        event_tx: &mpsc::Sender<QueueEvent>,
    ) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let active_ids: Vec<String> = conn.smembers(self.key("active")).await?;
        let now_ms = Utc::now().timestamp_millis();
        for id in active_ids {
            let heartbeat: Option<i64> = conn.hget(self.key("heartbeat"), &id).await?;
            let stalled = match heartbeat {
                Some(ts) => now_ms - ts > stall_window.as_millis() as i64,
                None => true,
            };
            if !stalled {
                continue;
            }
            let entry_id = Uuid::parse_str(&id).unwrap();
            if let Some(mut entry) = self.get_entry(entry_id).await? {
                self.clear_active(entry_id).await?;
                entry.attempts_made += 1;
                entry.state = QueueEntryState::Waiting;
                self.save_entry(&entry).await?;
                let score = Self::waiting_score(entry.priority, now_ms);
                let _: () = conn.zadd(self.key("waiting"), &id, score).await?;
                warn!(entry_id = %entry_id, "entry stalled, returned to waiting");
                let _ = event_tx.send(QueueEvent::Stalled(entry)).await;
            }
        }
        Ok(())
    }

    async fn cleaner(self, config: WorkerConfig, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.clean(config.retention_age).await {
                warn!(error = %e, "queue clean sweep failed");
            }
            tokio::select! {
                _ = tokio::time::sleep(config.clean_interval) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    /// Purges `completed`/`failed` entries older than `retention_age`,
    /// independent of the `remove_on_complete`/`remove_on_fail` count caps.
    pub async fn clean(&self, retention_age: Duration) -> Result<u64, QueueError> {
        let mut purged = 0u64;
        for list_key in ["completed", "failed"] {
            let mut conn = self.conn.clone();
            let ids: Vec<String> = conn.lrange(self.key(list_key), 0, -1).await?;
            for id in ids {
                if let Some(entry) = self.get_entry(Uuid::parse_str(&id).unwrap()).await? {
                    let age_ok = entry
                        .finished_at
                        .map(|t| Utc::now().signed_duration_since(t).num_seconds() as u64)
                        .unwrap_or(0)
                        > retention_age.as_secs();
                    if age_ok {
                        self.remove(entry.entry_id).await?;
                        purged += 1;
                    }
                }
            }
        }
        Ok(purged)
    }
}
