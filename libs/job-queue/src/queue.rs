use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;
use uuid::Uuid;

use crate::entry::{AddOptions, QueueCounts, QueueEntry, QueueEntryState};
use crate::error::QueueError;

/// Redis key namespace for one named queue. Wraps a `ConnectionManager`
/// behind a small typed API rather than exposing raw commands.
#[derive(Clone)]
pub struct Queue {
    pub(crate) conn: ConnectionManager,
    pub(crate) name: String,
}

impl Queue {
    pub async fn connect(redis_url: &str, name: impl Into<String>) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Queue {
            conn,
            name: name.into(),
        })
    }

    pub(crate) fn key(&self, suffix: &str) -> String {
        format!("queue:{}:{}", self.name, suffix)
    }

    /// Score used for the `waiting` sorted set: higher priority sorts first,
    /// FIFO among equal priorities, without overflowing typical i32 priority
    /// ranges against millisecond timestamps.
    pub(crate) fn waiting_score(priority: i32, enqueued_at_ms: i64) -> f64 {
        (-(priority as f64)) * 1.0e15 + enqueued_at_ms as f64
    }

    pub async fn add(
        &self,
        job_id: Uuid,
        payload: serde_json::Value,
        opts: AddOptions,
    ) -> Result<Uuid, QueueError> {
        let entry_id = Uuid::new_v4();
        let now = Utc::now();
        let delayed = opts.delay_ms > 0;
        let entry = QueueEntry {
            entry_id,
            job_id,
            payload,
            priority: opts.priority,
            attempts_made: 0,
            state: if delayed {
                QueueEntryState::Delayed
            } else {
                QueueEntryState::Waiting
            },
            enqueued_at: now,
            processed_at: None,
            finished_at: None,
            last_error: None,
        };

        let mut conn = self.conn.clone();
        let serialized = serde_json::to_string(&entry)?;
        let _: () = conn.hset(self.key("entries"), entry_id.to_string(), serialized).await?;
        let _: () = conn
            .hset(self.key("opts"), entry_id.to_string(), serde_json::to_string(&opts_serializable(&opts))?)
            .await?;
        let _: () = conn.hset(self.key("by_job"), job_id.to_string(), entry_id.to_string()).await?;

        if delayed {
            let ready_at_ms = now.timestamp_millis() + opts.delay_ms as i64;
            let _: () = conn.zadd(self.key("delayed"), entry_id.to_string(), ready_at_ms).await?;
        } else {
            let score = Self::waiting_score(opts.priority, now.timestamp_millis());
            let _: () = conn.zadd(self.key("waiting"), entry_id.to_string(), score).await?;
        }
        debug!(%entry_id, %job_id, "enqueued entry");
        Ok(entry_id)
    }

    pub async fn get_entry(&self, entry_id: Uuid) -> Result<Option<QueueEntry>, QueueError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(self.key("entries"), entry_id.to_string()).await?;
        Ok(match raw {
            Some(s) => Some(serde_json::from_str(&s)?),
            None => None,
        })
    }

    /// Looks up the entry a job enqueued, via the `job_id -> entry_id`
    /// side index `add` maintains. Needed by callers (e.g. job cancellation)
    /// that only know the job id, not the queue's own entry id.
    pub async fn find_entry_id(&self, job_id: Uuid) -> Result<Option<Uuid>, QueueError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(self.key("by_job"), job_id.to_string()).await?;
        Ok(match raw {
            Some(s) => Some(Uuid::parse_str(&s).map_err(|e| QueueError::Invalid(e.to_string()))?),
            None => None,
        })
    }

    pub async fn get_entry_by_job(&self, job_id: Uuid) -> Result<Option<QueueEntry>, QueueError> {
        match self.find_entry_id(job_id).await? {
            Some(entry_id) => self.get_entry(entry_id).await,
            None => Ok(None),
        }
    }

    /// Removes the queue entry for `job_id`, if one is still pending. A
    /// no-op (not an error) when the job already has no queue entry.
    pub async fn remove_by_job(&self, job_id: Uuid) -> Result<(), QueueError> {
        if let Some(entry_id) = self.find_entry_id(job_id).await? {
            self.remove(entry_id).await?;
        }
        Ok(())
    }

    pub(crate) async fn save_entry(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let serialized = serde_json::to_string(entry)?;
        let _: () = conn
            .hset(self.key("entries"), entry.entry_id.to_string(), serialized)
            .await?;
        Ok(())
    }

    pub(crate) async fn get_opts(&self, entry_id: Uuid) -> Result<AddOptions, QueueError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(self.key("opts"), entry_id.to_string()).await?;
        Ok(match raw {
            Some(s) => {
                let stored: StoredOptions = serde_json::from_str(&s)?;
                stored.into()
            }
            None => AddOptions::default(),
        })
    }

    pub async fn pause(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(self.key("paused"), "1").await?;
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(self.key("paused")).await?;
        Ok(())
    }

    pub async fn is_paused(&self) -> Result<bool, QueueError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(self.key("paused")).await?;
        Ok(exists)
    }

    pub async fn counts(&self) -> Result<QueueCounts, QueueError> {
        let mut conn = self.conn.clone();
        let waiting: i64 = conn.zcard(self.key("waiting")).await?;
        let delayed: i64 = conn.zcard(self.key("delayed")).await?;
        let active: i64 = conn.scard(self.key("active")).await?;
        let completed: i64 = conn.llen(self.key("completed")).await?;
        let failed: i64 = conn.llen(self.key("failed")).await?;
        Ok(QueueCounts {
            waiting,
            active,
            completed,
            failed,
            delayed,
            total: waiting + delayed + active + completed + failed,
        })
    }

    pub async fn active_entries(&self) -> Result<Vec<QueueEntry>, QueueError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(self.key("active")).await?;
        self.load_entries(ids).await
    }

    pub async fn failed_entries(&self, limit: isize) -> Result<Vec<QueueEntry>, QueueError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.lrange(self.key("failed"), 0, limit.saturating_sub(1)).await?;
        self.load_entries(ids).await
    }

    async fn load_entries(&self, ids: Vec<String>) -> Result<Vec<QueueEntry>, QueueError> {
        let mut conn = self.conn.clone();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let raw: Option<String> = conn.hget(self.key("entries"), &id).await?;
            if let Some(raw) = raw {
                out.push(serde_json::from_str(&raw)?);
            }
        }
        Ok(out)
    }

    /// Re-queues a failed entry for another attempt immediately (bypassing
    /// backoff), used by the submission API's manual `retry(job_id)` path.
    pub async fn retry(&self, entry_id: Uuid) -> Result<(), QueueError> {
        let mut entry = self
            .get_entry(entry_id)
            .await?
            .ok_or(QueueError::NotFound(entry_id))?;
        entry.state = QueueEntryState::Waiting;
        entry.attempts_made = 0;
        entry.last_error = None;
        entry.finished_at = None;
        self.save_entry(&entry).await?;

        let mut conn = self.conn.clone();
        let _: () = conn.lrem(self.key("failed"), 0, entry_id.to_string()).await?;
        let score = Self::waiting_score(entry.priority, Utc::now().timestamp_millis());
        let _: () = conn.zadd(self.key("waiting"), entry_id.to_string(), score).await?;
        Ok(())
    }

    pub async fn remove(&self, entry_id: Uuid) -> Result<(), QueueError> {
        let job_id = self.get_entry(entry_id).await?.map(|e| e.job_id);

        let mut conn = self.conn.clone();
        let _: () = conn.hdel(self.key("entries"), entry_id.to_string()).await?;
        let _: () = conn.hdel(self.key("opts"), entry_id.to_string()).await?;
        let _: () = conn.zrem(self.key("waiting"), entry_id.to_string()).await?;
        let _: () = conn.zrem(self.key("delayed"), entry_id.to_string()).await?;
        let _: () = conn.srem(self.key("active"), entry_id.to_string()).await?;
        let _: () = conn.lrem(self.key("completed"), 0, entry_id.to_string()).await?;
        let _: () = conn.lrem(self.key("failed"), 0, entry_id.to_string()).await?;
        if let Some(job_id) = job_id {
            let _: () = conn.hdel(self.key("by_job"), job_id.to_string()).await?;
        }
        Ok(())
    }
}

/// `AddOptions`'s `Backoff` has no `Serialize`/`Deserialize` impl (it's not
/// wire data, just policy), so the queue persists a flat mirror struct
/// alongside each entry.
#[derive(serde::Serialize, serde::Deserialize)]
struct StoredOptions {
    priority: i32,
    attempts: u32,
    backoff_base_ms: u64,
    remove_on_complete: u32,
    remove_on_fail: u32,
}

fn opts_serializable(opts: &AddOptions) -> StoredOptions {
    StoredOptions {
        priority: opts.priority,
        attempts: opts.attempts,
        backoff_base_ms: opts.backoff.base_ms,
        remove_on_complete: opts.remove_on_complete,
        remove_on_fail: opts.remove_on_fail,
    }
}

impl From<StoredOptions> for AddOptions {
    fn from(s: StoredOptions) -> Self {
        AddOptions {
            priority: s.priority,
            attempts: s.attempts,
            backoff: crate::entry::Backoff { base_ms: s.backoff_base_ms },
            remove_on_complete: s.remove_on_complete,
            remove_on_fail: s.remove_on_fail,
            delay_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_priority_sorts_before_lower() {
        let high = Queue::waiting_score(10, 1_000);
        let low = Queue::waiting_score(0, 1_000);
        assert!(high < low);
    }

    #[test]
    fn equal_priority_is_fifo_by_enqueue_time() {
        let earlier = Queue::waiting_score(5, 1_000);
        let later = Queue::waiting_score(5, 2_000);
        assert!(earlier < later);
    }

    #[test]
    fn stored_options_round_trips_backoff_base_ms() {
        let opts = AddOptions {
            priority: 3,
            attempts: 5,
            backoff: crate::entry::Backoff { base_ms: 4000 },
            remove_on_complete: 100,
            remove_on_fail: 50,
            delay_ms: 0,
        };
        let stored = opts_serializable(&opts);
        let json = serde_json::to_string(&stored).unwrap();
        let back: StoredOptions = serde_json::from_str(&json).unwrap();
        let restored: AddOptions = back.into();
        assert_eq!(restored.priority, 3);
        assert_eq!(restored.attempts, 5);
        assert_eq!(restored.backoff.base_ms, 4000);
        assert_eq!(restored.remove_on_complete, 100);
        assert_eq!(restored.remove_on_fail, 50);
    }
}
