use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueEntryState {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
}

impl QueueEntryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueEntryState::Waiting => "waiting",
            QueueEntryState::Active => "active",
            QueueEntryState::Completed => "completed",
            QueueEntryState::Failed => "failed",
            QueueEntryState::Delayed => "delayed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub entry_id: Uuid,
    pub job_id: Uuid,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub attempts_made: u32,
    pub state: QueueEntryState,
    pub enqueued_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Backoff policy; only exponential delay between retry attempts is implemented.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base_ms: u64,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff { base_ms: 2000 }
    }
}

impl Backoff {
    /// `base_ms * 2^(attempts_made-1)`. `attempts_made` is 1-indexed (the
    /// attempt that just failed).
    pub fn delay_ms(&self, attempts_made: u32) -> u64 {
        self.base_ms * 2u64.saturating_pow(attempts_made.saturating_sub(1))
    }
}

#[derive(Debug, Clone)]
pub struct AddOptions {
    pub priority: i32,
    pub attempts: u32,
    pub backoff: Backoff,
    pub remove_on_complete: u32,
    pub remove_on_fail: u32,
    pub delay_ms: u64,
}

impl Default for AddOptions {
    fn default() -> Self {
        AddOptions {
            priority: 0,
            attempts: 3,
            backoff: Backoff::default(),
            remove_on_complete: 10,
            remove_on_fail: 5,
            delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueCounts {
    pub waiting: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
    pub delayed: i64,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_matches_spec_formula() {
        let backoff = Backoff { base_ms: 2000 };
        assert_eq!(backoff.delay_ms(1), 2000);
        assert_eq!(backoff.delay_ms(2), 4000);
        assert_eq!(backoff.delay_ms(3), 8000);
    }
}
