use crate::entry::QueueEntry;

/// Lifecycle events the queue delivers to registered listeners. The pipeline
/// subscribes to these and translates them into job store writes — the
/// queue itself never touches the job store.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    Active(QueueEntry),
    Progress(QueueEntry, u8),
    Completed(QueueEntry, serde_json::Value),
    /// `terminal` is true once `attempts_made >= attempts` and the entry has
    /// moved to its final `failed` retention slot; false for an attempt that
    /// will be retried.
    Failed {
        entry: QueueEntry,
        error: String,
        terminal: bool,
    },
    Stalled(QueueEntry),
}
