pub mod entry;
pub mod error;
pub mod events;
pub mod queue;
pub mod worker;

pub use entry::{AddOptions, Backoff, QueueCounts, QueueEntry, QueueEntryState};
pub use error::QueueError;
pub use events::QueueEvent;
pub use queue::Queue;
pub use worker::{JobHandler, ProgressReporter, WorkerConfig};
