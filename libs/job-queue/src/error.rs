#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("entry not found: {0}")]
    NotFound(uuid::Uuid),
    #[error("handler error: {0}")]
    Handler(String),
    #[error("corrupt queue state: {0}")]
    Invalid(String),
}
