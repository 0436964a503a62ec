use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Auth,
    Download,
    Upload,
    List,
    Delete,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Auth => "auth",
            Stage::Download => "download",
            Stage::Upload => "upload",
            Stage::List => "list",
            Stage::Delete => "delete",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network, 5xx, and auth-expired errors are retriable; 4xx other than 401
/// are terminal.
#[derive(Debug, thiserror::Error)]
#[error("object store {stage} error: {message} (retriable={retriable})")]
pub struct ObjectStoreError {
    pub stage: Stage,
    pub retriable: bool,
    pub message: String,
}

impl ObjectStoreError {
    pub fn new(stage: Stage, retriable: bool, message: impl Into<String>) -> Self {
        ObjectStoreError {
            stage,
            retriable,
            message: message.into(),
        }
    }

    /// Classifies an HTTP status code per the retriable/terminal split.
    pub fn from_status(stage: Stage, status: u16, message: impl Into<String>) -> Self {
        let retriable = status >= 500 || status == 401 || status == 408 || status == 429;
        ObjectStoreError::new(stage, retriable, message)
    }
}
