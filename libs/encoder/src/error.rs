use media_core::Resolution;

/// Not retriable at this layer — the pipeline stage that wraps the call
/// decides whether the queue should retry the whole job.
#[derive(Debug, thiserror::Error)]
#[error("encoder error for {resolution:?}: {underlying}")]
pub struct EncoderError {
    pub resolution: Option<Resolution>,
    pub underlying: String,
}

impl EncoderError {
    pub fn new(resolution: Option<Resolution>, underlying: impl Into<String>) -> Self {
        EncoderError {
            resolution,
            underlying: underlying.into(),
        }
    }
}
