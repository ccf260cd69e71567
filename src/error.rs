use thiserror::Error;

/// Failure taxonomy for the transcription pipeline.
///
/// Validation and capacity failures are surfaced synchronously to the
/// submitter; everything else happens inside a worker and is reported
/// through the task's progress topic only.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error("worker pool queue is full, try again later")]
    CapacityExceeded,

    #[error("failed to decode media: {0}")]
    MediaDecode(String),

    #[error("recognition process exited with code {code}")]
    RecognitionProcess { code: i32 },

    #[error("recognition engine error: {0}")]
    RecognitionEngine(String),

    #[error("stage '{stage}' exceeded its {secs}s deadline")]
    StageTimeout { stage: &'static str, secs: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
