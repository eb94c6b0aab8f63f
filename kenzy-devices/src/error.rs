use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device pipeline stage failed: {0}")]
    PipelineStage(String),

    #[error("device is not running")]
    NotRunning,
}
