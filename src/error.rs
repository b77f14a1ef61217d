use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the pipeline.
///
/// Nothing above the pipeline boundary propagates these as panics or early
/// returns from background threads; they are turned into error events whose
/// text is the `Display` output below.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("invalid video source '{source_id}': {reason}")]
    InvalidSource { source_id: String, reason: String },

    #[error("unable to open video source: {0}")]
    SourceUnavailable(String),

    #[error("failed to open video source {source_id}: {message}")]
    SourceOpen { source_id: String, message: String },

    #[error("frame read failed: {0}")]
    FrameRead(String),

    #[error("error processing frame: {0}")]
    Detection(String),

    #[error("error releasing {resource}: {message}")]
    ResourceRelease {
        resource: &'static str,
        message: String,
    },

    #[error("frame interval must be a positive integer, got {0}")]
    InvalidFrameInterval(u64),

    #[error("model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    pub(crate) fn release(resource: &'static str, err: &anyhow::Error) -> Self {
        Self::ResourceRelease {
            resource,
            message: format!("{err:#}"),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
