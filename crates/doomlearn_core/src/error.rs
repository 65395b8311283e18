//! crates/doomlearn_core/src/error.rs
//!
//! Error kinds raised by the content-generation pipeline.

use crate::ports::PortError;

/// Every way a pipeline run can fail. The run boundary turns any of these into a
/// `failed` upload status.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The source bytes could not be turned into text.
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// The embedding configuration is not supported.
    #[error("Unsupported embedding configuration: {0}")]
    EmbeddingConfig(String),

    /// A generation call failed, timed out, or is misconfigured.
    #[error("Generation backend error: {0}")]
    GenerationBackend(String),

    /// A referenced upload, course or topic does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The relational or object store failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<PortError> for PipelineError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(what) => PipelineError::NotFound(what),
            other => PipelineError::Storage(other.to_string()),
        }
    }
}
