//! services/worker/src/error.rs
//!
//! Defines the primary error type for the worker's bootstrap path.

use crate::config::ConfigError;
use doomlearn_core::{PipelineError, PortError};

/// The primary error type for the `worker` service.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents a pipeline component that could not be constructed.
    #[error("Pipeline Error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a failure while applying database migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., reading dispatch input).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}
