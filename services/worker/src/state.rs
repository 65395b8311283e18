//! services/worker/src/state.rs
//!
//! The handles a pipeline run, the feed and interaction recording work against.
//! Built once by the process bootstrap and shared behind an `Arc`.

use crate::config::PipelineSettings;
use doomlearn_core::embedding::Embedder;
use doomlearn_core::ports::{
    DatabaseService, GenerationService, ObjectStorage, TextExtractionService,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct WorkerState {
    pub db: Arc<dyn DatabaseService>,
    pub storage: Arc<dyn ObjectStorage>,
    pub generator: Arc<dyn GenerationService>,
    pub extractor: Arc<dyn TextExtractionService>,
    pub embedder: Arc<dyn Embedder>,
    pub pipeline: PipelineSettings,
    /// Lifetime of the presigned URLs handed out with feed reels.
    pub presign_ttl: Duration,
}
