//! services/worker/src/pipeline/mod.rs
//!
//! The content-generation pipeline: one run per upload.

mod run;
mod topic;

pub use run::run_upload;
