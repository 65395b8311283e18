pub mod captions;
pub mod chunking;
pub mod domain;
pub mod embedding;
pub mod error;
pub mod feed;
pub mod lifecycle;
pub mod mastery;
pub mod ports;
pub mod prompt_pack;
pub mod retrieval;
pub mod topics;

pub use domain::{
    Chunk, ConceptCard, ConceptRequest, Course, FeedEvent, FeedEventKind, GeneratedConcepts,
    MediaType, NewChunk, Progress, ProgressKey, Quiz, QuizAnswer, QuizItem, Reel, ReelScript,
    ReelSource, TimeSpan, Topic, Upload, UploadStatus,
};
pub use error::PipelineError;
pub use lifecycle::{RunOutcome, RunOutcomeKind};
pub use mastery::Interaction;
pub use ports::{
    DatabaseService, GenerationService, ObjectStorage, PortError, PortResult,
    TextExtractionService, TopicArtifacts,
};
