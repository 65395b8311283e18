pub mod db;
pub mod extractor;
pub mod memory;
pub mod mock_generation;
pub mod openai_generation;
pub mod storage;

pub use db::DbAdapter;
pub use extractor::SourceTextExtractor;
pub use memory::MemoryDbAdapter;
pub use mock_generation::MockGenerationAdapter;
pub use openai_generation::OpenAiGenerationAdapter;
pub use storage::{FsObjectStorage, MemoryObjectStorage};
