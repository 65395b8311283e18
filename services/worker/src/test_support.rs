//! services/worker/src/test_support.rs
//!
//! In-memory wiring shared by the unit tests of this crate.

use crate::adapters::{MemoryDbAdapter, MemoryObjectStorage, MockGenerationAdapter, SourceTextExtractor};
use crate::config::PipelineSettings;
use crate::state::WorkerState;
use bytes::Bytes;
use chrono::Utc;
use doomlearn_core::domain::{Course, MediaType, Topic, Upload, UploadStatus};
use doomlearn_core::embedding::HashEmbedder;
use doomlearn_core::ports::ObjectStorage;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub(crate) struct Fixture {
    pub state: Arc<WorkerState>,
    pub db: Arc<MemoryDbAdapter>,
    pub storage: Arc<MemoryObjectStorage>,
    pub course: Course,
    pub topics: Vec<Topic>,
}

impl Fixture {
    /// A course with one leaf topic per title, in the given order.
    pub async fn with_topics(titles: &[&str]) -> Self {
        let db = Arc::new(MemoryDbAdapter::new());
        let storage = Arc::new(MemoryObjectStorage::new());
        let course = Course {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: "Biology".to_string(),
            reel_length_secs: 30,
        };
        db.insert_course(course.clone()).await;

        let mut topics = Vec::new();
        for (i, title) in titles.iter().enumerate() {
            let topic = Topic {
                id: Uuid::new_v4(),
                course_id: course.id,
                parent_id: None,
                title: title.to_string(),
                order_index: i as i32,
                is_leaf: true,
            };
            db.insert_topic(topic.clone()).await;
            topics.push(topic);
        }

        let state = Arc::new(WorkerState {
            db: db.clone(),
            storage: storage.clone(),
            generator: Arc::new(MockGenerationAdapter::new()),
            extractor: Arc::new(SourceTextExtractor::new()),
            embedder: Arc::new(HashEmbedder::new(32)),
            pipeline: PipelineSettings::default(),
            presign_ttl: Duration::from_secs(60),
        });

        Self {
            state,
            db,
            storage,
            course,
            topics,
        }
    }

    /// A video upload; its text is the transcript placeholder.
    pub async fn video_upload(&self) -> Uuid {
        let key = format!("uploads/{}.mp4", Uuid::new_v4());
        self.storage
            .put(&key, Bytes::from_static(b"video"), "video/mp4")
            .await
            .unwrap();
        let upload = Upload {
            id: Uuid::new_v4(),
            course_id: self.course.id,
            media_type: MediaType::Video,
            storage_key: key,
            status: UploadStatus::Uploaded,
            run_id: None,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let id = upload.id;
        self.db.insert_upload(upload).await;
        id
    }
}
