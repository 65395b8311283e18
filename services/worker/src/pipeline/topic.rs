//! services/worker/src/pipeline/topic.rs
//!
//! Generation for one leaf topic: retrieve facts, ask the backend for concepts,
//! derive captions, fetch narration and video, then persist the topic's artifacts
//! in a single store call.

use crate::state::WorkerState;
use chrono::Utc;
use doomlearn_core::captions::{narration_lines, render_vtt};
use doomlearn_core::domain::{
    Chunk, ConceptRequest, Course, GeneratedConcepts, Progress, ProgressKey, Quiz, Reel,
    ReelSource, Topic,
};
use doomlearn_core::ports::{PortResult, TopicArtifacts};
use doomlearn_core::prompt_pack::build_prompt_pack;
use doomlearn_core::retrieval::retrieve_top_k;
use doomlearn_core::topics::TopicTree;
use doomlearn_core::PipelineError;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Everything a topic needs from its run, shared by the run's topic tasks.
pub(crate) struct TopicContext {
    pub state: Arc<WorkerState>,
    pub course: Course,
    pub tree: TopicTree,
    pub chunks: Vec<Chunk>,
    pub run_id: Uuid,
}

/// Generates and persists the reel (and quiz, if any) for one topic.
pub(crate) async fn process_topic(ctx: &TopicContext, topic: &Topic) -> Result<Reel, PipelineError> {
    let settings = &ctx.state.pipeline;
    let generator = &ctx.state.generator;
    let limit = settings.generation_timeout;

    // --- 1. Retrieval and prompt pack ---
    let query = ctx.state.embedder.embed(&topic.title);
    let hits = retrieve_top_k(&ctx.chunks, &query, settings.retrieval_top_k);
    let pack = build_prompt_pack(
        &topic.title,
        hits.iter().map(|chunk| chunk.text.as_str()),
        settings.pack_limits,
    );
    debug!(topic_id = %topic.id, facts = pack.facts.len(), "Prompt pack assembled");

    // --- 2. Concepts ---
    let request = ConceptRequest {
        topic_title: pack.topic_title,
        facts: pack.facts,
        target_length_secs: ctx.course.reel_length_secs,
    };
    let concepts = bounded(limit, "Concept generation", generator.generate_concepts(&request)).await?;

    // --- 3. Captions ---
    let lines = narration_lines(&concepts.reel_script);
    let captions_vtt = render_vtt(&lines);

    // --- 4. Narration and video ---
    let script = lines.join("\n");
    let prompt = format!("Vertical reel about {}", ctx.tree.breadcrumb(topic.id).join(" > "));
    let (narration, video) = tokio::try_join!(
        bounded(
            limit,
            "Voice synthesis",
            generator.synthesize_voice(&script, &settings.voice_style)
        ),
        bounded(
            limit,
            "Video generation",
            generator.generate_video(&prompt, ctx.course.reel_length_secs)
        ),
    )?;

    let prefix = format!("reels/{}/{}/{}", ctx.course.id, topic.id, ctx.run_id);
    let storage_key = content_key(&prefix, &video, "mp4");
    let narration_key = content_key(&prefix, &narration, "wav");
    ctx.state.storage.put(&storage_key, video, "video/mp4").await?;
    ctx.state.storage.put(&narration_key, narration, "audio/wav").await?;

    // --- 5 & 6. Persist reel, quiz and progress seed together ---
    let now = Utc::now();
    let reel = Reel {
        id: Uuid::new_v4(),
        course_id: ctx.course.id,
        topic_id: topic.id,
        storage_key,
        narration_key: Some(narration_key),
        captions_vtt,
        duration_secs: ctx.course.reel_length_secs,
        source: ReelSource::Generated,
        created_at: now,
    };
    let quiz = first_quiz(&concepts, ctx.course.id, topic, now);
    let progress_seed = Progress::seeded(
        ProgressKey {
            learner_id: ctx.course.owner_id,
            course_id: ctx.course.id,
            topic_id: topic.id,
        },
        now,
    );

    ctx.state
        .db
        .save_topic_artifacts(TopicArtifacts {
            reel: reel.clone(),
            quiz,
            progress_seed,
        })
        .await?;

    Ok(reel)
}

/// Runs one generation call under `limit`. Failures and timeouts are backend errors.
async fn bounded<T, F>(limit: Duration, what: &str, call: F) -> Result<T, PipelineError>
where
    F: Future<Output = PortResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(PipelineError::GenerationBackend(format!("{} failed: {}", what, e))),
        Err(_) => Err(PipelineError::GenerationBackend(format!(
            "{} timed out after {:?}",
            what, limit
        ))),
    }
}

/// `<prefix>/<sha256 of data>.<ext>`
fn content_key(prefix: &str, data: &[u8], ext: &str) -> String {
    format!("{}/{}.{}", prefix, hex::encode(Sha256::digest(data)), ext)
}

/// Only the first generated quiz item is kept.
fn first_quiz(
    concepts: &GeneratedConcepts,
    course_id: Uuid,
    topic: &Topic,
    now: chrono::DateTime<Utc>,
) -> Option<Quiz> {
    let item = concepts.quiz_items.first()?;
    let question = match item.question.trim() {
        "" => format!("Quick check: {}?", topic.title),
        question => question.to_string(),
    };
    Some(Quiz {
        id: Uuid::new_v4(),
        course_id,
        topic_id: topic.id,
        question,
        choices: item.choices.clone(),
        answer_index: item.answer_index,
        explanation: item.explanation.clone(),
        created_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use doomlearn_core::domain::QuizItem;
    use doomlearn_core::ports::PortError;

    fn topic(title: &str) -> Topic {
        Topic {
            id: Uuid::new_v4(),
            course_id: Uuid::nil(),
            parent_id: None,
            title: title.to_string(),
            order_index: 0,
            is_leaf: true,
        }
    }

    #[test]
    fn content_keys_are_scoped_and_addressed_by_content() {
        let a = content_key("reels/c/t/r", b"same", "mp4");
        let b = content_key("reels/c/t/r", b"same", "mp4");
        let c = content_key("reels/c/t/r", b"other", "mp4");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("reels/c/t/r/"));
        assert!(a.ends_with(".mp4"));
        assert_eq!(a.len(), "reels/c/t/r/".len() + 64 + ".mp4".len());
    }

    #[test]
    fn only_the_first_quiz_item_is_kept() {
        let concepts = GeneratedConcepts {
            quiz_items: vec![
                QuizItem {
                    question: "First?".to_string(),
                    choices: vec!["a".to_string(), "b".to_string()],
                    answer_index: 1,
                    explanation: None,
                },
                QuizItem {
                    question: "Second?".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let quiz = first_quiz(&concepts, Uuid::nil(), &topic("Cells"), Utc::now()).unwrap();
        assert_eq!(quiz.question, "First?");
        assert_eq!(quiz.answer_index, 1);
    }

    #[test]
    fn blank_questions_fall_back_to_a_quick_check() {
        let concepts = GeneratedConcepts {
            quiz_items: vec![QuizItem {
                question: "   ".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let quiz = first_quiz(&concepts, Uuid::nil(), &topic("Cells"), Utc::now()).unwrap();
        assert_eq!(quiz.question, "Quick check: Cells?");
    }

    #[test]
    fn no_quiz_items_means_no_quiz() {
        let concepts = GeneratedConcepts::default();
        assert!(first_quiz(&concepts, Uuid::nil(), &topic("Cells"), Utc::now()).is_none());
    }

    #[tokio::test]
    async fn slow_calls_become_backend_errors() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, PortError>(())
        };
        let result = bounded(Duration::from_millis(10), "Video generation", slow).await;
        assert!(matches!(result, Err(PipelineError::GenerationBackend(msg)) if msg.contains("timed out")));
    }

    #[tokio::test]
    async fn port_failures_become_backend_errors() {
        let failing = async { Err::<(), _>(PortError::Unexpected("boom".to_string())) };
        let result = bounded(Duration::from_secs(1), "Voice synthesis", failing).await;
        assert!(matches!(result, Err(PipelineError::GenerationBackend(msg)) if msg.contains("boom")));
    }
}
