//! services/worker/src/adapters/mock_generation.rs
//!
//! A deterministic stand-in for the generation backend. Output depends only on the
//! inputs, which keeps pipeline runs reproducible in development and tests.

use async_trait::async_trait;
use bytes::Bytes;
use doomlearn_core::domain::{ConceptCard, ConceptRequest, GeneratedConcepts, QuizItem, ReelScript};
use doomlearn_core::ports::{GenerationService, PortError, PortResult};
use hound::{WavSpec, WavWriter};
use sha2::{Digest, Sha256};

const NARRATION_SAMPLE_RATE: u32 = 22_050;

/// Marks the placeholder video blobs this backend produces.
pub const MOCK_VIDEO_MAGIC: &[u8] = b"DOOMLEARN-MOCK-VIDEO\n";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone, Default)]
pub struct MockGenerationAdapter;

impl MockGenerationAdapter {
    pub fn new() -> Self {
        Self
    }

    fn seed(parts: &[&str]) -> u32 {
        let digest = Sha256::digest(parts.join("::").as_bytes());
        u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
    }

    /// One second of 16-bit mono silence.
    fn silent_wav() -> Result<Vec<u8>, hound::Error> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        let spec = WavSpec {
            channels: 1,
            sample_rate: NARRATION_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for _ in 0..NARRATION_SAMPLE_RATE {
            writer.write_sample(0i16)?;
        }
        writer.finalize()?;
        Ok(cursor.into_inner())
    }
}

//=========================================================================================
// `GenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl GenerationService for MockGenerationAdapter {
    async fn generate_concepts(&self, request: &ConceptRequest) -> PortResult<GeneratedConcepts> {
        let topic = if request.topic_title.trim().is_empty() {
            "Topic"
        } else {
            request.topic_title.trim()
        };
        let facts = request.facts.join("\n");
        let seed = Self::seed(&["llm", topic, &facts, &request.target_length_secs.to_string()]);

        Ok(GeneratedConcepts {
            concept_cards: vec![ConceptCard {
                title: format!("{}: Core idea #{}", topic, seed % 3 + 1),
                definition: format!("A short definition for {}.", topic),
                example: Some(format!("An example application of {}.", topic)),
                check_for_understanding: Some(format!(
                    "What is the key intuition behind {}?",
                    topic
                )),
            }],
            reel_script: ReelScript {
                hook: Some(format!(
                    "Stop scrolling: learn {} in {} seconds.",
                    topic, request.target_length_secs
                )),
                steps: vec![
                    format!("Define {} in one sentence.", topic),
                    format!("Show a quick example for {}.", topic),
                    "End with a one-line recap.".to_string(),
                ],
                cta: Some("Save this and try the quiz.".to_string()),
            },
            quiz_items: vec![QuizItem {
                question: format!("Which statement best describes {}?", topic),
                choices: vec![
                    format!("It is a key concept in {}.", topic),
                    "It is unrelated trivia.".to_string(),
                    "It is always false.".to_string(),
                    "It only applies in rare cases.".to_string(),
                ],
                answer_index: 0,
                explanation: Some(format!("{} is introduced as a core concept.", topic)),
            }],
        })
    }

    async fn synthesize_voice(&self, _script: &str, _voice_style: &str) -> PortResult<Bytes> {
        Self::silent_wav()
            .map(Bytes::from)
            .map_err(|e| PortError::Unexpected(format!("Failed to encode WAV: {}", e)))
    }

    async fn generate_video(&self, prompt: &str, duration_secs: u32) -> PortResult<Bytes> {
        let mut blob = MOCK_VIDEO_MAGIC.to_vec();
        blob.extend_from_slice(
            format!("duration={}\nprompt={}\n", duration_secs.max(1), prompt).as_bytes(),
        );
        Ok(Bytes::from(blob))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doomlearn_core::captions::narration_lines;

    fn request(title: &str) -> ConceptRequest {
        ConceptRequest {
            topic_title: title.to_string(),
            facts: vec!["Cells divide.".to_string()],
            target_length_secs: 30,
        }
    }

    #[tokio::test]
    async fn concepts_are_deterministic_and_well_formed() {
        let backend = MockGenerationAdapter::new();
        let first = backend.generate_concepts(&request("Mitosis")).await.unwrap();
        let second = backend.generate_concepts(&request("Mitosis")).await.unwrap();
        assert_eq!(first, second);

        assert_eq!(narration_lines(&first.reel_script).len(), 5);
        let quiz = &first.quiz_items[0];
        assert_eq!(quiz.choices.len(), 4);
        assert!(quiz.answer_index < quiz.choices.len());
    }

    #[tokio::test]
    async fn narration_is_a_one_second_wav() {
        let audio = MockGenerationAdapter::new()
            .synthesize_voice("Hello", "default")
            .await
            .unwrap();
        let reader = hound::WavReader::new(std::io::Cursor::new(audio.to_vec())).unwrap();
        assert_eq!(reader.spec().sample_rate, NARRATION_SAMPLE_RATE);
        assert_eq!(reader.duration(), NARRATION_SAMPLE_RATE);
    }

    #[tokio::test]
    async fn video_blob_records_prompt_and_duration() {
        let video = MockGenerationAdapter::new()
            .generate_video("Vertical reel about DNA", 30)
            .await
            .unwrap();
        assert!(video.starts_with(MOCK_VIDEO_MAGIC));
        let body = String::from_utf8_lossy(&video[MOCK_VIDEO_MAGIC.len()..]).to_string();
        assert!(body.contains("duration=30"));
        assert!(body.contains("Vertical reel about DNA"));
    }
}
