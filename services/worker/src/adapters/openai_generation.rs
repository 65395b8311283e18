//! services/worker/src/adapters/openai_generation.rs
//!
//! The live generation backend. Concept packs come from a chat completion that is
//! asked for strict JSON; narration comes from OpenAI's speech endpoint.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        audio::{CreateSpeechRequest, SpeechModel, Voice},
        chat::{
            ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
            CreateChatCompletionRequestArgs,
        },
    },
    Client,
};
use async_trait::async_trait;
use bytes::Bytes;
use doomlearn_core::domain::{ConceptRequest, GeneratedConcepts};
use doomlearn_core::ports::{GenerationService, PortError, PortResult};
use tracing::debug;

const CONCEPT_SYSTEM_PROMPT: &str = "You are an instructional designer writing 30-60 second \
vertical study reels. Use ONLY the provided facts. Respond with a single JSON object and \
nothing else, shaped as: {\"concept_cards\": [{\"title\": str, \"definition\": str, \
\"example\": str|null, \"check_for_understanding\": str|null}], \"reel_script\": {\"hook\": \
str, \"steps\": [str], \"cta\": str}, \"quiz_items\": [{\"question\": str, \"choices\": [str], \
\"answer_index\": int, \"explanation\": str}]}. Quiz items have exactly four choices.";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `GenerationService` using OpenAI chat and speech models.
#[derive(Clone)]
pub struct OpenAiGenerationAdapter {
    client: Client<OpenAIConfig>,
    model: String,
    voice: Voice,
}

impl OpenAiGenerationAdapter {
    pub fn new(client: Client<OpenAIConfig>, model: String, voice: Voice) -> Self {
        Self {
            client,
            model,
            voice,
        }
    }
}

//=========================================================================================
// `GenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl GenerationService for OpenAiGenerationAdapter {
    async fn generate_concepts(&self, request: &ConceptRequest) -> PortResult<GeneratedConcepts> {
        let payload = serde_json::to_string(request)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(CONCEPT_SYSTEM_PROMPT)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(payload)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Unexpected("Concept model returned no text content.".to_string())
            })?;

        debug!(topic = %request.topic_title, chars = content.len(), "Concept model responded");
        parse_concepts(&content)
    }

    async fn synthesize_voice(&self, script: &str, _voice_style: &str) -> PortResult<Bytes> {
        let request = CreateSpeechRequest {
            model: SpeechModel::Tts1,
            input: script.to_string(),
            voice: self.voice.clone(),
            ..Default::default()
        };

        let response = self
            .client
            .audio()
            .speech()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        Ok(response.bytes)
    }

    async fn generate_video(&self, _prompt: &str, _duration_secs: u32) -> PortResult<Bytes> {
        Err(PortError::Unexpected(
            "Video generation is not available on the OpenAI backend.".to_string(),
        ))
    }
}

/// Parses the model's JSON reply, tolerating a surrounding markdown code fence.
fn parse_concepts(content: &str) -> PortResult<GeneratedConcepts> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim())
        .map_err(|e| PortError::Unexpected(format!("Concept model returned invalid JSON: {}", e)))
}

/// Maps a configured voice name onto the speech API's voices.
pub fn voice_from_name(name: &str) -> Option<Voice> {
    match name.to_lowercase().as_str() {
        "alloy" => Some(Voice::Alloy),
        "echo" => Some(Voice::Echo),
        "fable" => Some(Voice::Fable),
        "onyx" => Some(Voice::Onyx),
        "nova" => Some(Voice::Nova),
        "shimmer" => Some(Voice::Shimmer),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = r#"{
        "concept_cards": [{"title": "Osmosis", "definition": "Water moves across membranes."}],
        "reel_script": {"hook": "Why do raisins swell?", "steps": ["Membranes", "Gradients"], "cta": "Try the quiz"},
        "quiz_items": [{"question": "Osmosis moves?", "choices": ["Water", "Salt", "Light", "Heat"], "answer_index": 0}]
    }"#;

    #[test]
    fn plain_json_replies_parse() {
        let concepts = parse_concepts(REPLY).unwrap();
        assert_eq!(concepts.concept_cards[0].title, "Osmosis");
        assert_eq!(concepts.reel_script.steps.len(), 2);
        assert_eq!(concepts.quiz_items[0].answer_index, 0);
    }

    #[test]
    fn fenced_replies_parse() {
        let fenced = format!("```json\n{}\n```", REPLY);
        assert_eq!(parse_concepts(&fenced).unwrap(), parse_concepts(REPLY).unwrap());
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let concepts = parse_concepts("{}").unwrap();
        assert!(concepts.quiz_items.is_empty());
        assert!(concepts.reel_script.hook.is_none());
    }

    #[test]
    fn prose_replies_are_rejected() {
        assert!(parse_concepts("Sure! Here is your reel.").is_err());
    }

    #[test]
    fn voices_resolve_case_insensitively() {
        assert!(voice_from_name("Nova").is_some());
        assert!(voice_from_name("robot").is_none());
    }
}
