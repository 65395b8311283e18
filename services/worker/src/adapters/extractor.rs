//! services/worker/src/adapters/extractor.rs
//!
//! Text extraction for uploaded sources. Documents go through `pdf-extract`;
//! video yields a fixed transcript placeholder until a speech-to-text backend is
//! wired in behind the same port.

use async_trait::async_trait;
use bytes::Bytes;
use doomlearn_core::domain::MediaType;
use doomlearn_core::ports::{PortError, PortResult, TextExtractionService};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Returned for video uploads; transcription is not implemented.
pub const VIDEO_TRANSCRIPT_PLACEHOLDER: &str =
    "Transcript placeholder (video speech-to-text is not implemented).";

static HORIZONTAL_WS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\x{00A0}]+").expect("static whitespace pattern"));

/// Extracts PDF documents page by page and stands in for video transcription.
#[derive(Clone, Default)]
pub struct SourceTextExtractor;

impl SourceTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextExtractionService for SourceTextExtractor {
    async fn extract(&self, data: Bytes, media_type: MediaType) -> PortResult<String> {
        match media_type {
            MediaType::Video => Ok(VIDEO_TRANSCRIPT_PLACEHOLDER.to_string()),
            MediaType::Document => {
                // Parsing is CPU-bound and may panic on hostile input; keep it off the
                // async workers.
                let pages = tokio::task::spawn_blocking(move || {
                    pdf_extract::extract_text_from_mem_by_pages(&data)
                })
                .await
                .map_err(|e| PortError::Unexpected(format!("PDF parser aborted: {}", e)))?
                .map_err(|e| PortError::Unexpected(format!("Unreadable PDF: {}", e)))?;

                let page_count = pages.len();
                let text = join_pages(&pages);
                debug!(pages = page_count, chars = text.len(), "Extracted document text");
                Ok(text)
            }
        }
    }
}

/// Tidies each page and joins the non-empty ones with a blank line, preserving
/// page order.
fn join_pages<S: AsRef<str>>(pages: &[S]) -> String {
    pages
        .iter()
        .map(|page| {
            let page = page.as_ref();
            page.lines()
                .map(|line| HORIZONTAL_WS.replace_all(line.trim(), " ").into_owned())
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string()
        })
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
