//! crates/doomlearn_core/src/embedding.rs
//!
//! Text embeddings.
//!
//! Every embedder returns unit-length vectors of a fixed dimension, so cosine
//! similarity reduces to a dot product.

use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::error::PipelineError;

/// Maps text to a fixed-length, L2-normalized vector.
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    /// Deterministic for a given configuration.
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Builds the embedder named by `mode`. Only `mock` exists today; anything else
/// is rejected instead of silently falling back.
pub fn embedder_for(mode: &str, dimension: usize) -> Result<Arc<dyn Embedder>, PipelineError> {
    if dimension == 0 {
        return Err(PipelineError::EmbeddingConfig(
            "vector dimension must be greater than 0".to_string(),
        ));
    }
    match mode.trim().to_ascii_lowercase().as_str() {
        "mock" => Ok(Arc::new(HashEmbedder::new(dimension))),
        other => Err(PipelineError::EmbeddingConfig(format!(
            "embeddings mode '{}' is not supported; use 'mock'",
            other
        ))),
    }
}

/// Derives a vector from a SHA-256 stream over the text. Carries no semantics; it
/// keeps the pipeline reproducible without a model.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    const DOMAIN: &'static [u8] = b"doomlearn-embed-v1";

    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn block(text: &str, counter: u64) -> Vec<u8> {
        Sha256::new()
            .chain_update(Self::DOMAIN)
            .chain_update((text.len() as u64).to_le_bytes())
            .chain_update(text.as_bytes())
            .chain_update(counter.to_le_bytes())
            .finalize()
            .to_vec()
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut raw: Vec<f64> = Vec::with_capacity(self.dimension);
        let mut counter = 0u64;
        while raw.len() < self.dimension {
            let block = Self::block(text, counter);
            for word in block.chunks_exact(4) {
                if raw.len() == self.dimension {
                    break;
                }
                let value = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
                raw.push(value as f64 / u32::MAX as f64 * 2.0 - 1.0);
            }
            counter += 1;
        }
        normalize(&raw)
    }
}

fn normalize(values: &[f64]) -> Vec<f32> {
    let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm == 0.0 {
        return values.iter().map(|&v| v as f32).collect();
    }
    values.iter().map(|v| (v / norm) as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l2(v: &[f32]) -> f64 {
        v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt()
    }

    #[test]
    fn same_text_same_vector() {
        let embedder = HashEmbedder::new(384);
        assert_eq!(embedder.embed("photosynthesis"), embedder.embed("photosynthesis"));
    }

    #[test]
    fn vectors_are_unit_length_with_the_configured_dimension() {
        let embedder = HashEmbedder::new(384);
        let long = "long ".repeat(500);
        for text in ["a", "Cell membranes", "ünïcode text", long.as_str()] {
            let v = embedder.embed(text);
            assert_eq!(v.len(), 384);
            assert!((l2(&v) - 1.0).abs() < 1e-5, "norm was {}", l2(&v));
        }
    }

    #[test]
    fn odd_dimensions_are_filled_exactly() {
        let v = HashEmbedder::new(13).embed("x");
        assert_eq!(v.len(), 13);
    }

    #[test]
    fn different_texts_differ() {
        let embedder = HashEmbedder::new(64);
        assert_ne!(embedder.embed("mitosis"), embedder.embed("meiosis"));
    }

    #[test]
    fn unsupported_configuration_fails_fast() {
        assert!(matches!(
            embedder_for("local", 384),
            Err(PipelineError::EmbeddingConfig(_))
        ));
        assert!(matches!(
            embedder_for("mock", 0),
            Err(PipelineError::EmbeddingConfig(_))
        ));
        let embedder = embedder_for("MOCK", 16).unwrap();
        assert_eq!(embedder.dimension(), 16);
    }
}
