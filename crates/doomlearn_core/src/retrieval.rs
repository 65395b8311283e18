//! crates/doomlearn_core/src/retrieval.rs
//!
//! Nearest-neighbour retrieval over stored chunk embeddings.
//!
//! An exact linear scan: chunks are ranked by cosine distance to the query,
//! ties keep insertion order, and chunks without an embedding never match.

use crate::domain::Chunk;

/// Cosine distance (`1 - cos θ`). Returns `None` for mismatched or zero vectors.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(1.0 - dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// The `k` chunks closest to `query`, nearest first.
///
/// `chunks` must be in insertion order; that order breaks distance ties.
pub fn retrieve_top_k<'a>(chunks: &'a [Chunk], query: &[f32], k: usize) -> Vec<&'a Chunk> {
    let mut scored: Vec<(f64, &Chunk)> = chunks
        .iter()
        .filter_map(|chunk| {
            let embedding = chunk.embedding.as_deref()?;
            cosine_distance(embedding, query).map(|d| (d, chunk))
        })
        .collect();

    // `sort_by` is stable, so equal distances keep their insertion order.
    scored.sort_by(|a, b| a.0.total_cmp(&b.0));
    scored.into_iter().take(k).map(|(_, chunk)| chunk).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn chunk(text: &str, embedding: Option<Vec<f32>>) -> Chunk {
        Chunk {
            id: Uuid::new_v4(),
            upload_id: Uuid::nil(),
            topic_id: None,
            text: text.to_string(),
            embedding,
            span: None,
        }
    }

    fn texts<'a>(chunks: &[&'a Chunk]) -> Vec<&'a str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn ranks_by_cosine_distance() {
        let chunks = vec![
            chunk("far", Some(vec![-1.0, 0.0])),
            chunk("near", Some(vec![1.0, 0.1])),
            chunk("exact", Some(vec![1.0, 0.0])),
            chunk("orthogonal", Some(vec![0.0, 1.0])),
        ];
        let top = retrieve_top_k(&chunks, &[1.0, 0.0], 3);
        assert_eq!(texts(&top), vec!["exact", "near", "orthogonal"]);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let chunks = vec![
            chunk("first", Some(vec![0.0, 1.0])),
            chunk("second", Some(vec![0.0, 2.0])),
            chunk("third", Some(vec![0.0, 1.0])),
        ];
        let top = retrieve_top_k(&chunks, &[0.0, 1.0], 3);
        assert_eq!(texts(&top), vec!["first", "second", "third"]);
    }

    #[test]
    fn chunks_without_embeddings_are_never_returned() {
        let chunks = vec![
            chunk("missing", None),
            chunk("wrong-dim", Some(vec![1.0, 0.0, 0.0])),
            chunk("present", Some(vec![0.5, 0.5])),
        ];
        let top = retrieve_top_k(&chunks, &[1.0, 0.0], 10);
        assert_eq!(texts(&top), vec!["present"]);
    }

    #[test]
    fn k_larger_than_scope_returns_everything_and_zero_returns_nothing() {
        let chunks = vec![chunk("a", Some(vec![1.0])), chunk("b", Some(vec![1.0]))];
        assert_eq!(retrieve_top_k(&chunks, &[1.0], 10).len(), 2);
        assert!(retrieve_top_k(&chunks, &[1.0], 0).is_empty());
    }

    #[test]
    fn distance_of_identical_unit_vectors_is_zero() {
        let d = cosine_distance(&[0.6, 0.8], &[0.6, 0.8]).unwrap();
        assert!(d.abs() < 1e-9);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), None);
    }
}
