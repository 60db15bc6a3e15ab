//! Vector utilities: BLOB encoding for storage and cosine similarity for
//! ranking content parts against a query embedding.
//!
//! The embedding provider traits and their HTTP/no-op backends live in the
//! `ragbridge` app crate; everything here is pure computation.

use crate::models::ContentPart;

/// Encode a vector as little-endian `f32` bytes for a SQLite BLOB column.
///
/// ```rust
/// use ragbridge_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![0.25f32, -1.0];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 8);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a BLOB produced by [`vec_to_blob`]. Trailing bytes that do not
/// form a whole `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Mismatched lengths, empty vectors, and zero-magnitude vectors all score
/// `0.0` rather than erroring: a provider switch that changes dimensions
/// simply stops matching old content.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

/// The content part closest to `query`, with its similarity.
pub fn best_match<'a>(query: &[f32], parts: &'a [ContentPart]) -> Option<(&'a ContentPart, f32)> {
    parts
        .iter()
        .map(|p| (p, cosine_similarity(query, &p.vector)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn part(text: &str, vector: Vec<f32>) -> ContentPart {
        ContentPart {
            text: text.to_string(),
            vector,
            provider_id: "p".to_string(),
            token_count: 1,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn test_blob_ignores_partial_trailing_bytes() {
        let mut blob = vec_to_blob(&[1.5, 2.0]);
        blob.push(0xff);
        assert_eq!(blob_to_vec(&blob), vec![1.5, 2.0]);
    }

    #[test]
    fn test_cosine_parallel_and_orthogonal() {
        assert!((cosine_similarity(&[2.0, 0.0], &[5.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 1.0], &[-1.0, -1.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_best_match_picks_closest_part() {
        let parts = vec![part("far", vec![0.0, 1.0]), part("near", vec![1.0, 0.1])];
        let (best, score) = best_match(&[1.0, 0.0], &parts).unwrap();
        assert_eq!(best.text, "near");
        assert!(score > 0.9);
        assert!(best_match(&[1.0, 0.0], &[]).is_none());
    }
}
