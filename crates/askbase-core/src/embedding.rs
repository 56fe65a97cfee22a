//! Embedding trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that all embedding backends implement,
//! plus pure helper functions for vector serialization and similarity
//! computation.
//!
//! Concrete providers (OpenAI, Ollama) live in the `askbase` app crate.

use async_trait::async_trait;

use crate::error::ConversionError;

/// Turns text into a fixed-dimension vector.
///
/// Implementations must be `Send + Sync`; the orchestrator shares one
/// instance across concurrent requests.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ConversionError>;

    /// Embed several texts, one vector per input in input order.
    ///
    /// The default embeds one text at a time; HTTP providers override it
    /// to send a whole batch per request.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ConversionError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Reject vectors whose length does not match the expected dimensionality.
///
/// An `expected` of `0` disables the check.
pub fn check_dims(vector: Vec<f32>, expected: usize) -> Result<Vec<f32>, ConversionError> {
    if vector.is_empty() {
        return Err(ConversionError::Malformed("empty vector".to_string()));
    }
    if expected != 0 && vector.len() != expected {
        return Err(ConversionError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(vector)
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use askbase_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or
/// vectors of different lengths.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Similarity score used for matching: cosine similarity clamped to
/// `[0.0, 1.0]` and widened to `f64`. Non-finite results score `0.0`.
pub fn similarity_score(a: &[f32], b: &[f32]) -> f64 {
    let cos = cosine_similarity(a, b) as f64;
    if cos.is_finite() {
        cos.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_different_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_score_clamps_negative() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert_eq!(similarity_score(&a, &b), 0.0);
    }

    #[test]
    fn test_score_of_infinite_vector_is_zero() {
        let a = vec![f32::INFINITY, 1.0];
        let b = vec![1.0, 0.0];
        assert_eq!(similarity_score(&a, &b), 0.0);
    }

    #[test]
    fn test_check_dims() {
        assert!(check_dims(vec![0.1, 0.2], 2).is_ok());
        assert!(check_dims(vec![0.1, 0.2], 0).is_ok());
        assert_eq!(
            check_dims(vec![0.1], 3),
            Err(ConversionError::DimensionMismatch {
                expected: 3,
                actual: 1
            })
        );
        assert!(matches!(
            check_dims(Vec::new(), 3),
            Err(ConversionError::Malformed(_))
        ));
    }
}
