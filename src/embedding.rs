// src/embedding.rs - Embedding providers for the semantic ledger
// Maps text onto fixed-dimension vectors. Two providers: a local Ollama
// endpoint for true semantic vectors, and a deterministic in-process
// feature hasher that needs no sidecar and never fails. Both are
// deterministic per model, which the ledger's hit semantics require.

use async_trait::async_trait;
use std::time::Duration;

/// Vector width of the feature-hashed provider.
pub const HASHED_DIMENSIONS: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding transport failure: {0}")]
    Transport(String),

    #[error("embedding response was malformed")]
    Malformed,
}

/// Embedding seam for the ledger.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Identifies the model so mixed-provider ledgers can be detected.
    fn model_id(&self) -> &str;
}

// ==================== COSINE GEOMETRY ====================

/// Cosine distance in [0, 2]. Degenerate inputs (mismatched dimensions,
/// zero vectors) report maximum distance so they can never produce a
/// ledger hit.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 2.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 2.0;
    }

    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

// ==================== FEATURE-HASHED PROVIDER ====================

/// Deterministic bag-of-tokens feature hasher.
///
/// Each lowercased alphanumeric token is hashed onto one of
/// `HASHED_DIMENSIONS` buckets with a signed weight, and the result is
/// L2-normalized. Exact duplicate queries always collide at distance 0;
/// token-overlapping queries land nearby. Crude next to a learned model,
/// but it keeps the ledger operational with zero external dependencies.
pub struct HashedEmbedder {
    dimensions: usize,
}

impl HashedEmbedder {
    pub fn new() -> Self {
        Self {
            dimensions: HASHED_DIMENSIONS,
        }
    }
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for HashedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = blake3::hash(token.as_bytes());
            let bytes = digest.as_bytes();
            let mut prefix = [0u8; 8];
            prefix.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(prefix) % self.dimensions as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }

        Ok(vector)
    }

    fn model_id(&self) -> &str {
        "hashed-bow-256"
    }
}

// ==================== OLLAMA PROVIDER ====================

/// Local Ollama embedding endpoint.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": text,
        });

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbeddingError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EmbeddingError::Transport(format!(
                "status {}",
                response.status()
            )));
        }

        let envelope: serde_json::Value = response
            .json()
            .await
            .map_err(|_| EmbeddingError::Malformed)?;

        let vector = envelope["embedding"]
            .as_array()
            .ok_or(EmbeddingError::Malformed)?
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or(EmbeddingError::Malformed)?;

        if vector.is_empty() {
            return Err(EmbeddingError::Malformed);
        }
        Ok(vector)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hashed_embedding_is_deterministic() {
        let embedder = HashedEmbedder::new();
        let a = embedder.embed("the answer is 42").await.unwrap();
        let b = embedder.embed("the answer is 42").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), HASHED_DIMENSIONS);
    }

    #[tokio::test]
    async fn test_identical_text_has_zero_distance() {
        let embedder = HashedEmbedder::new();
        let a = embedder.embed("capital of France").await.unwrap();
        let b = embedder.embed("capital of France").await.unwrap();
        assert!(cosine_distance(&a, &b) < 1e-6);
    }

    #[tokio::test]
    async fn test_disjoint_text_is_far() {
        let embedder = HashedEmbedder::new();
        let a = embedder.embed("orbital mechanics of jupiter").await.unwrap();
        let b = embedder.embed("sourdough starter hydration").await.unwrap();
        assert!(cosine_distance(&a, &b) > 0.5);
    }

    #[tokio::test]
    async fn test_overlapping_text_is_closer_than_disjoint() {
        let embedder = HashedEmbedder::new();
        let base = embedder.embed("boiling point of water at altitude").await.unwrap();
        let near = embedder.embed("the boiling point of water at high altitude").await.unwrap();
        let far = embedder.embed("annual migration of arctic terns").await.unwrap();
        assert!(cosine_distance(&base, &near) < cosine_distance(&base, &far));
    }

    #[tokio::test]
    async fn test_empty_text_never_matches() {
        let embedder = HashedEmbedder::new();
        let empty = embedder.embed("").await.unwrap();
        let other = embedder.embed("something").await.unwrap();
        assert_eq!(cosine_distance(&empty, &other), 2.0);
    }

    #[test]
    fn test_cosine_distance_geometry() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]) < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_dimension_mismatch_is_maximal() {
        assert_eq!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 2.0);
        assert_eq!(cosine_distance(&[], &[]), 2.0);
    }
}
