//! Text embedding behind the [`TextEmbedder`] seam.
//!
//! The production embedder posts batches to an OpenAI-compatible
//! `/embeddings` endpoint. The offline default is a deterministic
//! feature-hashing embedder so lower tiers and tests never need network.
//! Both produce unit-L2 vectors; normalization happens here, not in the
//! backend.

use async_trait::async_trait;
use anyhow::Result;

use llm_client::EmbeddingsClient;

/// How much body text joins the title in the embedding input.
const CONTENT_PREFIX_CHARS: usize = 1000;

#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// One unit vector per input text, same order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn model_id(&self) -> &str;
    fn dimension(&self) -> usize;
}

/// Remote embedder over an OpenAI-compatible endpoint, chunking inputs into
/// API-sized batches.
pub struct RemoteEmbedder {
    client: EmbeddingsClient,
    dimension: usize,
    batch_size: usize,
}

impl RemoteEmbedder {
    pub fn new(client: EmbeddingsClient, dimension: usize, batch_size: usize) -> Self {
        Self {
            client,
            dimension,
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait]
impl TextEmbedder for RemoteEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            let mut vectors = self.client.embed_batch(chunk).await?;
            for v in &mut vectors {
                l2_normalize(v);
            }
            out.append(&mut vectors);
        }
        Ok(out)
    }

    fn model_id(&self) -> &str {
        self.client.model()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic feature-hashing embedder: tokens hash into buckets, the
/// bucket counts are normalized. Crude semantically but stable, fast, and
/// honest about vector algebra, which is all the lower tiers need.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(8),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimension];
        for token in text.split_whitespace() {
            let token: String = token
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(|c| c.to_lowercase())
                .collect();
            if token.is_empty() {
                continue;
            }
            let h = fnv1a64(token.as_bytes());
            let bucket = (h % self.dimension as u64) as usize;
            // Sign split halves the collision bias.
            let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl TextEmbedder for HashEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn model_id(&self) -> &str {
        "feature-hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Scale to unit length. Zero vectors get a deterministic unit basis vector
/// instead, since downstream cosine math assumes unit norm everywhere.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    } else if let Some(first) = v.first_mut() {
        *first = 1.0;
    }
}

/// The text a vector addresses: translated title plus the head of the body.
pub fn embedding_input(title: &str, content: &str) -> String {
    let head: String = content.chars().take(CONTENT_PREFIX_CHARS).collect();
    format!("{}. {}", title.trim(), head.trim())
        .trim_matches(|c: char| c == '.' || c.is_whitespace())
        .to_string()
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf29ce484222325u64;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[tokio::test]
    async fn hash_embedder_produces_unit_vectors() {
        let embedder = HashEmbedder::new(384);
        let vectors = embedder
            .embed_batch(&["ceasefire talks in the region".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors[0].len(), 384);
        assert!((norm(&vectors[0]) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed_batch(&["same text".to_string()]).await.unwrap();
        let b = embedder.embed_batch(&["same text".to_string()]).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn similar_texts_score_higher_than_unrelated() {
        let embedder = HashEmbedder::new(384);
        let texts = vec![
            "the army moved toward the border town overnight".to_string(),
            "overnight the army moved toward the border town".to_string(),
            "quarterly earnings beat analyst expectations again".to_string(),
        ];
        let vs = embedder.embed_batch(&texts).await.unwrap();
        let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
        assert!(dot(&vs[0], &vs[1]) > dot(&vs[0], &vs[2]));
    }

    #[test]
    fn zero_vector_normalizes_to_basis() {
        let mut v = vec![0.0f32; 4];
        l2_normalize(&mut v);
        assert_eq!(v, vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn embedding_input_caps_content() {
        let input = embedding_input("Title", &"x".repeat(5000));
        assert!(input.chars().count() <= CONTENT_PREFIX_CHARS + 10);
        assert!(input.starts_with("Title"));
    }
}
