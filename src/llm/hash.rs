//! Deterministic token-hash embeddings.
//!
//! Each lowercase alphanumeric token is hashed (FNV-1a) into one of `dim`
//! buckets with a hash-derived sign; the vector is then L2-normalised. Texts
//! sharing tokens land close together. Useful offline and in tests.

use async_trait::async_trait;

use crate::errors::GenerationError;

use super::Embedder;

pub const DEFAULT_DIM: usize = 256;

#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dim: DEFAULT_DIM }
    }
}

impl HashEmbedder {
    pub fn with_dim(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        for token in tokenize(text) {
            let h = fnv1a64(&token);
            let idx = (h % self.dim as u64) as usize;
            let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }
        let norm2: f32 = v.iter().map(|x| x * x).sum();
        if norm2 > 0.0 {
            let inv = 1.0 / norm2.sqrt();
            v.iter_mut().for_each(|x| *x *= inv);
        }
        v
    }
}

fn fnv1a64(s: &str) -> u64 {
    let mut h: u64 = 14695981039346656037;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(1099511628211);
    }
    h
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GenerationError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn model_name(&self) -> String {
        format!("token-hash/{}", self.dim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_deterministic_and_normalised() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed_text("customer_order table");
        let b = embedder.embed_text("customer_order table");
        assert_eq!(a, b);
        assert!((dot(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_tokens_are_closer() {
        let embedder = HashEmbedder::default();
        let query = embedder.embed_text("Find tables related to customer");
        let customer = embedder.embed_text("customer name email customer id");
        let product = embedder.embed_text("product sku price stock");
        assert!(dot(&query, &customer) > dot(&query, &product));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::with_dim(8);
        assert_eq!(embedder.embed_text("  --  "), vec![0.0; 8]);
    }
}
