//! Feature-hashing embedding provider for offline operation.

use crate::embeddings::provider::EmbeddingProvider;
use campus_core::AppResult;
use std::collections::{HashMap, HashSet};

/// Bilingual stop words dropped before hashing.
const STOP_WORDS: [&str; 34] = [
    "the", "which", "are", "was", "were", "for", "and", "but", "with", "from", "this", "that",
    "have", "has", "had", "its", "their", "they", "them", "yang", "dan", "di", "ke", "dari",
    "untuk", "dengan", "ini", "itu", "atau", "pada", "adalah", "juga", "akan", "dalam",
];

/// Deterministic embeddings from hashed words and character trigrams.
///
/// Not semantically accurate like a neural model, but content-dependent and
/// stable across runs, which makes it usable without a model server.
#[derive(Debug)]
pub struct HashingProvider {
    dimensions: usize,
}

impl HashingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn hash(bytes: &[u8], multiplier: u64) -> u64 {
        bytes
            .iter()
            .fold(0u64, |acc, b| acc.wrapping_mul(multiplier).wrapping_add(*b as u64))
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0; self.dimensions];

        let stop_words: HashSet<&str> = STOP_WORDS.iter().copied().collect();
        let lower = text.to_lowercase();

        let mut word_freq: HashMap<&str, usize> = HashMap::new();
        for word in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 2 && !stop_words.contains(w))
        {
            *word_freq.entry(word).or_insert(0) += 1;
        }

        for (word, freq) in &word_freq {
            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                let idx = (Self::hash(trigram.as_bytes(), 37) as usize) % self.dimensions;
                embedding[idx] += (*freq as f32).sqrt();
            }

            let idx = (Self::hash(word.as_bytes(), 31) as usize) % self.dimensions;
            embedding[idx] += *freq as f32;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }

        embedding
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for HashingProvider {
    fn provider_name(&self) -> &str {
        "hashing"
    }

    fn model_name(&self) -> &str {
        "hashing-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[tokio::test]
    async fn test_embedding_is_unit_length() {
        let provider = HashingProvider::new(256);
        let embedding = provider.embed("Syarat pendaftaran mahasiswa baru").await.unwrap();

        assert_eq!(embedding.len(), 256);
        assert!((norm(&embedding) - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_deterministic() {
        let provider = HashingProvider::new(256);
        let a = provider.embed("jadwal wisuda").await.unwrap();
        let b = provider.embed("jadwal wisuda").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_different_texts_differ() {
        let provider = HashingProvider::new(256);
        let a = provider.embed("biaya kuliah").await.unwrap();
        let b = provider.embed("jadwal wisuda").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_stop_words_only_gives_zero_vector() {
        let provider = HashingProvider::new(64);
        let embedding = provider.embed("yang dan the").await.unwrap();
        assert!(embedding.iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_punctuation_does_not_change_words() {
        let provider = HashingProvider::new(128);
        let a = provider.embed("pendaftaran?").await.unwrap();
        let b = provider.embed("pendaftaran").await.unwrap();
        assert_eq!(a, b);
    }
}
