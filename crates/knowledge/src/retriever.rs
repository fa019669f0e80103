//! Retrieval with lexical re-ranking.
//!
//! The vector index over-fetches `fetch_k` neighbours; candidates are then
//! re-scored by a character similarity ratio between the query and each
//! chunk's text (optionally with a metadata excerpt), and the best `top_k`
//! are kept.
//! With the default weights the vector similarity does not influence the
//! final order.

use crate::embeddings::EmbeddingProvider;
use crate::types::{Chunk, RankedCandidate};
use crate::vector_index::VectorIndex;
use campus_core::config::RetrievalSettings;
use campus_core::AppResult;
use similar::TextDiff;

/// How lexical and vector scores combine into the final score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankWeights {
    pub lexical: f32,
    pub vector: f32,
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            lexical: 1.0,
            vector: 0.0,
        }
    }
}

/// Parameters for one retrieval.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    /// Neighbours fetched from the vector index
    pub fetch_k: usize,

    /// Candidates kept after re-ranking
    pub top_k: usize,

    /// Maximum characters of metadata appended to the chunk text for scoring
    pub metadata_excerpt: usize,

    pub weights: RerankWeights,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            fetch_k: 20,
            top_k: 4,
            metadata_excerpt: 300,
            weights: RerankWeights::default(),
        }
    }
}

impl RetrievalOptions {
    pub fn new(fetch_k: usize, top_k: usize) -> Self {
        Self {
            fetch_k,
            top_k,
            ..Default::default()
        }
    }

    pub fn with_weights(mut self, weights: RerankWeights) -> Self {
        self.weights = weights;
        self
    }
}

impl From<&RetrievalSettings> for RetrievalOptions {
    fn from(settings: &RetrievalSettings) -> Self {
        Self {
            fetch_k: settings.fetch_k,
            top_k: settings.top_k,
            metadata_excerpt: settings.metadata_excerpt,
            weights: RerankWeights {
                lexical: settings.lexical_weight,
                vector: settings.vector_weight,
            },
        }
    }
}

/// Embed the query, fetch neighbours and re-rank them.
pub async fn retrieve(
    query: &str,
    index: &dyn VectorIndex,
    embedder: &dyn EmbeddingProvider,
    options: &RetrievalOptions,
) -> AppResult<Vec<RankedCandidate>> {
    let embedding = embedder.embed(query).await?;
    let neighbours = index.query(&embedding, options.fetch_k.max(options.top_k)).await?;

    tracing::debug!("Vector index returned {} candidates", neighbours.len());

    Ok(rerank(query, neighbours, options))
}

/// Re-rank vector hits by lexical similarity to the query.
///
/// Sorting is stable, so equal scores keep their retrieval order.
pub fn rerank(
    query: &str,
    candidates: Vec<(Chunk, f32)>,
    options: &RetrievalOptions,
) -> Vec<RankedCandidate> {
    let query = query.to_lowercase();

    let mut ranked: Vec<RankedCandidate> = candidates
        .into_iter()
        .map(|(chunk, vector_score)| {
            let lexical = lexical_score(&query, &chunk, options.metadata_excerpt);
            RankedCandidate {
                score: options.weights.lexical * lexical + options.weights.vector * vector_score,
                vector_score,
                chunk,
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(options.top_k);
    ranked
}

/// Best ratio of the lowercased query against the chunk text alone and
/// against the text with its metadata excerpt.
///
/// Metadata can lift a candidate but never pushes an exact text match
/// below 1.0.
fn lexical_score(query: &str, chunk: &Chunk, excerpt_chars: usize) -> f32 {
    let text = chunk.text.to_lowercase();
    let bare = similarity_ratio(query, &text);

    match metadata_excerpt(chunk, excerpt_chars) {
        Some(excerpt) => {
            let with_metadata = format!("{}\n{}", text, excerpt.to_lowercase());
            bare.max(similarity_ratio(query, &with_metadata))
        }
        None => bare,
    }
}

/// Source, topic and category joined and cut to `excerpt_chars`.
fn metadata_excerpt(chunk: &Chunk, excerpt_chars: usize) -> Option<String> {
    let meta = &chunk.metadata;
    let excerpt: String = [meta.source.as_str(), meta.topic.as_str(), meta.category.as_str()]
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(excerpt_chars)
        .collect();

    (!excerpt.is_empty()).then_some(excerpt)
}

/// Character-level similarity: `2 * matches / (len(a) + len(b))`.
///
/// Two empty strings are identical (1.0).
pub fn similarity_ratio(a: &str, b: &str) -> f32 {
    TextDiff::from_chars(a, b).ratio()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkMetadata;

    fn chunk(text: &str, meta: ChunkMetadata) -> Chunk {
        Chunk {
            id: text.to_string(),
            document_index: 0,
            position: 0,
            text: text.to_string(),
            metadata: meta,
            start: 0,
            end: text.len(),
        }
    }

    #[test]
    fn test_similarity_ratio_known_values() {
        assert_eq!(similarity_ratio("", ""), 1.0);
        assert_eq!(similarity_ratio("abc", ""), 0.0);
        assert_eq!(similarity_ratio("abcd", "abcd"), 1.0);
        // "abcd" vs "bcde": one block "bcd" of 3 → 6 / 8
        assert!((similarity_ratio("abcd", "bcde") - 0.75).abs() < 1e-6);
        // blocks "a" and "c": 4 / 6
        assert!((similarity_ratio("abc", "axc") - 4.0 / 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_ratio_is_symmetric() {
        let a = "syarat pendaftaran";
        let b = "pendaftaran mahasiswa baru";
        assert!((similarity_ratio(a, b) - similarity_ratio(b, a)).abs() < 1e-6);
    }

    #[test]
    fn test_exact_match_ranks_first_with_ratio_one() {
        let query = "Apa saja syarat pendaftaran?";
        let candidates = vec![
            (chunk("Jadwal wisuda bulan Agustus.", ChunkMetadata::default()), 0.9),
            (chunk("Apa saja syarat pendaftaran?", ChunkMetadata::default()), 0.1),
            (chunk("Syarat beasiswa: IPK minimal 3.0.", ChunkMetadata::default()), 0.8),
        ];

        let ranked = rerank(query, candidates, &RetrievalOptions::default());

        assert_eq!(ranked[0].chunk.text, query);
        assert!((ranked[0].score - 1.0).abs() < 1e-6);
        assert!((ranked[0].vector_score - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_exact_match_ranks_first_with_metadata() {
        let meta = ChunkMetadata::new("knowledgebase", "Pendaftaran");
        let query = "biaya kuliah per semester";
        let candidates = vec![
            (chunk("Kalender akademik semester ganjil dimulai Agustus.", meta.clone()), 0.9),
            (chunk("Biaya kuliah per semester", meta.clone()), 0.2),
            (chunk("Informasi asrama mahasiswa baru.", meta), 0.5),
        ];

        let ranked = rerank(query, candidates, &RetrievalOptions::default());
        assert_eq!(ranked[0].chunk.text, "Biaya kuliah per semester");
    }

    #[test]
    fn test_output_never_exceeds_top_k() {
        let candidates: Vec<_> = (0..10)
            .map(|i| (chunk(&format!("dokumen {}", i), ChunkMetadata::default()), 0.5))
            .collect();

        let options = RetrievalOptions::new(10, 3);
        assert_eq!(rerank("dokumen", candidates.clone(), &options).len(), 3);

        let options = RetrievalOptions::new(10, 50);
        assert_eq!(rerank("dokumen", candidates, &options).len(), 10);
    }

    #[test]
    fn test_ties_keep_retrieval_order() {
        let candidates = vec![
            (chunk("xyz", ChunkMetadata::default()), 0.3),
            (chunk("zyx", ChunkMetadata::default()), 0.9),
        ];

        // Neither shares anything with the query, so both score 0
        let ranked = rerank("abc", candidates, &RetrievalOptions::default());
        assert_eq!(ranked[0].chunk.text, "xyz");
        assert_eq!(ranked[1].chunk.text, "zyx");
    }

    #[test]
    fn test_vector_weight_can_change_order() {
        let candidates = vec![
            (chunk("abc", ChunkMetadata::default()), 0.0),
            (chunk("xyz", ChunkMetadata::default()), 1.0),
        ];

        let options = RetrievalOptions::default().with_weights(RerankWeights {
            lexical: 0.1,
            vector: 1.0,
        });
        let ranked = rerank("abc", candidates, &options);
        assert_eq!(ranked[0].chunk.text, "xyz");
    }

    #[test]
    fn test_exact_text_beats_short_metadata_partial_match() {
        let query = "biaya kuliah program sarjana";
        let long_source = ChunkMetadata::new(
            "pages/unpad.ac.id/akademik/program-sarjana/biaya-pendidikan/index.html",
            "Biaya Pendidikan Program Sarjana Reguler dan Internasional",
        );
        let short_source = ChunkMetadata::new("knowledgebase", "UKT");
        let candidates = vec![
            (chunk("Biaya kuliah", short_source), 0.9),
            (chunk("Biaya kuliah program sarjana", long_source), 0.4),
        ];

        let ranked = rerank(query, candidates, &RetrievalOptions::default());

        assert_eq!(ranked[0].chunk.text, "Biaya kuliah program sarjana");
        assert!((ranked[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_metadata_can_lift_a_candidate() {
        let with_topic = ChunkMetadata::new("knowledgebase", "Beasiswa");
        let candidates = vec![
            (chunk("Informasi umum.", ChunkMetadata::default()), 0.5),
            (chunk("Informasi umum.", with_topic), 0.5),
        ];

        let ranked = rerank("beasiswa", candidates, &RetrievalOptions::default());
        assert_eq!(ranked[0].chunk.metadata.topic, "Beasiswa");
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn test_metadata_excerpt_is_bounded() {
        let meta = ChunkMetadata::new("s".repeat(500), "topic");
        let excerpt = metadata_excerpt(&chunk("isi", meta), 300).unwrap();
        assert_eq!(excerpt.chars().count(), 300);
        assert!(metadata_excerpt(&chunk("isi", ChunkMetadata::default()), 300).is_none());
    }
}
