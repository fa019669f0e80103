//! Document chunking.
//!
//! Splits documents into overlapping chunks of at most `chunk_size`
//! characters. Every chunk is an exact byte range of its document, so the
//! document can be rebuilt from its chunks by dropping each chunk's overlap
//! with its predecessor.
//!
//! Two strategies are available:
//! - [`RecursiveSplitter`] tries paragraph, line, sentence and word
//!   separators in turn, falling back to grapheme clusters.
//! - [`SemanticSplitter`] delegates to the `text-splitter` crate.

use crate::types::{Chunk, Document};
use campus_core::config::ChunkingSettings;
use campus_core::{AppError, AppResult};
use std::ops::Range;
use unicode_segmentation::UnicodeSegmentation;

/// Separators in priority order. Each stays attached to the text before it.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Validated chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSettings {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkSettings {
    /// Create settings, rejecting a zero size or an overlap that is not
    /// strictly smaller than the size.
    pub fn new(chunk_size: usize, overlap: usize) -> AppResult<Self> {
        if chunk_size == 0 {
            return Err(AppError::Config("chunk size must be positive".to_string()));
        }
        if overlap >= chunk_size {
            return Err(AppError::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

impl TryFrom<&ChunkingSettings> for ChunkSettings {
    type Error = AppError;

    fn try_from(settings: &ChunkingSettings) -> AppResult<Self> {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }
}

/// A strategy that maps a text to the byte ranges of its chunks.
pub trait Splitter: Send + Sync {
    fn name(&self) -> &str;

    /// Byte ranges of the chunks of `text`, in order.
    fn split_ranges(&self, text: &str, settings: &ChunkSettings) -> Vec<Range<usize>>;
}

/// Separator-driven splitter with greedy merging and piece-aligned overlap.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecursiveSplitter;

impl RecursiveSplitter {
    /// Break `range` into pieces of at most `limit` characters.
    fn atomize(text: &str, range: Range<usize>, level: usize, limit: usize, out: &mut Vec<Range<usize>>) {
        let slice = &text[range.clone()];
        if slice.chars().count() <= limit {
            out.push(range);
            return;
        }

        let Some(separator) = SEPARATORS.get(level) else {
            Self::atomize_graphemes(slice, range.start, limit, out);
            return;
        };

        let mut pieces = Vec::new();
        let mut piece_start = 0;
        for (idx, _) in slice.match_indices(separator) {
            let piece_end = idx + separator.len();
            if piece_end > piece_start {
                pieces.push(piece_start..piece_end);
                piece_start = piece_end;
            }
        }
        if piece_start < slice.len() {
            pieces.push(piece_start..slice.len());
        }

        for piece in pieces {
            let absolute = range.start + piece.start..range.start + piece.end;
            Self::atomize(text, absolute, level + 1, limit, out);
        }
    }

    fn atomize_graphemes(slice: &str, offset: usize, limit: usize, out: &mut Vec<Range<usize>>) {
        for (idx, grapheme) in slice.grapheme_indices(true) {
            if grapheme.chars().count() <= limit {
                out.push(offset + idx..offset + idx + grapheme.len());
                continue;
            }
            // A single cluster longer than the limit is cut per character
            for (cidx, ch) in grapheme.char_indices() {
                let start = offset + idx + cidx;
                out.push(start..start + ch.len_utf8());
            }
        }
    }

    /// Greedily merge pieces into chunks, starting each next chunk on the
    /// trailing pieces of the previous one that fit within the overlap.
    fn merge(pieces: &[Range<usize>], lengths: &[usize], settings: &ChunkSettings) -> Vec<Range<usize>> {
        let mut chunks = Vec::new();
        let mut i = 0;

        while i < pieces.len() {
            let mut len = 0;
            let mut j = i;
            while j < pieces.len() && len + lengths[j] <= settings.chunk_size {
                len += lengths[j];
                j += 1;
            }

            chunks.push(pieces[i].start..pieces[j - 1].end);
            if j == pieces.len() {
                break;
            }

            let mut k = j;
            let mut carried = 0;
            while k - 1 > i && carried + lengths[k - 1] <= settings.overlap {
                carried += lengths[k - 1];
                k -= 1;
            }
            // The next chunk must still have room for the piece that ended this one
            while carried + lengths[j] > settings.chunk_size {
                carried -= lengths[k];
                k += 1;
            }

            i = k;
        }

        chunks
    }
}

impl Splitter for RecursiveSplitter {
    fn name(&self) -> &str {
        "recursive"
    }

    fn split_ranges(&self, text: &str, settings: &ChunkSettings) -> Vec<Range<usize>> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut pieces = Vec::new();
        Self::atomize(text, 0..text.len(), 0, settings.chunk_size, &mut pieces);

        let lengths: Vec<usize> = pieces
            .iter()
            .map(|r| text[r.clone()].chars().count())
            .collect();

        Self::merge(&pieces, &lengths, settings)
    }
}

/// Splitter backed by the `text-splitter` crate's semantic levels.
#[derive(Debug, Default, Clone, Copy)]
pub struct SemanticSplitter;

impl Splitter for SemanticSplitter {
    fn name(&self) -> &str {
        "semantic"
    }

    fn split_ranges(&self, text: &str, settings: &ChunkSettings) -> Vec<Range<usize>> {
        if text.is_empty() {
            return Vec::new();
        }

        let config = match text_splitter::ChunkConfig::new(settings.chunk_size)
            .with_overlap(settings.overlap)
        {
            Ok(config) => config.with_trim(false),
            Err(e) => {
                // ChunkSettings already guarantees overlap < size
                tracing::warn!("Rejected overlap {}: {}", settings.overlap, e);
                text_splitter::ChunkConfig::new(settings.chunk_size).with_trim(false)
            }
        };

        text_splitter::TextSplitter::new(config)
            .chunk_indices(text)
            .map(|(offset, chunk)| offset..offset + chunk.len())
            .collect()
    }
}

/// Look up a splitter by its configured name.
pub fn splitter_for(name: &str) -> AppResult<Box<dyn Splitter>> {
    match name {
        "recursive" => Ok(Box::new(RecursiveSplitter)),
        "semantic" => Ok(Box::new(SemanticSplitter)),
        other => Err(AppError::Config(format!(
            "Unknown splitter: {}. Supported: recursive, semantic",
            other
        ))),
    }
}

/// Split documents with an explicit strategy.
pub fn split_with(splitter: &dyn Splitter, documents: &[Document], settings: &ChunkSettings) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for (doc_idx, document) in documents.iter().enumerate() {
        let ranges = splitter.split_ranges(&document.content, settings);

        for (position, range) in ranges.into_iter().enumerate() {
            chunks.push(Chunk {
                id: uuid::Uuid::new_v4().to_string(),
                document_index: doc_idx as u32,
                position: position as u32,
                text: document.content[range.clone()].to_string(),
                metadata: document.metadata.clone(),
                start: range.start,
                end: range.end,
            });
        }
    }

    tracing::debug!(
        "{} splitter produced {} chunks from {} documents",
        splitter.name(),
        chunks.len(),
        documents.len()
    );

    chunks
}

/// Split documents with the recursive splitter.
///
/// Empty input and empty documents produce no chunks.
pub fn split(documents: &[Document], chunk_size: usize, overlap: usize) -> AppResult<Vec<Chunk>> {
    let settings = ChunkSettings::new(chunk_size, overlap)?;
    Ok(split_with(&RecursiveSplitter, documents, &settings))
}

/// Rebuild a document's text from its chunks, dropping overlaps.
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    let mut covered: usize = 0;

    for chunk in chunks {
        let skip = covered.saturating_sub(chunk.start).min(chunk.text.len());
        text.push_str(&chunk.text[skip..]);
        covered = covered.max(chunk.end);
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkMetadata;

    fn doc(content: &str) -> Document {
        Document::new(content, ChunkMetadata::new("test", "Topic"))
    }

    fn sample_text() -> String {
        let paragraph = "Universitas Padjadjaran membuka pendaftaran mahasiswa baru. \
            Calon mahasiswa wajib mengisi formulir daring dan mengunggah berkas. \
            Informasi lengkap tersedia di laman resmi.";
        format!("{}\n\n{}\nBaris kedua.\n\n{}", paragraph, paragraph, paragraph.repeat(3))
    }

    #[test]
    fn test_settings_validation() {
        assert!(ChunkSettings::new(0, 0).is_err());
        assert!(ChunkSettings::new(100, 100).is_err());
        assert!(ChunkSettings::new(100, 150).is_err());
        assert!(ChunkSettings::new(100, 99).is_ok());
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(split(&[], 100, 10).unwrap().is_empty());
        assert!(split(&[doc("")], 100, 10).unwrap().is_empty());
    }

    #[test]
    fn test_short_document_is_single_chunk() {
        let chunks = split(&[doc("Pendek saja.")], 100, 10).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Pendek saja.");
        assert_eq!(chunks[0].metadata.topic, "Topic");
    }

    #[test]
    fn test_chunks_respect_size_limit() {
        let text = sample_text();
        for (size, overlap) in [(1000, 150), (120, 30), (40, 10), (7, 3)] {
            let chunks = split(&[doc(&text)], size, overlap).unwrap();
            assert!(chunks.len() > 1 || text.chars().count() <= size);
            for chunk in &chunks {
                assert!(
                    chunk.text.chars().count() <= size,
                    "chunk of {} chars exceeds {}",
                    chunk.text.chars().count(),
                    size
                );
            }
        }
    }

    #[test]
    fn test_reassembly_is_exact() {
        let texts = [
            sample_text(),
            "tanpaspasisamasekali".repeat(20),
            "Émoji 🎓 dan aksen: café, naïve.\n\n".repeat(15),
            "a  b   c    d\n\n\n\ne".repeat(10),
        ];

        for text in &texts {
            for (size, overlap) in [(100, 20), (33, 10), (5, 2)] {
                let chunks = split(&[doc(text)], size, overlap).unwrap();
                assert_eq!(&reassemble(&chunks), text, "size={} overlap={}", size, overlap);
            }
        }
    }

    #[test]
    fn test_reassembly_across_sizes_and_overlaps() {
        let text = "Syarat: ijazah SMA\r\nrapor 🎓 dan pas foto.\r\n\r\nBiaya kuliah (UKT) per semester. ".repeat(4);

        for size in [1, 2, 3, 7, 16, 33, 64, 99] {
            for overlap in [0, size / 2, size - 1] {
                let chunks = split(&[doc(&text)], size, overlap).unwrap();
                assert_eq!(reassemble(&chunks), text, "size={} overlap={}", size, overlap);
                assert!(chunks.iter().all(|c| c.text.chars().count() <= size));
            }
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text = "kata ".repeat(100);
        let chunks = split(&[doc(&text)], 50, 15).unwrap();

        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let overlap = pair[0].end.saturating_sub(pair[1].start);
            assert!(overlap > 0, "chunks {:?} and {:?} do not overlap", pair[0].start..pair[0].end, pair[1].start..pair[1].end);
            assert!(overlap <= 15);
        }
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let first = "a".repeat(40);
        let second = "b".repeat(40);
        let text = format!("{}\n\n{}", first, second);

        let chunks = split(&[doc(&text)], 50, 0).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, format!("{}\n\n", first));
        assert_eq!(chunks[1].text, second);
    }

    #[test]
    fn test_positions_and_document_index() {
        let text = "kalimat panjang ".repeat(20);
        let chunks = split(&[doc("satu"), doc(&text)], 40, 5).unwrap();

        assert_eq!(chunks[0].document_index, 0);
        let second: Vec<_> = chunks.iter().filter(|c| c.document_index == 1).collect();
        for (i, chunk) in second.iter().enumerate() {
            assert_eq!(chunk.position as usize, i);
        }
    }

    #[test]
    fn test_semantic_splitter_respects_size_limit() {
        let settings = ChunkSettings::new(80, 20).unwrap();
        let text = sample_text();
        let chunks = split_with(&SemanticSplitter, &[doc(&text)], &settings);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 80);
            assert_eq!(&text[chunk.start..chunk.end], chunk.text);
        }
    }

    #[test]
    fn test_splitter_for_unknown_name() {
        assert!(splitter_for("recursive").is_ok());
        assert!(splitter_for("tree-sitter").is_err());
    }
}
