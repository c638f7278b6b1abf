//! Data types that flow through ingestion and retrieval.

use serde::Serialize;

/// Raw text of one loadable unit (a file, or one page of a PDF).
///
/// `source` is the stable identifier of the originating file, usually its
/// path. Documents are never mutated; re-ingestion produces new ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source: String,
    pub text: String,
    /// Zero-based page number, when the loader splits the file into pages.
    pub page: Option<u32>,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
            page: None,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }
}

/// Origin metadata attached to every chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkMetadata {
    /// Source identifier of the parent document. `None` only for chunks
    /// read back from an index that lacks the field.
    pub source: Option<String>,
    pub page: Option<u32>,
    /// Position of the chunk within its parent document.
    pub chunk_index: usize,
    /// Character offset of the chunk's first character in the parent text.
    pub start_offset: usize,
}

/// A contiguous slice of one document's text, the unit that gets embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Length in characters (not bytes).
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A chunk paired with its embedding, as persisted in the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// A retrieved chunk and its similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Ordered top-k hits for one query, most similar first.
///
/// Empty when the index holds no entries; callers treat that as
/// "no context found", not as a failure.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn new(hits: Vec<ScoredChunk>) -> Self {
        Self { hits }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Retrieved chunks in rank order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.hits.iter().map(|h| &h.chunk)
    }
}
