//! Separator-aware text chunker with fixed overlap.
//!
//! Splits document text into [`Chunk`]s of at most `chunk_size` characters,
//! where each chunk repeats the last `chunk_overlap` characters of its
//! predecessor.
//!
//! # Algorithm
//!
//! 1. Open a window of `chunk_size` characters at the current start.
//! 2. If the window reaches the end of the text, emit it as the final chunk.
//! 3. Otherwise look for the last paragraph break (`\n\n`) inside the window,
//!    then the last line break, then the last space, and end the chunk just
//!    after the first separator found. A separator only qualifies if the
//!    chunk would stay longer than `chunk_overlap`, so the window always
//!    moves forward.
//! 4. With no qualifying separator, cut at exactly `chunk_size` characters.
//! 5. Start the next window `chunk_overlap` characters before the cut.
//!
//! Without any separators this degenerates to a plain sliding window that
//! advances by `chunk_size - chunk_overlap`.
//!
//! Lengths and offsets are counted in `char`s, never bytes, so multi-byte
//! text is never split inside a code point.
//!
//! # Example
//!
//! ```rust
//! use rag_consultant_core::chunk::split_documents;
//! use rag_consultant_core::models::Document;
//!
//! let doc = Document::new("guides/bovine.pdf", "x".repeat(2400));
//! let chunks = split_documents(&[doc], 1000, 200).unwrap();
//! let lens: Vec<usize> = chunks.iter().map(|c| c.char_len()).collect();
//! assert_eq!(lens, vec![1000, 1000, 800]);
//! ```

use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};
use crate::models::{Chunk, ChunkMetadata, Document};

/// Boundary separators in priority order. The implicit last resort is a
/// character-level cut.
pub const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Validated chunk sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ChunkParams {
    /// Validate sizing. `chunk_overlap >= chunk_size` would stop the window
    /// from advancing, so it is rejected up front.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::Configuration(
                "chunk_size must be > 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

/// A slice of the input text with its character range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    /// Character offset of the first character.
    pub start: usize,
    /// Character offset one past the last character.
    pub end: usize,
    pub text: &'a str,
}

/// Split every document and concatenate the chunks in document order.
///
/// # Errors
///
/// Returns [`RagError::Configuration`] for invalid sizing, before any
/// document is touched.
pub fn split_documents(
    documents: &[Document],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>> {
    let params = ChunkParams::new(chunk_size, chunk_overlap)?;
    Ok(documents
        .iter()
        .flat_map(|doc| split_document(doc, params))
        .collect())
}

/// Split one document. Blank documents yield no chunks.
pub fn split_document(document: &Document, params: ChunkParams) -> Vec<Chunk> {
    split_text(&document.text, params)
        .into_iter()
        .enumerate()
        .map(|(index, seg)| make_chunk(document, index, seg))
        .collect()
}

/// Compute the overlapping segments of `text`.
pub fn split_text(text: &str, params: ChunkParams) -> Vec<Segment<'_>> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    // offsets[i] is the byte position of char i; the extra entry marks the end.
    let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    offsets.push(text.len());
    let total = offsets.len() - 1;

    let size = params.chunk_size;
    let overlap = params.chunk_overlap;

    let mut segments = Vec::new();
    let mut start = 0usize;

    loop {
        let limit = (start + size).min(total);
        if limit == total {
            segments.push(segment(text, &offsets, start, total));
            break;
        }

        let floor = start + overlap + 1;
        let end = find_boundary(text, &offsets, start, floor, limit).unwrap_or(limit);
        segments.push(segment(text, &offsets, start, end));
        start = end - overlap;
    }

    segments
}

/// Find the end position (in chars) of the best separator-aligned cut in
/// `[start, limit]` that is not before `floor`.
fn find_boundary(
    text: &str,
    offsets: &[usize],
    start: usize,
    floor: usize,
    limit: usize,
) -> Option<usize> {
    let base = offsets[start];
    let window = &text[base..offsets[limit]];

    for sep in SEPARATORS {
        // rfind gives the latest occurrence; if that one is below the floor,
        // every earlier one is too.
        let Some(pos) = window.rfind(sep) else {
            continue;
        };
        let end_byte = base + pos + sep.len();
        if let Ok(end) = offsets.binary_search(&end_byte) {
            if end >= floor {
                return Some(end);
            }
        }
    }
    None
}

fn segment<'a>(text: &'a str, offsets: &[usize], start: usize, end: usize) -> Segment<'a> {
    Segment {
        start,
        end,
        text: &text[offsets[start]..offsets[end]],
    }
}

fn make_chunk(document: &Document, index: usize, seg: Segment<'_>) -> Chunk {
    let mut id_hasher = Sha256::new();
    id_hasher.update(document.source.as_bytes());
    id_hasher.update([0u8]);
    id_hasher.update(document.page.map(i64::from).unwrap_or(-1).to_le_bytes());
    id_hasher.update((index as u64).to_le_bytes());
    let id = format!("{:x}", id_hasher.finalize());

    Chunk {
        id,
        text: seg.text.to_string(),
        hash: hash_text(seg.text),
        metadata: ChunkMetadata {
            source: Some(document.source.clone()),
            page: document.page,
            chunk_index: index,
            start_offset: seg.start,
        },
    }
}

/// SHA-256 of a chunk text, hex encoded.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
