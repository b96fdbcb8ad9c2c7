//! Core data models used throughout askdoc.
//!
//! These types represent the documents, chunks, and conversation turns that
//! flow through the ingestion and question-answering pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One page of ingestion input, carrying the structural marker (page number)
/// used to populate chunk provenance.
#[derive(Debug, Clone)]
pub struct PageInput {
    pub page: u32,
    pub text: String,
}

/// Best-effort provenance for a chunk: the page it came from and the nearest
/// preceding section header, if either could be determined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRef {
    pub page: Option<u32>,
    pub section: Option<String>,
}

impl SourceRef {
    pub fn is_empty(&self) -> bool {
        self.page.is_none() && self.section.is_none()
    }
}

/// A contiguous slice of document text, the unit of retrieval.
///
/// `start..end` is the byte span of the chunk's *fresh* content within the
/// document's normalized text; `overlap` is the number of leading bytes of
/// `text` carried over from the previous chunk. Concatenating
/// `text[overlap..]` across all chunks reconstructs the document text exactly.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub chunk_index: usize,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub overlap: usize,
    pub source_ref: SourceRef,
    /// Embedding vector; `None` until the chunk has been embedded.
    pub vector: Option<Vec<f32>>,
    /// True when the vector came from the zero-vector fallback rather than
    /// the remote provider.
    pub degraded_embedding: bool,
}

impl Chunk {
    /// The chunk's content without the overlap prefix.
    pub fn fresh_text(&self) -> &str {
        &self.text[self.overlap..]
    }
}

/// One ingested document, immutable after ingestion completes.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub raw_text: String,
    pub chunks: Vec<Chunk>,
    pub page_count: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// How a turn's answer was grounded in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroundingMode {
    /// Chunks retrieved by vector similarity.
    Vector,
    /// Chunks retrieved by keyword overlap (embeddings unavailable or empty).
    Lexical,
    /// No grounding context could be found at all.
    None,
}

/// One question/answer exchange against a document.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
    /// Provenance of the chunks that grounded the answer, deduplicated in
    /// prompt order. Always derived from retrieval metadata, never from the
    /// model's own text.
    pub sources: Vec<SourceRef>,
    pub grounding: GroundingMode,
    /// True when the generation provider was unavailable and the answer is
    /// the deterministic extractive fallback.
    pub used_fallback: bool,
    pub answered_at: DateTime<Utc>,
}

/// A scored retrieval hit. Ephemeral — never stored.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalResult {
    pub chunk_index: usize,
    pub score: f32,
}
