//! Question-time retrieval: vector search plus the lexical fallback.
//!
//! Two independent retrieval channels feed the answer composer, arbitrated
//! by [`resolve_grounding`]:
//!
//! - **Vector** — the pre-embedded question is ranked against the document's
//!   [`VectorIndex`]. A degraded (zero-vector) query embedding is useless
//!   for ranking, so the engine passes `None` on provider failure and the
//!   channel yields nothing rather than meaningless scores.
//! - **Lexical** ([`lexical_candidates`]) — raw chunk text scored by keyword
//!   overlap with the question. Needs no network and no embeddings, which
//!   makes it the floor of the degradation ladder: a session with no API
//!   keys at all still retrieves something when the words match.
//!
//! Both return results in descending score order with deterministic
//! tie-breaking. An empty result is a valid state, not an error — the
//! composer decides what it means.

use crate::index::VectorIndex;
use crate::models::{Chunk, GroundingMode, RetrievalResult};

/// Common English words carrying no retrieval signal.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "shall",
    "can", "need", "this", "that", "these", "those", "what", "which", "who", "whom", "where",
    "when", "why", "how", "in", "on", "at", "to", "for", "of", "with", "by", "from", "as",
    "about", "into", "through", "during", "before", "after", "above", "below", "between", "and",
    "or", "not", "it", "its", "i", "me", "my", "you", "your", "he", "she", "we", "they",
];

/// Score chunks by keyword overlap with the question.
///
/// The score for a chunk is `|question terms ∩ chunk words| / |question
/// terms|`, where question terms are lowercased, longer than two chars, and
/// not stopwords. Chunks below `min_score` are dropped; ties break on raw
/// overlap count, then chunk order. Fully deterministic.
pub fn lexical_candidates(
    chunks: &[Chunk],
    question: &str,
    k: usize,
    min_score: f32,
) -> Vec<RetrievalResult> {
    let terms = significant_terms(question);
    if terms.is_empty() || chunks.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(RetrievalResult, usize)> = chunks
        .iter()
        .filter_map(|chunk| {
            let words = words_of(&chunk.text);
            let overlap = terms.iter().filter(|t| words.contains(t.as_str())).count();
            if overlap == 0 {
                return None;
            }
            let score = overlap as f32 / terms.len() as f32;
            if score < min_score {
                return None;
            }
            Some((
                RetrievalResult {
                    chunk_index: chunk.chunk_index,
                    score,
                },
                overlap,
            ))
        })
        .collect();

    scored.sort_by(|(a, ao), (b, bo)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(bo.cmp(ao))
            .then(a.chunk_index.cmp(&b.chunk_index))
    });
    scored.truncate(k);
    scored.into_iter().map(|(r, _)| r).collect()
}

/// Decide how a question is grounded, given an optional pre-embedded query.
///
/// This is the retrieval half of the answer state machine, kept synchronous
/// and pure so the engine can run it on the blocking pool: vector hits win
/// when present; otherwise lexical candidates; otherwise
/// [`GroundingMode::None`]. `query` is `None` when the embedding provider
/// was unavailable for the question.
pub fn resolve_grounding(
    chunks: &[Chunk],
    index: &VectorIndex,
    query: Option<&[f32]>,
    question: &str,
    k: usize,
    min_lexical_score: f32,
) -> (Vec<RetrievalResult>, GroundingMode) {
    if let Some(query) = query {
        let hits: Vec<RetrievalResult> = index
            .search(query, k)
            .into_iter()
            .filter(|r| r.score > 0.0)
            .collect();
        if !hits.is_empty() {
            return (hits, GroundingMode::Vector);
        }
    }

    let lexical = lexical_candidates(chunks, question, k, min_lexical_score);
    if lexical.is_empty() {
        (Vec::new(), GroundingMode::None)
    } else {
        (lexical, GroundingMode::Lexical)
    }
}

/// Question words worth matching on: lowercased, length > 2, not stopwords.
fn significant_terms(question: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in words_iter(question) {
        if word.len() > 2 && !STOPWORDS.contains(&word.as_str()) && !terms.contains(&word) {
            terms.push(word);
        }
    }
    terms
}

/// All lowercased words in a text, as a set for overlap checks.
fn words_of(text: &str) -> std::collections::HashSet<String> {
    words_iter(text).collect()
}

fn words_iter(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}
