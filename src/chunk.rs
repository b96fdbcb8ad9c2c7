//! Sentence-boundary text chunker with overlap.
//!
//! Splits normalized document text into [`Chunk`]s sized for embedding and
//! retrieval. Sizes are measured in **bytes of normalized text** (the input
//! is ASCII-dominant after [`crate::text::normalize`]; multi-byte boundaries
//! are always snapped, never split).
//!
//! # Algorithm
//!
//! 1. Compute sentence break offsets ([`crate::text::sentence_breaks`]) and
//!    section marks ([`crate::text::detect_sections`]).
//! 2. Walk the text, closing each chunk at the latest sentence break within
//!    `target_chars` of the chunk's fresh start.
//! 3. If no break lands inside the target window, accept the next break up
//!    to `2 × target_chars` away (oversized but sentence-respecting).
//! 4. Beyond that the sentence is hard-split at a word boundary near the
//!    target limit — an accepted lossy edge case for pathological input.
//! 5. Each chunk after the first carries up to `overlap_chars` of the
//!    previous chunk's tail as a prefix, started on a word boundary.
//! 6. An undersized tail chunk is merged into its predecessor.
//!
//! # Guarantees
//!
//! - Chunk indices are contiguous: `0, 1, 2, …, N-1`.
//! - Fresh spans tile the input exactly: concatenating
//!   `chunk.fresh_text()` over all chunks reconstructs the text byte for
//!   byte.
//! - No chunk boundary (fresh or overlap) lands mid-word or mid-char.
//! - Empty or whitespace-only input yields an empty Vec, not an error.

use crate::config::ChunkingConfig;
use crate::models::{Chunk, PageInput, SourceRef};
use crate::text;

/// Byte offset at which a page begins in the concatenated document text.
#[derive(Debug, Clone, Copy)]
pub struct PageSpan {
    pub page: u32,
    pub start: usize,
}

/// Normalize page inputs into one document text plus page-boundary markers.
///
/// Pages that are empty after normalization contribute no text and no span
/// but still count toward the page total. Non-empty pages are joined with a
/// blank line, which the chunker treats as a sentence boundary.
pub fn assemble_pages(pages: &[PageInput]) -> (String, Vec<PageSpan>, u32) {
    let page_count = pages.len() as u32;
    let mut text = String::new();
    let mut spans = Vec::new();
    for page in pages {
        let normalized = text::normalize(&page.text);
        if normalized.is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        spans.push(PageSpan {
            page: page.page,
            start: text.len(),
        });
        text.push_str(&normalized);
    }
    (text, spans, page_count)
}

/// Split `text` into overlapping chunks, attaching page/section provenance.
///
/// `pages` must be sorted by `start`; an empty slice leaves every chunk's
/// page unset.
pub fn chunk_document(text: &str, cfg: &ChunkingConfig, pages: &[PageSpan]) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let target = cfg.target_chars.max(1);
    let breaks = text::sentence_breaks(text);
    let sections = text::detect_sections(text);

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut cur = 0usize;

    while cur < text.len() {
        let end = chunk_end(text, &breaks, cur, target);
        let overlap_start = if chunks.is_empty() || cfg.overlap_chars == 0 {
            cur
        } else {
            overlap_start(text, cur, cfg.overlap_chars, chunks.last().map(|c| c.start))
        };

        chunks.push(Chunk {
            chunk_index: chunks.len(),
            text: text[overlap_start..end].to_string(),
            start: cur,
            end,
            overlap: cur - overlap_start,
            source_ref: source_ref_at(cur, pages, &sections),
            vector: None,
            degraded_embedding: false,
        });
        cur = end;
    }

    merge_small_tail(text, &mut chunks, cfg.min_chunk_chars);
    chunks
}

/// Pick the end offset for a chunk whose fresh content starts at `cur`.
fn chunk_end(text: &str, breaks: &[usize], cur: usize, target: usize) -> usize {
    let remaining = text.len() - cur;
    if remaining <= target {
        return text.len();
    }

    let limit = cur + target;
    // Latest sentence break inside the target window.
    let in_window = breaks
        .iter()
        .copied()
        .filter(|&b| b > cur && b <= limit)
        .max();
    if let Some(b) = in_window {
        return b;
    }

    // No break within target: accept the next break up to 2× away.
    if let Some(&b) = breaks.iter().find(|&&b| b > cur) {
        if b <= cur + 2 * target {
            return b;
        }
    }

    // Pathological sentence: hard split at a word boundary near the limit,
    // falling back to a raw char-boundary cut.
    match text::word_boundary_before(text, cur, limit) {
        Some(b) if b > cur => b,
        _ => {
            let b = text::snap_to_char_boundary(text, limit);
            if b > cur {
                b
            } else {
                // Single char wider than the window; advance one char.
                text[cur..]
                    .char_indices()
                    .nth(1)
                    .map(|(i, _)| cur + i)
                    .unwrap_or(text.len())
            }
        }
    }
}

/// Start offset of the overlap prefix for a chunk beginning at `cur`.
///
/// Walks back up to `overlap` bytes, snaps forward onto a word start, and
/// never reaches past the previous chunk's own fresh start.
fn overlap_start(text: &str, cur: usize, overlap: usize, prev_start: Option<usize>) -> usize {
    let floor = prev_start.unwrap_or(0);
    let mut o = text::snap_to_char_boundary(text, cur.saturating_sub(overlap)).max(floor);
    if o == 0 || o >= cur {
        return o.min(cur);
    }
    // Mid-word landing: advance to the next word start inside the window.
    let at_word_start = text[..o].ends_with(|c: char| c.is_whitespace());
    if !at_word_start {
        o = match text[o..cur].find(|c: char| c.is_whitespace()) {
            Some(pos) => o + pos + 1,
            None => cur,
        };
    }
    o.min(cur)
}

/// Page and section provenance for a chunk starting at `offset`.
fn source_ref_at(offset: usize, pages: &[PageSpan], sections: &[text::SectionMark]) -> SourceRef {
    let page = pages
        .iter()
        .rev()
        .find(|p| p.start <= offset)
        .map(|p| p.page);
    let section = sections
        .iter()
        .rev()
        .find(|s| s.offset <= offset)
        .map(|s| s.title.clone());
    SourceRef { page, section }
}

/// Fold an undersized final chunk back into its predecessor so retrieval
/// never surfaces a fragment.
fn merge_small_tail(text: &str, chunks: &mut Vec<Chunk>, min_chars: usize) {
    if chunks.len() < 2 {
        return;
    }
    let undersized = chunks
        .last()
        .is_some_and(|last| last.end - last.start < min_chars);
    if !undersized {
        return;
    }
    if let Some(tail) = chunks.pop() {
        if let Some(prev) = chunks.last_mut() {
            let overlap_start = prev.start - prev.overlap;
            prev.end = tail.end;
            prev.text = text[overlap_start..tail.end].to_string();
        }
    }
}
