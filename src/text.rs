//! Text normalization and structure detection.
//!
//! Ingested text arrives from an external loader (OCR or native extraction)
//! and is normalized before chunking: line endings unified, control
//! characters stripped, ligatures and typographic quotes folded to ASCII,
//! runs of spaces collapsed. Chunk offsets always refer to this normalized
//! form.
//!
//! The module also provides the two structural scans the chunker relies on:
//!
//! - [`sentence_breaks`] — byte offsets where a new sentence (or paragraph)
//!   begins, used to place chunk boundaries.
//! - [`detect_sections`] — heuristic header detection (ALL-CAPS lines, short
//!   lines ending in a colon, numbered headings), used to attach a section
//!   label to each chunk's provenance.

/// Normalize raw extracted text.
///
/// Operations, in order: unify line endings, replace tabs with spaces, strip
/// control characters (newlines excepted), fold common ligatures and
/// typographic punctuation to ASCII, collapse space runs, trim trailing
/// whitespace per line, and bound blank-line runs. The result is what every
/// downstream offset refers to.
pub fn normalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut folded = String::with_capacity(unified.len());
    for ch in unified.chars() {
        match ch {
            '\t' => folded.push(' '),
            'ﬁ' => folded.push_str("fi"),
            'ﬂ' => folded.push_str("fl"),
            'ﬀ' => folded.push_str("ff"),
            'ﬃ' => folded.push_str("ffi"),
            'ﬄ' => folded.push_str("ffl"),
            '\u{2018}' | '\u{2019}' => folded.push('\''),
            '\u{201C}' | '\u{201D}' => folded.push('"'),
            '\u{2013}' | '\u{2014}' => folded.push('-'),
            '\u{2026}' => folded.push_str("..."),
            '\u{00A0}' => folded.push(' '),
            c if c.is_control() && c != '\n' => {}
            c => folded.push(c),
        }
    }

    let mut out = String::with_capacity(folded.len());
    let mut blank_run = 0usize;
    for line in folded.split('\n') {
        let line = collapse_spaces(line.trim_end());
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&line);
    }
    out.trim_matches('\n').trim().to_string()
}

/// Collapse runs of two or more spaces into one.
fn collapse_spaces(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut prev_space = false;
    for ch in line.chars() {
        if ch == ' ' {
            if !prev_space {
                out.push(ch);
            }
            prev_space = true;
        } else {
            prev_space = false;
            out.push(ch);
        }
    }
    out
}

/// Byte offsets at which a new sentence begins.
///
/// A break is recorded after sentence-ending punctuation (`.`, `!`, `?`,
/// optionally followed by a closing quote or bracket) and its trailing
/// whitespace, provided the next character opens a plausible sentence
/// (uppercase, digit, or opening quote/bracket). Paragraph breaks (a blank
/// line) always count. `text.len()` is always the final entry for non-empty
/// input, so a caller can treat the list as exhaustive split points.
pub fn sentence_breaks(text: &str) -> Vec<usize> {
    let bytes = text.as_bytes();
    let mut breaks = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'.' || b == b'!' || b == b'?' {
            let mut j = i + 1;
            // Closing quotes/brackets stay attached to the sentence.
            while j < bytes.len() && matches!(bytes[j], b'"' | b'\'' | b')' | b']') {
                j += 1;
            }
            let ws_start = j;
            let mut saw_newline = false;
            while j < bytes.len() && (bytes[j] as char).is_ascii_whitespace() {
                if bytes[j] == b'\n' {
                    saw_newline = true;
                }
                j += 1;
            }
            if j > ws_start {
                let opens_sentence = match text[j..].chars().next() {
                    None => true,
                    Some(c) => {
                        c.is_uppercase()
                            || c.is_ascii_digit()
                            || matches!(c, '"' | '\'' | '(' | '[')
                    }
                };
                if opens_sentence || saw_newline {
                    breaks.push(j);
                    i = j;
                    continue;
                }
            } else if j == bytes.len() {
                breaks.push(j);
                break;
            }
            i = j.max(i + 1);
            continue;
        }
        if b == b'\n' {
            // Paragraph break: blank line ends the current sentence.
            let mut j = i + 1;
            let mut saw_second = false;
            while j < bytes.len() && (bytes[j] as char).is_ascii_whitespace() {
                if bytes[j] == b'\n' {
                    saw_second = true;
                }
                j += 1;
            }
            if saw_second && j < bytes.len() {
                breaks.push(j);
                i = j;
                continue;
            }
        }
        i += 1;
    }

    if !text.is_empty() && breaks.last() != Some(&text.len()) {
        breaks.push(text.len());
    }
    breaks
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
pub fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Find a split point at or before `index` that does not land mid-word:
/// the position just after the last whitespace char in `text[from..index]`.
/// Returns `None` when the window contains no whitespace.
pub fn word_boundary_before(text: &str, from: usize, index: usize) -> Option<usize> {
    let index = snap_to_char_boundary(text, index);
    if from >= index {
        return None;
    }
    text[from..index]
        .rfind(|c: char| c.is_whitespace())
        .map(|pos| from + pos + 1)
}

/// A detected section header: byte offset of the line start and its title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionMark {
    pub offset: usize,
    pub title: String,
}

/// Scan normalized text for section headers.
///
/// Heuristics carried over from scanned-document processing: short ALL-CAPS
/// lines, short lines ending with a colon, and numbered headings
/// ("2. Methods", "3.1 Results"). Returned in document order; a chunk's
/// section label is the last mark at or before its start offset.
pub fn detect_sections(text: &str) -> Vec<SectionMark> {
    let mut marks = Vec::new();
    let mut offset = 0usize;
    for line in text.split('\n') {
        let trimmed = line.trim();
        if is_header(trimmed) {
            marks.push(SectionMark {
                offset,
                title: trimmed.trim_end_matches(':').to_string(),
            });
        }
        offset += line.len() + 1;
    }
    marks
}

fn is_header(line: &str) -> bool {
    if line.is_empty() {
        return false;
    }
    // Short lines in ALL CAPS.
    if line.len() < 60
        && line.split_whitespace().count() <= 8
        && line.chars().any(|c| c.is_alphabetic())
        && !line.chars().any(|c| c.is_lowercase())
    {
        return true;
    }
    // Short lines ending with a colon.
    if line.len() < 50 && line.ends_with(':') {
        return true;
    }
    // Numbered headings: "1. Introduction", "2.1 Methods".
    let mut chars = line.chars();
    if line.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        let head: String = chars.by_ref().take_while(|c| !c.is_whitespace()).collect();
        if head.chars().all(|c| c.is_ascii_digit() || c == '.') {
            if let Some(rest) = line[head.len()..].trim_start().chars().next() {
                return rest.is_uppercase();
            }
        }
    }
    false
}
