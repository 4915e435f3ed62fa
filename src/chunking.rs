//! Boundary-aware document chunking.
//!
//! Splits document text into overlapping segments under a fixed character
//! budget. Cuts prefer natural boundaries, in priority order: paragraph
//! break, sentence end, clause separator, word boundary, and only then a
//! hard character cut. Embeddings computed over mid-word fragments retrieve
//! poorly, so the word boundary is honored anywhere in the window; the
//! higher-priority boundaries are only considered in the back half of the
//! window to avoid degenerate slivers.
//!
//! The `overlap` tail of each chunk is repeated at the start of the next
//! one so context spanning a cut is still retrievable.

use serde::{Deserialize, Serialize};

use crate::types::VerifyError;

/// One chunk of a source document, with character offsets into the
/// original text (`end_char` exclusive, always greater than `start_char`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkSpan {
    /// Position of this chunk within its document, assigned monotonically.
    pub sequence_index: usize,
    pub text: String,
    pub start_char: usize,
    pub end_char: usize,
}

/// Splits `text` into overlapping chunks of at most `chunk_size` characters.
///
/// Empty input yields an empty vector. `overlap` must be strictly smaller
/// than `chunk_size`; violating that is a configuration error, not a
/// recoverable condition.
pub fn chunk(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<ChunkSpan>, VerifyError> {
    if chunk_size == 0 {
        return Err(VerifyError::config("chunk_size must be positive"));
    }
    if overlap >= chunk_size {
        return Err(VerifyError::config(format!(
            "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let mut spans = Vec::new();
    let mut start = 0usize;
    while start < total {
        let budget_end = start + chunk_size;
        let end = if budget_end >= total {
            total
        } else {
            find_break(&chars, start, budget_end, chunk_size)
        };

        spans.push(ChunkSpan {
            sequence_index: spans.len(),
            text: chars[start..end].iter().collect(),
            start_char: start,
            end_char: end,
        });

        if end == total {
            break;
        }
        // Rewind by the overlap, but always make forward progress even when
        // a boundary landed close to the chunk start.
        start = end.saturating_sub(overlap).max(start + 1);
    }

    Ok(spans)
}

/// Pick the cut position in `(start, budget_end]`.
fn find_break(chars: &[char], start: usize, budget_end: usize, chunk_size: usize) -> usize {
    // Paragraph, sentence, and clause boundaries only count in the back
    // half of the window; a paragraph break two characters in would
    // otherwise produce a near-empty chunk.
    let floor = start + chunk_size / 2;

    if let Some(end) = rfind_boundary(chars, floor, budget_end, is_paragraph_break) {
        return end;
    }
    if let Some(end) = rfind_boundary(chars, floor, budget_end, is_sentence_break) {
        return end;
    }
    if let Some(end) = rfind_boundary(chars, floor, budget_end, is_clause_break) {
        return end;
    }
    // Word boundaries are honored anywhere in the window: a mid-word cut is
    // only allowed when the window contains no whitespace at all.
    for i in (start + 1..=budget_end).rev() {
        if chars[i - 1].is_whitespace() {
            return i;
        }
    }
    budget_end
}

/// Scan backwards through `(floor, budget_end]` for a position where
/// `matches(chars, i)` accepts a cut ending at `i`.
fn rfind_boundary(
    chars: &[char],
    floor: usize,
    budget_end: usize,
    matches: fn(&[char], usize) -> bool,
) -> Option<usize> {
    (floor + 1..=budget_end).rev().find(|&i| matches(chars, i))
}

fn is_paragraph_break(chars: &[char], i: usize) -> bool {
    i >= 2 && chars[i - 1] == '\n' && chars[i - 2] == '\n'
}

fn is_sentence_break(chars: &[char], i: usize) -> bool {
    let prev = chars[i - 1];
    if prev == '\n' {
        return true;
    }
    matches!(prev, '.' | '!' | '?') && chars.get(i).is_none_or(|c| c.is_whitespace())
}

fn is_clause_break(chars: &[char], i: usize) -> bool {
    matches!(chars[i - 1], ',' | ';' | ':') && chars.get(i).is_none_or(|c| c.is_whitespace())
}
