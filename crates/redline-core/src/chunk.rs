//! Overlapping-window text chunker.
//!
//! Splits document text into windows of at most `size` characters, where
//! consecutive windows share up to `overlap` characters. Each window ends on
//! the softest boundary available inside it.
//!
//! # Algorithm
//!
//! 1. If the rest of the text fits in one window, emit it and stop.
//! 2. Otherwise look for a cut point inside the window, past the overlap
//!    region, trying in order: a paragraph break (`\n\n`), a sentence end
//!    (`.`, `!`, `?` followed by whitespace, or a single newline), a word
//!    boundary (any whitespace). The latest matching cut wins.
//! 3. With no boundary at all, cut hard at `size` characters.
//! 4. The next window starts `overlap` characters before the cut, nudged
//!    forward to the next word start when one exists in the overlap.
//!
//! # Guarantees
//!
//! - Empty input yields no windows; any non-empty input yields at least one.
//! - Windows are raw slices of the input, so every character is covered.
//! - Window starts strictly increase, and lengths never exceed `size`.
//! - Output is a pure function of `(text, size, overlap)`.
//!
//! Lengths are measured in Unicode scalar values, never bytes, so cuts always
//! land on UTF-8 boundaries.
//!
//! # Example
//!
//! ```rust
//! use redline_core::chunk::split_text;
//!
//! let windows = split_text("First paragraph.\n\nSecond paragraph.", 20, 0);
//! assert_eq!(windows, vec!["First paragraph.\n\n", "Second paragraph."]);
//! ```

use std::ops::Range;

/// Boundary kinds, softest first.
#[derive(Clone, Copy)]
enum Boundary {
    Paragraph,
    Sentence,
    Word,
}

const BOUNDARIES: [Boundary; 3] = [Boundary::Paragraph, Boundary::Sentence, Boundary::Word];

/// Split `text` into overlapping windows. See the module docs for the policy.
///
/// `overlap` is clamped below `size`, and a zero `size` is treated as 1.
pub fn split_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    split_spans(text, size, overlap)
        .into_iter()
        .map(|r| text[r].to_string())
        .collect()
}

/// Like [`split_text`], but returns the byte range of each window in `text`.
pub fn split_spans(text: &str, size: usize, overlap: usize) -> Vec<Range<usize>> {
    if text.is_empty() {
        return Vec::new();
    }
    let size = size.max(1);
    let overlap = overlap.min(size - 1);

    let chars: Vec<char> = text.chars().collect();
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let n = chars.len();

    let mut spans = Vec::new();
    let mut start = 0usize;
    loop {
        if n - start <= size {
            spans.push(offsets[start]..offsets[n]);
            break;
        }
        let limit = start + size;
        let end = find_cut(&chars, start + overlap + 1, limit).unwrap_or(limit);
        spans.push(offsets[start]..offsets[end]);
        start = next_start(&chars, end, overlap);
    }
    spans
}

/// Latest cut position in `min..=max` for the softest boundary that has one.
fn find_cut(chars: &[char], min: usize, max: usize) -> Option<usize> {
    BOUNDARIES.iter().find_map(|&kind| {
        (min..=max)
            .rev()
            .find(|&pos| is_boundary(kind, chars, pos))
    })
}

/// Whether cutting between `chars[pos - 1]` and `chars[pos]` lands on `kind`.
fn is_boundary(kind: Boundary, chars: &[char], pos: usize) -> bool {
    if pos == 0 || pos > chars.len() {
        return false;
    }
    let prev = chars[pos - 1];
    match kind {
        Boundary::Paragraph => pos >= 2 && prev == '\n' && chars[pos - 2] == '\n',
        Boundary::Sentence => {
            prev == '\n'
                || (pos >= 2
                    && prev.is_whitespace()
                    && matches!(chars[pos - 2], '.' | '!' | '?' | '…'))
        }
        Boundary::Word => prev.is_whitespace(),
    }
}

/// Start of the window following a cut at `end`.
///
/// Always greater than the previous window's start because callers only cut
/// past `start + overlap`.
fn next_start(chars: &[char], end: usize, overlap: usize) -> usize {
    if overlap == 0 {
        return end;
    }
    let from = end - overlap;
    (from..end)
        .find(|&q| q > 0 && chars[q - 1].is_whitespace() && !chars[q].is_whitespace())
        .unwrap_or(from)
}
