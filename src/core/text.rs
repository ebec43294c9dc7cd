//! Text helpers for bounding prompt size.

use unicode_segmentation::UnicodeSegmentation;

/// Suffix appended to cropped text.
const ELLIPSIS: &str = "...";

/// Crops `text` to at most `max_len` user-perceived characters.
///
/// Text longer than the limit keeps its first `max_len - 3` graphemes and
/// gains a `...` suffix, so the result is exactly `max_len` graphemes long.
/// Cropping never splits a multi-byte character or a combining sequence.
#[must_use]
pub fn crop_text(text: &str, max_len: usize) -> String {
    if text.graphemes(true).nth(max_len).is_none() {
        return text.to_string();
    }

    let keep = max_len.saturating_sub(ELLIPSIS.len());
    let end = text
        .grapheme_indices(true)
        .nth(keep)
        .map_or(text.len(), |(idx, _)| idx);

    let mut cropped = String::with_capacity(end + ELLIPSIS.len());
    cropped.push_str(&text[..end]);
    cropped.push_str(ELLIPSIS);
    cropped
}

/// Crops an optional field, keeping `None` as `None`.
#[must_use]
pub fn crop_opt(text: Option<&str>, max_len: usize) -> Option<String> {
    text.map(|t| crop_text(t, max_len))
}

/// Returns the largest char boundary in `s` that is `<= index`.
#[must_use]
pub const fn find_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
