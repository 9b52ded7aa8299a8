//! Token-overlap similarity between bug texts.
//!
//! Text is lowercased and split on every character that is not an ASCII
//! letter or digit, so punctuation and non-ASCII characters act as
//! separators. The score is the Jaccard index of the two token sets.

use std::collections::HashSet;

// ---------------------------------------------------------------------------
// Tokenization
// ---------------------------------------------------------------------------

/// Distinct lowercase ASCII-alphanumeric tokens of `text`.
#[must_use]
pub fn tokenize(text: &str) -> HashSet<String> {
    text.to_ascii_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

/// Jaccard similarity `|A ∩ B| / |A ∪ B|`.
///
/// Returns `0.0` when either set is empty, so a blank text never matches
/// anything, itself included.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn jaccard<T: Eq + std::hash::Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union_size = a.union(b).count() as f64;
    intersection / union_size
}

/// Similarity of two texts in `[0.0, 1.0]`.
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    jaccard(&tokenize(a), &tokenize(b))
}
