//! Text normalization and character n-gram extraction.
//!
//! Works on `char`s, so a Hangul syllable or a CJK ideograph is one unit
//! and multi-byte encodings are never split.

use std::collections::BTreeMap;

pub const MIN_GRAM: usize = 2;
pub const MAX_GRAM: usize = 4;

/// Lower-case, keep alphanumeric characters of any script, and collapse every
/// run of punctuation or whitespace into a single space.
///
/// ```
/// use hsdb_text::normalize::normalize;
/// assert_eq!(normalize("  Polyurethane-FOAM,  폴리우레탄폼!! "), "polyurethane foam 폴리우레탄폼");
/// ```
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

/// All contiguous 2-, 3- and 4-character substrings of already normalized
/// text. Text shorter than two characters yields nothing.
pub fn char_ngrams(normalized: &str) -> Vec<String> {
    let chars: Vec<char> = normalized.chars().collect();
    let mut grams = Vec::new();
    for n in MIN_GRAM..=MAX_GRAM {
        if chars.len() < n { break; }
        grams.extend(chars.windows(n).map(|w| w.iter().collect::<String>()));
    }
    grams
}

/// Raw occurrence count of every n-gram in `text`, in term order so that
/// floating point sums over it are reproducible.
pub fn term_counts(text: &str) -> BTreeMap<String, u32> {
    let mut counts = BTreeMap::new();
    for gram in char_ngrams(&normalize(text)) {
        *counts.entry(gram).or_insert(0) += 1;
    }
    counts
}
