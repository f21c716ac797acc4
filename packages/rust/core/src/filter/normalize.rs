//! Comparison form for titles, urls and queries.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Lower-case, decompose (NFD) and drop combining marks, so `"Àlpha"`
/// compares equal to `"alpha"`.
pub fn simplify(value: &str) -> String {
    value
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}
