//! Case, diacritic and whitespace folding primitives for headword keys.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Version of the folding algorithm; participates in the index format
/// version so folding changes invalidate existing indexes.
pub const VERSION: u32 = 2;

/// Lowercase every character, without locale-specific special casing.
pub fn apply_simple_case_only(s: &str) -> String {
    s.chars().flat_map(char::to_lowercase).collect()
}

/// Decompose and drop combining marks, turning "café" into "cafe".
pub fn apply_diacritics_only(s: &str) -> String {
    s.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Remove all whitespace characters.
pub fn apply_whitespace_only(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Case folding plus diacritic stripping; this is the form stored as the
/// B-tree key.
pub fn fold_key(s: &str) -> String {
    apply_diacritics_only(&apply_simple_case_only(s))
}

/// Strip enclosing Unicode whitespace.
pub fn trim_whitespace(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace())
}
