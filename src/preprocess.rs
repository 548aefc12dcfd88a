//! Input text normalization applied before tokenization.

/// Trim the ends and collapse every whitespace run (spaces, tabs, newlines)
/// into a single space. Whitespace-only input normalizes to the empty string,
/// which the predictor rejects.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
