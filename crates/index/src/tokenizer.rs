//! Text tokenization for the inverted index.

/// Tokenize text into searchable terms.
///
/// Lowercases and splits into maximal runs of word characters (alphanumerics
/// and underscore). Tokens keep their order and may repeat; term frequency
/// counts on repeats.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
