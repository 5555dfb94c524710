//! Context strings sent along with decode requests, and edits of the typed text.

/// Marker the decoder expects for "no previous word".
pub const SENTENCE_HEAD: &str = "_HEAD_";

/// Whitespace-trimmed, lower-cased text typed so far.
pub fn prev_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Last space-separated word of `text`, or [`SENTENCE_HEAD`] when there is none.
pub fn prev_word(text: &str) -> String {
    match text.trim().rsplit(' ').next() {
        Some(word) if !word.is_empty() => word.to_string(),
        _ => SENTENCE_HEAD.to_string(),
    }
}

/// Replaces the last word of `text` with `word`.
///
/// The result always ends in a single space so the next word can be appended
/// directly; replacing the only word with `""` yields an empty string.
pub fn replace_last_word(text: &str, word: &str) -> String {
    let mut tokens: Vec<&str> = text.trim().split(' ').collect();
    let replaced = if tokens.len() > 1 {
        if let Some(last) = tokens.last_mut() {
            *last = word;
        }
        tokens.join(" ")
    } else {
        word.to_string()
    };
    let trimmed = replaced.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed} ")
    }
}

/// Appends `word` as a provisional entry.
pub fn append_word(text: &str, word: &str) -> String {
    format!("{text}{word} ")
}
