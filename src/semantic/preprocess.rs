//! Text preprocessing for embedding generation.
//!
//! Prepares article text for the embedding model:
//! 1. Collapse whitespace runs to single spaces
//! 2. Trim both ends
//! 3. Truncate to the model's input budget (characters, not tokens)

/// Default maximum text length for embedding input (characters, not tokens)
pub const DEFAULT_MAX_CHARS: usize = 8000;

/// Normalize raw text for embedding.
///
/// `None` and whitespace-only input yield an empty string. The result is a
/// fixed point: `preprocess_text(Some(&out), max) == out`.
pub fn preprocess_text(text: Option<&str>, max_chars: usize) -> String {
    let Some(text) = text else {
        return String::new();
    };

    let mut collapsed = String::with_capacity(text.len().min(max_chars.saturating_mul(4)));
    for word in text.split_whitespace() {
        if !collapsed.is_empty() {
            collapsed.push(' ');
        }
        collapsed.push_str(word);
    }

    truncate_chars(collapsed, max_chars)
}

/// Truncate to `max_chars` characters without splitting UTF-8 sequences.
fn truncate_chars(content: String, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        // a cut can land right after a space
        Some((byte_idx, _)) => content[..byte_idx].trim_end().to_string(),
        None => content,
    }
}
