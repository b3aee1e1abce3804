use crate::index::SearchHit;

/// Join hit texts with newlines in result order and cut the result at
/// `max_chars` characters. The cut ignores word boundaries.
pub fn build_context(hits: &[SearchHit], max_chars: usize) -> String {
    let joined = hits
        .iter()
        .map(|h| h.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    truncate_chars(&joined, max_chars)
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
