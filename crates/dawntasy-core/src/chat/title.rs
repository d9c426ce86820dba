//! Chat title derivation.
//!
//! Once a chat has its first exchange, its title is taken from the leading
//! text of the first user message.

/// Suffix appended when a title had to be cut short.
const ELLIPSIS: &str = "...";

/// Derive a title from a user message.
///
/// Whitespace runs collapse to single spaces. The result holds at most
/// `max_chars` characters of the message, followed by `...` when cut.
/// Returns `None` for blank input.
pub fn derive_title(content: &str, max_chars: usize) -> Option<String> {
    let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() || max_chars == 0 {
        return None;
    }

    match collapsed.char_indices().nth(max_chars) {
        None => Some(collapsed),
        Some((cut, _)) => {
            let head = collapsed[..cut].trim_end();
            Some(format!("{head}{ELLIPSIS}"))
        }
    }
}
