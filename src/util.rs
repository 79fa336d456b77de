//! Small helpers shared across the codebase.

/// Shorten `text` for use as a structured log field: newlines collapse to
/// spaces and anything past `max_chars` characters is cut, with "..."
/// appended when something was dropped.
///
/// Cuts on character boundaries, so multi-byte UTF-8 (emoji, CJK) never
/// splits mid-character.
///
/// # Examples
/// ```
/// use palaver::util::preview;
///
/// assert_eq!(preview("hello", 10), "hello");
/// assert_eq!(preview("hello world", 5), "hello...");
/// assert_eq!(preview("one\ntwo", 20), "one two");
/// ```
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    match flat.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", flat[..idx].trim_end()),
        None => flat,
    }
}
