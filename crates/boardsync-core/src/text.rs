/// Trello rejects card fields longer than this.
/// https://developer.atlassian.com/cloud/trello/rest/api-group-cards/
pub const MAX_TEXT_LENGTH: usize = 16384;

pub const TRUNCATION_MARKER: &str = "... [truncated]";

/// Cap `text` at `MAX_TEXT_LENGTH` characters, ending with the truncation
/// marker when anything was cut. Counts chars, not bytes, so multi-byte
/// input is never split mid-character.
pub fn truncate(text: &str) -> String {
    truncate_to(text, MAX_TEXT_LENGTH)
}

pub fn truncate_to(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let keep = max_len.saturating_sub(TRUNCATION_MARKER.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}
