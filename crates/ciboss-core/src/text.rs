//! Character-based truncation helpers.
//!
//! Limits in this crate are counted in characters, not bytes, so multi-byte
//! log output never gets split mid-codepoint.

/// Marker appended to text cut short by a length cap.
pub const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// Return at most `max_chars` characters of `s`.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Whether `s` is longer than `max_chars` characters.
pub fn exceeds_chars(s: &str, max_chars: usize) -> bool {
    s.char_indices().nth(max_chars).is_some()
}

/// Truncate to `max_chars` and append `marker` when anything was dropped.
pub fn truncate_with_marker(s: &str, max_chars: usize, marker: &str) -> String {
    if exceeds_chars(s, max_chars) {
        format!("{}{marker}", truncate_chars(s, max_chars))
    } else {
        s.to_string()
    }
}
