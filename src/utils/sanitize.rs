//! Utilities for sanitizing untrusted input before logging it.
//!
//! Message bodies come straight off the queue. When one is rejected, a short
//! printable preview goes into the log line so the producer can be identified
//! without flooding the log or emitting terminal control sequences.

use crate::config::MAX_LOGGED_BODY_CHARS;

/// Removes control characters, keeping tab, newline and carriage return.
pub fn sanitize_message(message: &str) -> String {
    message
        .chars()
        .filter(|c| {
            let code = *c as u32;
            code >= 0x20 // Printable ASCII starts at 0x20 (space)
                || code == 0x09 // Tab
                || code == 0x0A // Newline
                || code == 0x0D // Carriage return
        })
        .filter(|c| *c != '\u{7F}')
        .collect()
}

/// Returns a sanitized, length-limited preview of a message body.
///
/// Invalid UTF-8 is replaced lossily. Bodies longer than
/// `MAX_LOGGED_BODY_CHARS` characters are cut and annotated with their
/// original byte length.
pub fn preview_body(body: &[u8]) -> String {
    let sanitized = sanitize_message(&String::from_utf8_lossy(body));
    if sanitized.chars().count() > MAX_LOGGED_BODY_CHARS {
        let cut: String = sanitized.chars().take(MAX_LOGGED_BODY_CHARS).collect();
        format!("{}... (truncated, {} bytes)", cut, body.len())
    } else {
        sanitized
    }
}
