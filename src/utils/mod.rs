use std::path::Path;

/// Split a raw player name into `(first_name, last_name)`.
///
/// Accepts both forms the stats API hands out:
/// - `"Last, First Middle"`: everything before the first comma is the last
///   name, the first word after it is the first name
/// - `"First Middle Last"`: first and last whitespace-separated words
///
/// Never fails. A single word is used for both parts.
pub fn parse_player_name(raw: &str) -> (String, String) {
    if let Some((last, rest)) = raw.split_once(',') {
        let last = last.trim().to_string();
        let first = rest
            .split_whitespace()
            .next()
            .map(str::to_string)
            .unwrap_or_else(|| last.clone());
        return (first, last);
    }

    let mut words = raw.split_whitespace();
    match words.next() {
        None => (String::new(), String::new()),
        Some(first) => {
            let last = words.last().unwrap_or(first);
            (first.to_string(), last.to_string())
        }
    }
}

/// Roster rows carry both `"Last, First"` and `"First Last"`; prefer the comma
/// form when it actually has a comma.
pub fn names_from_roster(last_comma_first: &str, first_last: &str) -> (String, String) {
    if last_comma_first.contains(',') {
        parse_player_name(last_comma_first)
    } else {
        parse_player_name(first_last)
    }
}

/// File-system safe stem for a display name: lowercase, whitespace runs become
/// `_`, anything that is not alphanumeric, `-` or `_` is dropped.
pub fn sanitize_file_stem(name: &str, fallback: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_us = false;
    for ch in name.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() || ch == '-' {
            out.push(ch);
            last_us = false;
        } else if (ch.is_whitespace() || ch == '_') && !last_us {
            out.push('_');
            last_us = true;
        }
    }
    let out = out.trim_matches('_').to_string();
    if out.is_empty() { fallback.to_string() } else { out }
}

/// An image counts as present when the file exists and is non-empty.
pub fn verify_image(path: impl AsRef<Path>) -> bool {
    std::fs::metadata(path).map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}
