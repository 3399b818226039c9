//! Text processing utilities.

use regex::Regex;
use std::sync::OnceLock;

static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();
static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
static SEPARATOR_RE: OnceLock<Regex> = OnceLock::new();

fn whitespace_re() -> &'static Regex {
    WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("static regex is valid"))
}

fn token_re() -> &'static Regex {
    TOKEN_RE.get_or_init(|| Regex::new(r"[\p{L}\p{N}]+").expect("static regex is valid"))
}

fn separator_re() -> &'static Regex {
    SEPARATOR_RE.get_or_init(|| Regex::new(r"[^\p{L}\p{N}]+").expect("static regex is valid"))
}

/// Replace consecutive whitespace (spaces, tabs, newlines) with a single space
/// and trim leading/trailing whitespace.
pub fn normalize_whitespace(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    whitespace_re().replace_all(s, " ").trim().to_string()
}

/// Lower-cased alphanumeric tokens of `s`, in order.
pub fn tokenize(s: &str) -> Vec<String> {
    token_re()
        .find_iter(s)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Normalise a relationship label to upper snake case (`"works on"` → `"WORKS_ON"`).
///
/// Runs of non-alphanumeric characters collapse into one underscore; leading and
/// trailing separators are dropped.
pub fn to_upper_snake_case(s: &str) -> String {
    separator_re()
        .replace_all(s.trim(), "_")
        .trim_matches('_')
        .to_uppercase()
}

/// Truncate `s` to at most `max_len` Unicode scalar values, appending `"..."` if
/// truncation occurred. `max_len` counts characters (not bytes).
pub fn truncate_with_ellipsis(s: &str, max_len: usize) -> String {
    if max_len == 0 {
        return String::new();
    }

    let char_count = s.chars().count();
    if char_count <= max_len {
        return s.to_string();
    }

    if max_len <= 3 {
        return ".".repeat(max_len);
    }

    let keep_chars = max_len - 3;
    let byte_offset = s
        .char_indices()
        .nth(keep_chars)
        .map(|(i, _)| i)
        .unwrap_or(s.len());

    format!("{}...", &s[..byte_offset])
}

/// Find the first balanced `{...}` object in a free-form LLM response.
///
/// Scans brace depth from the first `{`, ignoring braces inside JSON string
/// literals (with backslash escapes). If the first candidate never closes, the
/// scan restarts at the next `{`. Returns `None` when no balanced object exists.
pub fn extract_first_json_object(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    let mut search_from = 0;

    while let Some(offset) = s[search_from..].find('{') {
        let start = search_from + offset;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (i, &b) in bytes.iter().enumerate().skip(start) {
            if in_string {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(&s[start..=i]);
                    }
                }
                _ => {}
            }
        }

        search_from = start + 1;
    }

    None
}
