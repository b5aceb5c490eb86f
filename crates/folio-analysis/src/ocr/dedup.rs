//! Line-level deduplication of merged text.

use std::collections::HashSet;

/// Split on CRLF, LF or CR. Trailing empty segments are dropped.
fn split_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\r' => {
                lines.push(&text[start..i]);
                i += if bytes.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
                start = i;
            }
            b'\n' => {
                lines.push(&text[start..i]);
                i += 1;
                start = i;
            }
            _ => i += 1,
        }
    }
    lines.push(&text[start..]);

    while lines.len() > 1 && lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

/// Remove repeated lines, comparing case-insensitively.
///
/// The first occurrence keeps its original casing and position. Lines are
/// rejoined with `separator`, or `"\n"` when the separator is blank.
pub fn remove_duplicate_lines(text: &str, separator: &str) -> String {
    let separator = if separator.trim().is_empty() {
        "\n"
    } else {
        separator
    };

    let mut seen = HashSet::new();
    split_lines(text)
        .into_iter()
        .filter(|line| seen.insert(line.to_lowercase()))
        .collect::<Vec<_>>()
        .join(separator)
}
