//! HS code extraction and normalization.

use regex::Regex;
use std::sync::OnceLock;

fn code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(?:HS\s*)?(\d{4}(?:[.\-]?\d{2}(?:[.\-]?\d{2}(?:[.\-]?\d{2})?)?)?)")
            .unwrap_or_else(|e| unreachable!("static pattern: {e}"))
    })
}

fn heading_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d{2})\.(\d{2})").unwrap_or_else(|e| unreachable!("static pattern: {e}"))
    })
}

fn chapter_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"제\s*(\d{1,2})\s*류").unwrap_or_else(|e| unreachable!("static pattern: {e}"))
    })
}

/// Keep only ASCII digits.
pub fn digits(code: &str) -> String { code.chars().filter(char::is_ascii_digit).collect() }

/// Four-digit heading key (`"3923.30-0000"` -> `"3923"`), if the code has one.
pub fn heading(code: &str) -> Option<String> {
    let d = digits(code);
    (d.len() >= 4).then(|| d[..4].to_string())
}

/// Two codes are the same when their digits match.
pub fn same_code(a: &str, b: &str) -> bool {
    let (a, b) = (digits(a), digits(b));
    !a.is_empty() && a == b
}

/// Codes given at different precision refer to the same line when one is a
/// prefix of the other and both name at least a heading
/// (`"9405.21"` vs `"9405.21-1000"`).
pub fn related(a: &str, b: &str) -> bool {
    let (a, b) = (digits(a), digits(b));
    a.len() >= 4 && b.len() >= 4 && (a.starts_with(&b) || b.starts_with(&a))
}

/// Extract HS codes from free text, digits only, in order of first
/// appearance and without duplicates.
///
/// ```
/// use hsdb_core::codes::extract_codes;
/// assert_eq!(extract_codes("6403.99와 HS 6402-99 중"), vec!["640399", "640299"]);
/// ```
pub fn extract_codes(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for caps in code_pattern().captures_iter(text) {
        let code = digits(&caps[1]);
        if code.len() >= 4 && !out.contains(&code) {
            out.push(code);
        }
    }
    out
}

/// Codes named by a manual section header: `"39.23"` -> `"3923"`,
/// `"제39류"` -> `"3900"`. Part headers (`"제7부"`) yield nothing.
pub fn header_codes(header: &str) -> Vec<String> {
    let headings: Vec<String> = heading_pattern()
        .captures_iter(header)
        .map(|c| format!("{}{}", &c[1], &c[2]))
        .collect();
    if !headings.is_empty() {
        return headings;
    }
    chapter_pattern()
        .captures_iter(header)
        .map(|c| format!("{:0>2}00", &c[1]))
        .collect()
}
