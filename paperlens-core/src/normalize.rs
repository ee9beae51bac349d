//! Text canonicalization applied to extracted text and model responses.
//!
//! NFKC folds compatibility forms (PDF ligatures like `ﬁ`, full-width
//! punctuation, non-breaking spaces) into their plain equivalents; typographic
//! quotes are then collapsed to ASCII so the JSON parser sees `"` and `'`.

use unicode_normalization::UnicodeNormalization;

/// Map a typographic quote to its ASCII form. Guillemets are not quotes here.
fn ascii_quote(c: char) -> Option<char> {
    match c {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => Some('\''),
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' => Some('"'),
        _ => None,
    }
}

/// Normalize `text`: NFKC, then typographic quotes to ASCII.
///
/// Idempotent. The bullet character `•` survives unchanged.
pub fn normalize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    text.nfkc()
        .map(|c| ascii_quote(c).unwrap_or(c))
        .collect()
}

/// [`normalize`] lifted over `Option`; `None` stays `None`.
pub fn normalize_opt(text: Option<&str>) -> Option<String> {
    text.map(normalize)
}
