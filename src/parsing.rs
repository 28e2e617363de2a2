//! Numeric extraction from the localized label text found on listing cards.
//!
//! Brazilian sites write `R$ 1.250.000,00`, `64 a 219 m²` or `2 a 3 quartos`.
//! Every parser here takes the first numeric token, which also truncates a
//! range to its lower end.

use regex::Regex;
use std::sync::OnceLock;

fn decimal_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Thousands groups ("1.250.000,50") first, then a plain number with an
    // optional decimal part ("64,5" / "64.5").
    RE.get_or_init(|| {
        Regex::new(r"\d{1,3}(?:\.\d{3})+(?:,\d+)?|\d+(?:[.,]\d+)?").expect("valid regex")
    })
}

fn integer_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("valid regex"))
}

/// First number in `text`, honouring `.` as thousands and `,` as decimal separator.
pub fn first_number(text: &str) -> Option<f64> {
    let token = decimal_token().find(text)?.as_str();
    let normalized = if token.contains(',') {
        token.replace('.', "").replace(',', ".")
    } else if is_thousands_grouped(token) {
        token.replace('.', "")
    } else {
        token.to_string()
    };
    normalized.parse().ok()
}

fn is_thousands_grouped(token: &str) -> bool {
    let mut parts = token.split('.');
    let head = parts.next().unwrap_or_default();
    let tail: Vec<&str> = parts.collect();
    !tail.is_empty() && head.len() <= 3 && tail.iter().all(|p| p.len() == 3)
}

/// Price from currency text. "Sob Consulta" (price on request) yields `None`.
pub fn parse_price(text: &str) -> Option<f64> {
    if text.to_lowercase().contains("consulta") {
        return None;
    }
    first_number(text)
}

/// Area in square meters from text like "64 a 219 m²".
pub fn parse_size(text: &str) -> Option<f64> {
    first_number(text)
}

/// Room, bathroom or parking count from text like "2 a 3 quartos" or "1 vaga".
pub fn parse_count(text: &str) -> Option<u32> {
    integer_token().find(text)?.as_str().parse().ok()
}

/// Collapses runs of whitespace (including tabs and newlines) into one space.
pub fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
