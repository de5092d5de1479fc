//! Text normalization for actor matching
//!
//! Names arrive in Latin, Hangul and Cyrillic script, with or without
//! diacritics, hyphens and honorific punctuation. Normalization:
//! - Unicode NFKD, combining marks dropped, then NFC (Hangul recomposes)
//! - Unicode lowercase
//! - Punctuation replaced with space
//! - Whitespace collapsed
//! - Optional legal suffix removal (organizations)

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Common legal and organizational suffixes to optionally strip
const LEGAL_SUFFIXES: &[&str] = &[
    "inc",
    "corp",
    "corporation",
    "llc",
    "ltd",
    "limited",
    "co",
    "company",
    "jsc",
    "pjsc",
    "ooo",
    "ооо",
    "оао",
    "зао",
    "пао",
];

/// Country aliases folded onto ISO 3166-1 alpha-2 codes
const NATIONALITY_ALIASES: &[(&str, &str)] = &[
    ("kp", "KP"),
    ("prk", "KP"),
    ("dprk", "KP"),
    ("north korea", "KP"),
    ("democratic people s republic of korea", "KP"),
    ("북한", "KP"),
    ("조선", "KP"),
    ("kr", "KR"),
    ("kor", "KR"),
    ("south korea", "KR"),
    ("republic of korea", "KR"),
    ("대한민국", "KR"),
    ("한국", "KR"),
    ("ru", "RU"),
    ("rus", "RU"),
    ("russia", "RU"),
    ("russian federation", "RU"),
    ("россия", "RU"),
    ("cn", "CN"),
    ("chn", "CN"),
    ("china", "CN"),
    ("people s republic of china", "CN"),
];

/// Normalize actor text for matching.
///
/// ```
/// use tnr_tracker::entity_linking::normalize::normalize_name;
///
/// assert_eq!(normalize_name("Kim Jong-un", false), "kim jong un");
/// assert_eq!(normalize_name("Sergeï  Lavróv", false), "sergei lavrov");
/// assert_eq!(normalize_name("Korea Kangsong Trading Co., Ltd.", true), "korea kangsong trading");
/// ```
pub fn normalize_name(s: &str, strip_legal_suffixes: bool) -> String {
    // Decompose, drop diacritics, recompose so Hangul syllables survive intact
    let folded: String = s
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .nfc()
        .collect();

    let stripped: String = folded
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .flat_map(char::to_lowercase)
        .collect();

    let tokens = stripped.split_whitespace();
    let filtered: Vec<&str> = if strip_legal_suffixes {
        tokens.filter(|t| !is_legal_suffix(t)).collect()
    } else {
        tokens.collect()
    };

    filtered.join(" ")
}

fn is_legal_suffix(token: &str) -> bool {
    LEGAL_SUFFIXES.contains(&token)
}

/// Tokenize text for overlap matching.
pub fn tokenize(s: &str) -> Vec<String> {
    normalize_name(s, false)
        .split_whitespace()
        .map(|s| s.to_string())
        .collect()
}

/// Canonical nationality code, or the normalized text when unknown
pub fn normalize_nationality(s: &str) -> Option<String> {
    let norm = normalize_name(s, false);
    if norm.is_empty() {
        return None;
    }
    let code = NATIONALITY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == norm)
        .map(|(_, code)| code.to_string())
        .unwrap_or_else(|| norm.to_uppercase());
    Some(code)
}
