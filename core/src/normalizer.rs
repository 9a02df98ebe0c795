use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

/// A multi-word regulatory phrase that is indexed as one compound token.
struct DomainPhrase {
    pattern: Regex,
    /// Fixed token to emit; `None` derives the token from the matched text.
    token: Option<&'static str>,
}

fn phrase(pattern: &str, token: Option<&'static str>) -> DomainPhrase {
    DomainPhrase { pattern: Regex::new(pattern).expect("valid domain phrase regex"), token }
}

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"[^\w\s]").expect("valid regex");
    static ref NON_ALNUM: Regex = Regex::new(r"[^a-z0-9]+").expect("valid regex");
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","an","and","are","as","at","be","by","do","does",
            "for","from","has","have","how","in","is","it","its","of",
            "on","or","that","the","this","to","was","were","what","when",
            "where","which","who","will","with",
        ];
        words.iter().copied().collect()
    };
    static ref DOMAIN_PHRASES: Vec<DomainPhrase> = vec![
        phrase(r"\bfire\s+detection\b", Some("fire_detection")),
        phrase(r"\bfire\s+extinguish(?:er|ers|ing)?\b", Some("fire_extinguisher")),
        phrase(r"\bfire\s+(?:main|pumps?)\b", Some("fire_main")),
        phrase(r"\boil\s+discharges?\b", Some("oil_discharge")),
        phrase(r"\boily\s+waste\b", Some("oily_waste")),
        phrase(r"\bballast\s+water\b", Some("ballast_water")),
        phrase(r"\bmachinery\s+spaces?\b", Some("machinery_space")),
        phrase(r"\blife\s*saving\s+(?:equipment|appliances?|systems?)\b", Some("lifesaving_equipment")),
        phrase(r"\bsurvival\s+craft\b", Some("survival_craft")),
        phrase(r"\boffshore\s+supply\s+vessels?\b", Some("offshore_supply_vessel")),
        phrase(r"\bnavigable\s+waters\b", Some("navigable_waters")),
        phrase(r"\bcontiguous\s+zone\b", Some("contiguous_zone")),
        phrase(r"\bload\s+lines?\b", Some("load_line")),
        phrase(r"\bemergency\s+power\b", Some("emergency_power")),
        phrase(r"\bsafety\s+management\s+system\b", Some("safety_management_system")),
        phrase(r"\bsubchapter\s+[a-z]\b", None),
        phrase(r"\b\d+\s+cfr\s+\d+(?:\.\d+)?", None),
    ];
}

fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Strips the first matching suffix out of `ing`, `ed`, `es`, `s`.
///
/// Deliberately crude: "bus" becomes "bu". A suffix is never stripped when it
/// would leave nothing behind.
pub fn stem(token: &str) -> &str {
    for suffix in ["ing", "ed", "es", "s"] {
        if let Some(rest) = token.strip_suffix(suffix) {
            if !rest.is_empty() {
                return rest;
            }
        }
    }
    token
}

/// Normalize text into index terms: the generic token stream followed by one
/// underscore-joined compound token per domain phrase match.
///
/// Phrase extraction runs on the folded raw text, so compound tokens are never
/// stemmed.
pub fn normalize(text: &str) -> Vec<String> {
    let folded = fold(text);
    let mut tokens = generic_tokens(&folded);
    tokens.extend(domain_phrases(&folded));
    tokens
}

/// NFKC, then ASCII-only lowercasing; non-ASCII letters keep their case.
fn fold(text: &str) -> String {
    let mut folded: String = text.nfkc().collect();
    folded.make_ascii_lowercase();
    folded
}

fn generic_tokens(folded: &str) -> Vec<String> {
    let stripped = NON_WORD.replace_all(folded, " ");
    stripped
        .split_whitespace()
        .filter(|t| !is_stopword(t))
        .map(|t| stem(t).to_string())
        .collect()
}

fn domain_phrases(folded: &str) -> Vec<String> {
    let mut out = Vec::new();
    for dp in DOMAIN_PHRASES.iter() {
        for m in dp.pattern.find_iter(folded) {
            let token = match dp.token {
                Some(t) => t.to_string(),
                None => NON_ALNUM.replace_all(m.as_str(), "_").trim_matches('_').to_string(),
            };
            out.push(token);
        }
    }
    out
}
