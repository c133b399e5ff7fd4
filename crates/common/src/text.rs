//! Text analysis shared by retrieval, decision, and rendering
//!
//! Provides:
//! - Tokenization that keeps figures such as `$10M`, `1.5x`, `20%` intact
//! - Stop-word filtering and light plural stemming
//! - Abbreviation expansion for deal vocabulary
//! - Content fingerprints used to tell agreeing facts from conflicting ones

use std::collections::BTreeSet;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "in", "on", "at",
    "to", "for", "of", "with", "by", "from", "and", "or", "but", "not", "this",
    "that", "these", "those", "it", "its", "as", "do", "does", "did", "has",
    "have", "had", "can", "could", "will", "would", "should", "may", "might",
    "what", "whats", "which", "who", "whom", "when", "where", "why", "how",
    "s", "i", "me", "my", "we", "our", "us", "you", "your", "they", "their",
    "there", "any", "some", "about", "please", "tell", "know", "hi", "hello",
    "hey", "thanks", "thank", "just", "so", "if", "then", "also",
];

/// Abbreviations investors use, mapped to the token the knowledge base uses
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("val", "valuation"),
    ("pref", "preference"),
    ("prefs", "preference"),
    ("liq", "liquidation"),
    ("min", "minimum"),
    ("mgmt", "management"),
    ("doc", "document"),
    ("docs", "document"),
    ("lockup", "lockup"),
    ("lock-up", "lockup"),
    ("ev", "valuation"),
];

/// Split text into lowercase tokens. `$`, `%` and inner `.` are kept so
/// figures survive; everything else that is not alphanumeric separates.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '$' || c == '%' || c == '.'))
        .map(|t| t.trim_matches('.'))
        .filter(|t| !t.is_empty() && *t != "$" && *t != "%")
        .map(str::to_string)
        .collect()
}

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// A token carrying a number: amounts, multiples, percentages, dates
pub fn is_figure(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
}

/// Reduce simple plurals so "fees" meets "fee"
pub fn stem(token: &str) -> String {
    if is_figure(token) || token.len() <= 3 {
        return token.to_string();
    }
    if let Some(base) = token.strip_suffix("ies") {
        return format!("{}y", base);
    }
    if token.ends_with("ss") || token.ends_with("us") {
        return token.to_string();
    }
    token.strip_suffix('s').unwrap_or(token).to_string()
}

fn expand(token: &str) -> &str {
    ABBREVIATIONS
        .iter()
        .find(|(abbr, _)| *abbr == token)
        .map(|(_, full)| *full)
        .unwrap_or(token)
}

/// Content-bearing terms of a text: tokenized, stop words dropped,
/// abbreviations expanded, stemmed, de-duplicated in first-seen order.
pub fn terms(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    tokenize(text)
        .into_iter()
        .filter(|t| !is_stop_word(t))
        .map(|t| stem(expand(&t)))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Figure tokens of a text
pub fn figures(text: &str) -> BTreeSet<String> {
    tokenize(text).into_iter().filter(|t| is_figure(t)).collect()
}

/// Identity of what a text asserts about `subject`: the subject's terms plus
/// every other content term of the text, figures and qualifiers alike.
/// Restating the subject inside the text does not change the identity.
pub fn fingerprint(subject: &str, text: &str) -> String {
    let subject_terms = terms(subject);
    let content: Vec<String> = terms(text)
        .into_iter()
        .filter(|t| !subject_terms.contains(t))
        .collect();
    format!("{}={}", subject_terms.join(" "), content.join(" "))
}

/// snake_case key from free text, capped at `max_words`
pub fn slugify(text: &str, max_words: usize) -> String {
    terms(text)
        .into_iter()
        .filter(|t| !is_figure(t))
        .take(max_words)
        .collect::<Vec<_>>()
        .join("_")
}

/// Human label for a canonical key: "liquidation_preference" -> "liquidation preference"
pub fn labelize(key: &str) -> String {
    let base = key.split('#').next().unwrap_or(key);
    base.split(|c: char| c == '_' || c == '-')
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_keeps_figures() {
        assert_eq!(tokenize("The cap is $10M."), vec!["the", "cap", "is", "$10m"]);
        assert_eq!(tokenize("a 1.5x pref, 20% discount"), vec!["a", "1.5x", "pref", "20%", "discount"]);
        assert_eq!(tokenize("what's the cap?"), vec!["what", "s", "the", "cap"]);
    }

    #[test]
    fn test_terms_filter_and_expand() {
        assert_eq!(terms("what's the cap?"), vec!["cap"]);
        assert_eq!(terms("What is the liq pref?"), vec!["liquidation", "preference"]);
        assert_eq!(terms("what are the fees"), vec!["fee"]);
        assert!(terms("hi there, thanks!").is_empty());
    }

    #[test]
    fn test_stem() {
        assert_eq!(stem("fees"), "fee");
        assert_eq!(stem("liabilities"), "liability");
        assert_eq!(stem("class"), "class");
        assert_eq!(stem("bonus"), "bonus");
        assert_eq!(stem("10ms"), "10ms");
    }

    #[test]
    fn test_fingerprint() {
        assert_eq!(
            fingerprint("valuation cap", "$10M"),
            fingerprint("valuation cap", "The valuation cap is $10M.")
        );
        assert_ne!(
            fingerprint("liquidation preference", "1x non-participating"),
            fingerprint("liquidation preference", "1.5x non-participating")
        );
        assert_eq!(fingerprint("wire instructions", "Wire  instructions follow."), "wire instruction=follow");
    }

    #[test]
    fn test_fingerprint_keeps_qualifiers_next_to_shared_figures() {
        assert_ne!(
            fingerprint("liquidation preference", "1x non-participating"),
            fingerprint("liquidation preference", "1x participating")
        );
        assert_ne!(fingerprint("management fee", "2%"), fingerprint("setup fee", "2%"));
    }

    #[test]
    fn test_slugify_and_labelize() {
        assert_eq!(slugify("What is the minimum ticket size?", 6), "minimum_ticket_size");
        assert_eq!(labelize("valuation_cap"), "valuation cap");
        assert_eq!(labelize("pitch-deck#p4"), "pitch deck");
    }
}
