//! Grounding Policy - Validated decision thresholds
//!
//! Built once at startup from [`PolicyConfig`]. Invalid values are rejected,
//! never clamped, so a running engine always holds a coherent policy.

use crate::config::PolicyConfig;
use crate::errors::{AppError, Result};
use crate::grounding::KnowledgeUnit;
use crate::retrieval::{LexicalScorer, Scorer};
use crate::text;
use regex_lite::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Hex characters of the policy hash appended to the configured version
const FINGERPRINT_LEN: usize = 12;

#[derive(Debug, Clone)]
pub struct GroundingPolicy {
    config: PolicyConfig,
    escalation: Option<Regex>,
    vocabulary: BTreeSet<String>,
    social: SocialLexicon,
    version: String,
}

/// Normalized word lists behind greeting detection
#[derive(Debug, Clone, Default)]
struct SocialLexicon {
    patterns: BTreeSet<String>,
    starters: BTreeSet<String>,
    filler: BTreeSet<String>,
    business: Vec<String>,
}

#[derive(Serialize)]
struct Fingerprinted<'a> {
    policy: &'a PolicyConfig,
    scorer: &'a str,
}

impl TryFrom<&PolicyConfig> for GroundingPolicy {
    type Error = AppError;

    fn try_from(config: &PolicyConfig) -> Result<Self> {
        Self::new(config.clone(), LexicalScorer::default().name())
    }
}

impl GroundingPolicy {
    /// Validate `config` and fingerprint it together with the scorer in use
    pub fn new(config: PolicyConfig, scorer_name: &str) -> Result<Self> {
        validate(&config)?;

        let escalation = escalation_pattern(&config.escalation_keywords)?;
        let vocabulary = config
            .term_vocabulary
            .iter()
            .flat_map(|entry| text::terms(entry))
            .collect();
        let social = SocialLexicon {
            patterns: config.greeting_patterns.iter().map(|p| normalize_message(p)).collect(),
            starters: config.greeting_starters.iter().map(|w| normalize_message(w)).collect(),
            filler: config.social_filler_words.iter().map(|w| normalize_message(w)).collect(),
            business: config.business_keywords.iter().map(|k| normalize_message(k)).collect(),
        };
        let version = fingerprint(&config, scorer_name)?;

        Ok(Self {
            config,
            escalation,
            vocabulary,
            social,
            version,
        })
    }

    /// Same thresholds, re-fingerprinted for a different scorer
    pub fn for_scorer(&self, scorer_name: &str) -> Result<Self> {
        Self::new(self.config.clone(), scorer_name)
    }

    pub fn answer_threshold(&self) -> f32 {
        self.config.answer_threshold
    }

    pub fn ambiguity_margin(&self) -> f32 {
        self.config.ambiguity_margin
    }

    pub fn top_k(&self) -> usize {
        self.config.top_k
    }

    pub fn min_retrieval_floor(&self) -> f32 {
        self.config.min_retrieval_floor
    }

    /// Recorded on every audit row, e.g. "grounding-v1+3fa2c81d09be"
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// First escalation keyword found in `question`, lowercased
    pub fn escalation_match(&self, question: &str) -> Option<String> {
        self.escalation
            .as_ref()?
            .find(question)
            .map(|m| m.as_str().to_lowercase())
    }

    /// True when `question` is small talk with no business intent:
    /// a known greeting, or a greeting-led message that is all filler, or a
    /// short one naming no business keyword.
    pub fn is_social(&self, question: &str) -> bool {
        let message = normalize_message(question);
        if message.is_empty() {
            return false;
        }
        if self.social.patterns.contains(&message) {
            return true;
        }

        let words: Vec<&str> = message.split(' ').collect();
        if !self.social.starters.contains(words[0]) {
            return false;
        }

        let remaining: Vec<&str> = words
            .iter()
            .copied()
            .filter(|w| !self.social.filler.contains(*w))
            .collect();
        if remaining.is_empty() {
            return true;
        }

        let padded = format!(" {} ", message);
        let business = self
            .social
            .business
            .iter()
            .any(|k| padded.contains(&format!(" {} ", k)));
        !business && words.len() <= self.config.greeting_max_words
    }

    /// Deal-term vocabulary named by the question that no unit in the
    /// snapshot mentions anywhere
    pub fn missing_subfacts(&self, question: &str, snapshot: &[KnowledgeUnit]) -> Vec<String> {
        let wanted: Vec<String> = text::terms(question)
            .into_iter()
            .filter(|t| self.vocabulary.contains(t))
            .collect();
        if wanted.is_empty() {
            return wanted;
        }

        let known: BTreeSet<String> = snapshot
            .iter()
            .filter(|u| u.approved)
            .flat_map(|u| {
                let mut fields = vec![text::labelize(&u.key), u.text.clone()];
                fields.extend(u.title.iter().cloned());
                fields.extend(u.aliases.iter().cloned());
                fields
            })
            .flat_map(|field| text::terms(&field))
            .collect();

        wanted.into_iter().filter(|t| !known.contains(t)).collect()
    }
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::PolicyConfig {
        message: message.into(),
    }
}

fn validate(config: &PolicyConfig) -> Result<()> {
    // Negated comparisons also reject NaN
    if !(config.answer_threshold > 0.0 && config.answer_threshold < 1.0) {
        return Err(invalid(format!(
            "answer_threshold must be in (0, 1), got {}",
            config.answer_threshold
        )));
    }
    if !(config.ambiguity_margin >= 0.0 && config.ambiguity_margin < 1.0) {
        return Err(invalid(format!(
            "ambiguity_margin must be in [0, 1), got {}",
            config.ambiguity_margin
        )));
    }
    if config.top_k == 0 {
        return Err(invalid("top_k must be greater than 0"));
    }
    if !(config.min_retrieval_floor >= 0.0 && config.min_retrieval_floor < 1.0) {
        return Err(invalid(format!(
            "min_retrieval_floor must be in [0, 1), got {}",
            config.min_retrieval_floor
        )));
    }
    if config.min_retrieval_floor >= config.answer_threshold {
        return Err(invalid(format!(
            "min_retrieval_floor ({}) must be below answer_threshold ({})",
            config.min_retrieval_floor, config.answer_threshold
        )));
    }
    if config.escalation_keywords.iter().any(|k| k.trim().is_empty()) {
        return Err(invalid("escalation_keywords must not contain blank entries"));
    }
    if config.term_vocabulary.iter().any(|t| t.trim().is_empty()) {
        return Err(invalid("term_vocabulary must not contain blank entries"));
    }
    for (field, entries) in [
        ("greeting_patterns", &config.greeting_patterns),
        ("greeting_starters", &config.greeting_starters),
        ("social_filler_words", &config.social_filler_words),
        ("business_keywords", &config.business_keywords),
    ] {
        if entries.iter().any(|e| normalize_message(e).is_empty()) {
            return Err(invalid(format!("{} must not contain blank entries", field)));
        }
    }
    if config.policy_version.trim().is_empty() {
        return Err(invalid("policy_version must not be blank"));
    }
    Ok(())
}

/// Lowercase, apostrophes dropped ("what's" -> "whats"), every other
/// non-alphanumeric run collapsed to one space
fn normalize_message(text: &str) -> String {
    text.to_lowercase()
        .replace(['\'', '\u{2019}'], "")
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `(?i)\b(?:kw1|multi\s+word)\b`, or `None` when no keywords are configured
fn escalation_pattern(keywords: &[String]) -> Result<Option<Regex>> {
    if keywords.is_empty() {
        return Ok(None);
    }

    let alternatives: Vec<String> = keywords
        .iter()
        .map(|k| {
            k.split_whitespace()
                .map(regex_lite::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        })
        .collect();
    let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));

    Regex::new(&pattern)
        .map(Some)
        .map_err(|e| invalid(format!("escalation_keywords do not form a valid pattern: {}", e)))
}

fn fingerprint(config: &PolicyConfig, scorer_name: &str) -> Result<String> {
    let canonical = serde_json::to_vec(&Fingerprinted {
        policy: config,
        scorer: scorer_name,
    })?;
    let digest = hex::encode(Sha256::digest(&canonical));
    Ok(format!(
        "{}+{}",
        config.policy_version.trim(),
        &digest[..FINGERPRINT_LEN]
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grounding::SourceType;
    use chrono::Utc;

    fn policy() -> GroundingPolicy {
        GroundingPolicy::try_from(&PolicyConfig::default()).unwrap()
    }

    fn unit(key: &str, text: &str) -> KnowledgeUnit {
        KnowledgeUnit {
            source_type: SourceType::Term,
            source_id: format!("term:{}", key),
            deal_id: None,
            key: key.to_string(),
            title: None,
            text: text.to_string(),
            aliases: vec![],
            verified_at: Utc::now(),
            approved: true,
        }
    }

    #[test]
    fn test_default_policy_is_valid() {
        let policy = policy();
        assert_eq!(policy.answer_threshold(), 0.75);
        assert_eq!(policy.top_k(), 5);
        assert!(policy.version().starts_with("grounding-v1+"));
        assert_eq!(policy.version().len(), "grounding-v1+".len() + FINGERPRINT_LEN);
    }

    #[test]
    fn test_invalid_values_fail_fast() {
        let cases: Vec<Box<dyn Fn(&mut PolicyConfig)>> = vec![
            Box::new(|c: &mut PolicyConfig| c.answer_threshold = 0.0),
            Box::new(|c: &mut PolicyConfig| c.answer_threshold = 1.0),
            Box::new(|c: &mut PolicyConfig| c.answer_threshold = f32::NAN),
            Box::new(|c: &mut PolicyConfig| c.ambiguity_margin = -0.1),
            Box::new(|c: &mut PolicyConfig| c.ambiguity_margin = 1.0),
            Box::new(|c: &mut PolicyConfig| c.top_k = 0),
            Box::new(|c: &mut PolicyConfig| c.min_retrieval_floor = 0.8),
            Box::new(|c: &mut PolicyConfig| c.escalation_keywords.push("  ".into())),
            Box::new(|c: &mut PolicyConfig| c.term_vocabulary.push(String::new())),
            Box::new(|c: &mut PolicyConfig| c.policy_version = " ".into()),
            Box::new(|c: &mut PolicyConfig| c.business_keywords.push("?!".into())),
            Box::new(|c: &mut PolicyConfig| c.greeting_starters.push(" ".into())),
        ];

        for mutate in cases {
            let mut config = PolicyConfig::default();
            mutate(&mut config);
            let err = GroundingPolicy::try_from(&config).unwrap_err();
            assert!(matches!(err, AppError::PolicyConfig { .. }), "{:?}", config);
        }
    }

    #[test]
    fn test_version_tracks_policy_and_scorer() {
        let base = policy();
        let mut config = PolicyConfig::default();
        config.answer_threshold = 0.8;
        let stricter = GroundingPolicy::try_from(&config).unwrap();

        assert_ne!(base.version(), stricter.version());
        assert_eq!(base.version(), policy().version());
        assert_ne!(base.version(), base.for_scorer("semantic").unwrap().version());
    }

    #[test]
    fn test_escalation_match_uses_word_boundaries() {
        let policy = policy();
        assert_eq!(
            policy.escalation_match("Is there any pending LITIGATION?"),
            Some("litigation".to_string())
        );
        assert_eq!(
            policy.escalation_match("We may take legal   action."),
            Some("legal   action".to_string())
        );
        assert_eq!(policy.escalation_match("What is the second close date?"), None);
        assert_eq!(policy.escalation_match("Will the SEC filing be shared?"), Some("sec".to_string()));
    }

    #[test]
    fn test_no_keywords_never_escalates() {
        let config = PolicyConfig {
            escalation_keywords: vec![],
            ..PolicyConfig::default()
        };
        let policy = GroundingPolicy::try_from(&config).unwrap();
        assert_eq!(policy.escalation_match("litigation"), None);
    }

    #[test]
    fn test_missing_subfacts() {
        let policy = policy();
        let snapshot = vec![unit("valuation_cap", "$10M")];

        assert!(policy.missing_subfacts("what's the cap?", &snapshot).is_empty());
        assert_eq!(
            policy.missing_subfacts("What is the cap and the discount?", &snapshot),
            vec!["discount"]
        );
        assert_eq!(policy.missing_subfacts("what is your runway", &snapshot), vec!["runway"]);
        assert!(policy.missing_subfacts("when do we close", &snapshot).is_empty());
    }

    #[test]
    fn test_social_messages_are_detected() {
        let policy = policy();
        for message in [
            "Thanks so much!",
            "Hello",
            "Hi there",
            "Hello Bot, How are you?",
            "Good morning team!",
            "what's up",
            "ok, got it",
        ] {
            assert!(policy.is_social(message), "{}", message);
        }
    }

    #[test]
    fn test_business_questions_are_not_social() {
        let policy = policy();
        for message in [
            "Hi, what is the fee?",
            "Thanks! How much is the minimum ticket?",
            "what's the cap?",
            "Hey, could you send the wire details",
            "Hello, I wanted to follow up on the thing we spoke about last week",
            "",
        ] {
            assert!(!policy.is_social(message), "{}", message);
        }
    }

    #[test]
    fn test_social_lists_are_configurable() {
        let config = PolicyConfig {
            greeting_patterns: vec![],
            greeting_starters: vec![],
            ..PolicyConfig::default()
        };
        let custom = GroundingPolicy::try_from(&config).unwrap();
        assert!(!custom.is_social("Thanks so much!"));
        assert_ne!(custom.version(), policy().version());
    }
}
