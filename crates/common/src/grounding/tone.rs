//! Tone Renderer - Founder-voice drafts from a decision
//!
//! Provides:
//! - Fixed templates filled strictly from evidence
//! - Tone rule resolution (deal over global, conflicts surfaced)
//! - Forbidden-phrase rewriting over template prose only
//! - Output validation: every figure in a draft must come from evidence

use crate::errors::{AppError, Result};
use crate::grounding::{ClarifyReason, Decision, SourceType};
use crate::models::{DealId, ToneDirective, ToneRule, ToneScope};
use crate::retrieval::ScoredUnit;
use crate::text;
use regex_lite::{NoExpand, Regex};
use std::collections::BTreeSet;
use tracing::debug;

/// Internal routing notice for escalated questions. Never sent to an investor.
pub const ESCALATION_NOTICE: &str =
    "[INTERNAL] Escalated to the deal team for a personal reply. No draft was generated.";

/// Reply to greetings and thanks; states nothing about the deal
pub const SOCIAL_ACKNOWLEDGEMENT: &str =
    "Thanks for reaching out. I'm here whenever you have a question.";

/// Internal notice when a draft cannot be rendered within the tone and grounding rules
pub const RENDER_FALLBACK_NOTICE: &str =
    "[INTERNAL] A compliant draft could not be produced for this question. Please reply manually.";

const DEFAULT_SALUTATION: &str = "Hi,";
const DEFAULT_SIGN_OFF: &str = "Best,";

/// Piece of a draft body. Evidence is emitted verbatim; only prose is rewritten.
#[derive(Debug, Clone)]
enum Segment {
    Prose(String),
    Evidence(String),
}

type Line = Vec<Segment>;

fn prose(s: impl Into<String>) -> Segment {
    Segment::Prose(s.into())
}

fn evidence(s: impl Into<String>) -> Segment {
    Segment::Evidence(s.into())
}

#[derive(Debug)]
struct ForbiddenPhrase {
    phrase: String,
    pattern: Regex,
    replacement: String,
}

/// Tone rules resolved for one deal
#[derive(Debug)]
struct ResolvedTone {
    salutation: String,
    sign_off: String,
    forbidden: Vec<ForbiddenPhrase>,
    disclaimers: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ToneRenderer;

impl ToneRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Render `decision` for `deal_id`. Escalations yield the internal notice;
    /// everything else becomes a draft or an error the caller degrades on.
    pub fn render(&self, decision: &Decision, rules: &[ToneRule], deal_id: DealId) -> Result<String> {
        let lines = match decision {
            Decision::Escalated { .. } => return Ok(ESCALATION_NOTICE.to_string()),
            Decision::Answered { evidence } => answer_body(evidence),
            Decision::ClarifyRequested { candidates, reason } => clarify_body(candidates, reason),
        };

        let tone = resolve(rules, deal_id)?;
        let body = apply_forbidden(&lines, &tone.forbidden)?;

        let mut sections = vec![tone.salutation.clone(), body];
        if !tone.disclaimers.is_empty() {
            sections.push(tone.disclaimers.join("\n"));
        }
        sections.push(tone.sign_off.clone());
        let draft = sections.join("\n\n");

        validate_grounding(&draft, decision.evidence())?;
        Ok(draft)
    }
}

fn answer_body(units: &[ScoredUnit]) -> Vec<Line> {
    let mut seen = BTreeSet::new();
    units
        .iter()
        .filter(|c| seen.insert(c.unit.fingerprint()))
        .map(|c| {
            let unit = &c.unit;
            match unit.source_type {
                SourceType::Term | SourceType::DynamicFact => {
                    let close = if unit.text.ends_with(&['.', '!', '?'][..]) { "" } else { "." };
                    vec![
                        prose("The "),
                        evidence(unit.label()),
                        prose(" is "),
                        evidence(unit.text.clone()),
                        prose(close),
                    ]
                }
                SourceType::Faq => vec![evidence(unit.text.clone())],
                SourceType::Document => vec![
                    prose("From "),
                    evidence(unit.label()),
                    prose(": \""),
                    evidence(unit.text.clone()),
                    prose("\""),
                ],
            }
        })
        .collect()
}

fn clarify_body(candidates: &[ScoredUnit], reason: &ClarifyReason) -> Vec<Line> {
    if let ClarifyReason::SocialMessage = reason {
        return vec![vec![prose(SOCIAL_ACKNOWLEDGEMENT)]];
    }

    if let ClarifyReason::MissingSubFact { terms } = reason {
        return vec![vec![prose(format!(
            "Thanks for your question. I want to make sure I get the {} right for you. \
             Could you share a bit more detail on what you are looking for?",
            terms.join(" and ")
        ))]];
    }

    let mut seen = BTreeSet::new();
    let labels: Vec<String> = candidates
        .iter()
        .map(|c| c.unit.label())
        .filter(|l| seen.insert(l.to_lowercase()))
        .collect();

    match (labels.as_slice(), reason) {
        ([], _) => vec![vec![prose(
            "Thanks for your question. Could you share a bit more detail on what you are \
             looking for, so I can point you to the right information?",
        )]],
        ([only], ClarifyReason::Ambiguous { .. }) => vec![vec![
            prose("Thanks for your question. We have more than one figure on record for the "),
            evidence(only.clone()),
            prose(". Could you tell me which share class or document you are referring to?"),
        ]],
        ([only], _) => vec![vec![
            prose("Thanks for your question. Just to confirm, are you asking about the "),
            evidence(only.clone()),
            prose("?"),
        ]],
        (many, _) => {
            let mut line = vec![prose("Thanks for your question. Could you confirm which of these you mean: ")];
            for (i, label) in many.iter().enumerate() {
                if i > 0 {
                    line.push(prose(if i + 1 == many.len() { " or " } else { ", " }));
                }
                line.push(prose("the "));
                line.push(evidence(label.clone()));
            }
            line.push(prose("?"));
            vec![line]
        }
    }
}

/// Resolve singletons, forbidden phrases, and disclaimers for `deal_id`
fn resolve(rules: &[ToneRule], deal_id: DealId) -> Result<ResolvedTone> {
    let mut applicable: Vec<&ToneRule> = rules.iter().filter(|r| r.applies_to(deal_id)).collect();
    applicable.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));

    let salutation = resolve_singleton(&applicable, "salutation", |d| match d {
        ToneDirective::Salutation { text } => Some(text),
        _ => None,
    })?
    .unwrap_or_else(|| DEFAULT_SALUTATION.to_string());

    let sign_off = resolve_singleton(&applicable, "sign-off", |d| match d {
        ToneDirective::SignOff { text } => Some(text),
        _ => None,
    })?
    .unwrap_or_else(|| DEFAULT_SIGN_OFF.to_string());

    let forbidden = resolve_forbidden(&applicable)?;

    let mut seen = BTreeSet::new();
    let disclaimers: Vec<String> = applicable
        .iter()
        .filter_map(|r| match &r.directive {
            ToneDirective::Disclaimer { text } => Some(text.trim().to_string()),
            _ => None,
        })
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect();

    for fixed in [&salutation, &sign_off].into_iter().chain(disclaimers.iter()) {
        if let Some(f) = forbidden.iter().find(|f| f.pattern.is_match(fixed)) {
            return Err(AppError::ToneConflict {
                message: format!("\"{}\" is forbidden but required by \"{}\"", f.phrase, fixed),
            });
        }
    }

    debug!(
        deal_id = %deal_id,
        rules = applicable.len(),
        forbidden = forbidden.len(),
        disclaimers = disclaimers.len(),
        "Tone rules resolved"
    );

    Ok(ResolvedTone {
        salutation,
        sign_off,
        forbidden,
        disclaimers,
    })
}

/// Deal-scoped value if any, else global. Two different values at the same
/// scope contradict each other whatever their priority.
fn resolve_singleton<F>(rules: &[&ToneRule], name: &str, pick: F) -> Result<Option<String>>
where
    F: Fn(&ToneDirective) -> Option<&String>,
{
    let at_scope = |deal_scoped: bool| -> BTreeSet<String> {
        rules
            .iter()
            .filter(|r| matches!(r.scope, ToneScope::Deal(_)) == deal_scoped)
            .filter_map(|r| pick(&r.directive))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    };

    for deal_scoped in [true, false] {
        let values = at_scope(deal_scoped);
        if values.len() > 1 {
            let scope = if deal_scoped { "deal" } else { "global" };
            debug!(rule = name, scope, "Conflicting tone rules");
            return Err(AppError::ToneConflict {
                message: format!(
                    "{} {} {} rules disagree: {}",
                    values.len(),
                    scope,
                    name,
                    values.into_iter().collect::<Vec<_>>().join(" / ")
                ),
            });
        }
        if let Some(value) = values.into_iter().next() {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

fn resolve_forbidden(rules: &[&ToneRule]) -> Result<Vec<ForbiddenPhrase>> {
    let mut resolved: Vec<(ForbiddenPhrase, bool)> = Vec::new();

    for rule in rules {
        let ToneDirective::ForbiddenPhrase { phrase, replacement } = &rule.directive else {
            continue;
        };
        let phrase = phrase.trim();
        if phrase.is_empty() {
            continue;
        }
        let replacement = replacement.as_deref().unwrap_or("").trim().to_string();
        let deal_scoped = matches!(rule.scope, ToneScope::Deal(_));

        if let Some((existing, existing_deal)) = resolved
            .iter_mut()
            .find(|(f, _)| f.phrase.eq_ignore_ascii_case(phrase))
        {
            if existing.replacement == replacement {
                continue;
            }
            if *existing_deal == deal_scoped {
                return Err(AppError::ToneConflict {
                    message: format!(
                        "\"{}\" has two replacements: \"{}\" and \"{}\"",
                        phrase, existing.replacement, replacement
                    ),
                });
            }
            if deal_scoped {
                existing.replacement = replacement;
                *existing_deal = true;
            }
            continue;
        }

        resolved.push((
            ForbiddenPhrase {
                phrase: phrase.to_string(),
                pattern: phrase_pattern(phrase)?,
                replacement,
            },
            deal_scoped,
        ));
    }

    Ok(resolved.into_iter().map(|(f, _)| f).collect())
}

/// Case-insensitive, whole-word where the phrase starts or ends with a word character
fn phrase_pattern(phrase: &str) -> Result<Regex> {
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let lead = if is_word(phrase.chars().next()) { r"\b" } else { "" };
    let trail = if is_word(phrase.chars().last()) { r"\b" } else { "" };
    let pattern = format!("(?i){}{}{}", lead, regex_lite::escape(phrase), trail);
    Regex::new(&pattern).map_err(|e| AppError::ToneConflict {
        message: format!("forbidden phrase \"{}\" is not usable: {}", phrase, e),
    })
}

/// Rewrite prose segments; evidence containing a forbidden phrase is a conflict
fn apply_forbidden(lines: &[Line], forbidden: &[ForbiddenPhrase]) -> Result<String> {
    let mut rendered = Vec::with_capacity(lines.len());

    for line in lines {
        let mut out = String::new();
        for segment in line {
            match segment {
                Segment::Evidence(text) => {
                    if let Some(f) = forbidden.iter().find(|f| f.pattern.is_match(text)) {
                        return Err(AppError::ToneConflict {
                            message: format!("forbidden phrase \"{}\" appears in approved evidence", f.phrase),
                        });
                    }
                    out.push_str(text);
                }
                Segment::Prose(text) => {
                    let mut text = text.clone();
                    for f in forbidden {
                        text = f.pattern.replace_all(&text, NoExpand(&f.replacement)).into_owned();
                    }
                    out.push_str(&text);
                }
            }
        }
        rendered.push(collapse_spaces(&out));
    }

    Ok(rendered.join("\n"))
}

fn collapse_spaces(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut prev_space = false;
    for c in line.trim().chars() {
        if c == ' ' {
            if !prev_space {
                out.push(c);
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    out
}

/// Every figure in `draft` must occur in the evidence it was built from
fn validate_grounding(draft: &str, units: &[ScoredUnit]) -> Result<()> {
    let grounded: BTreeSet<String> = units
        .iter()
        .flat_map(|c| {
            let unit = &c.unit;
            let mut figures = text::figures(&unit.text);
            figures.extend(text::figures(&text::labelize(&unit.key)));
            if let Some(title) = &unit.title {
                figures.extend(text::figures(title));
            }
            figures
        })
        .collect();

    match text::figures(draft).into_iter().find(|f| !grounded.contains(f)) {
        Some(token) => Err(AppError::UngroundedContent { token }),
        None => Ok(()),
    }
}
