//! Grounding Decision - Answer, clarify, or escalate
//!
//! Pure state machine from ranked candidates to one terminal decision:
//! 1. Top score clears the answer threshold, the top band agrees, and every
//!    deal term the question names is known -> ANSWERED
//! 2. Candidates exist but are weak or disagree -> CLARIFY_REQUESTED
//! 3. No candidates, or a named deal term is unknown -> CLARIFY_REQUESTED
//!
//! Small talk with no business intent skips retrieval results entirely and
//! is acknowledged as CLARIFY_REQUESTED.
//!
//! An escalation keyword turns 2 and 3 into ESCALATED. It never overrides 1.

use crate::grounding::{GroundingPolicy, KnowledgeUnit};
use crate::retrieval::{rank_order, ScoredUnit};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

const HIGH_CONFIDENCE: f32 = 0.85;
const MEDIUM_CONFIDENCE: f32 = 0.70;

/// Slack for f32 subtraction at the band edge; a score at exactly
/// `top - margin` is inside the band.
const BAND_EPSILON: f32 = 1e-6;

/// Terminal states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionKind {
    Answered,
    ClarifyRequested,
    Escalated,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::Answered => "answered",
            DecisionKind::ClarifyRequested => "clarify_requested",
            DecisionKind::Escalated => "escalated",
        }
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn from_score(score: f32) -> Self {
        if score >= HIGH_CONFIDENCE {
            ConfidenceTier::High
        } else if score >= MEDIUM_CONFIDENCE {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }
}

/// Why a clarifying question is needed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClarifyReason {
    /// Nothing cleared the retrieval floor
    NoCandidates,
    /// Best candidate is below the answer threshold
    BelowThreshold { top_score: f32 },
    /// Top band carries conflicting content
    Ambiguous { variants: usize },
    /// The question names deal terms the knowledge base does not cover
    MissingSubFact { terms: Vec<String> },
    /// Greeting or thanks with no question in it
    SocialMessage,
}

impl fmt::Display for ClarifyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClarifyReason::NoCandidates => write!(f, "no candidate cleared the retrieval floor"),
            ClarifyReason::BelowThreshold { top_score } => {
                write!(f, "top score {:.2} is below the answer threshold", top_score)
            }
            ClarifyReason::Ambiguous { variants } => {
                write!(f, "{} conflicting answers in the top band", variants)
            }
            ClarifyReason::MissingSubFact { terms } => {
                write!(f, "no approved knowledge for: {}", terms.join(", "))
            }
            ClarifyReason::SocialMessage => write!(f, "message carries no business question"),
        }
    }
}

/// Outcome of the grounding gate, carrying its evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// Agreeing top-band candidates; the only content a draft may state
    Answered { evidence: Vec<ScoredUnit> },

    ClarifyRequested {
        candidates: Vec<ScoredUnit>,
        reason: ClarifyReason,
    },

    /// Routed to a human; no draft is produced
    Escalated {
        candidates: Vec<ScoredUnit>,
        keyword: String,
        reason: ClarifyReason,
    },
}

impl Decision {
    pub fn kind(&self) -> DecisionKind {
        match self {
            Decision::Answered { .. } => DecisionKind::Answered,
            Decision::ClarifyRequested { .. } => DecisionKind::ClarifyRequested,
            Decision::Escalated { .. } => DecisionKind::Escalated,
        }
    }

    /// Units the decision rests on
    pub fn evidence(&self) -> &[ScoredUnit] {
        match self {
            Decision::Answered { evidence } => evidence,
            Decision::ClarifyRequested { candidates, .. } => candidates,
            Decision::Escalated { candidates, .. } => candidates,
        }
    }

    pub fn top_score(&self) -> Option<f32> {
        self.evidence().iter().map(|c| c.score).reduce(f32::max)
    }

    pub fn confidence_tier(&self) -> ConfidenceTier {
        self.top_score()
            .map(ConfidenceTier::from_score)
            .unwrap_or(ConfidenceTier::Low)
    }
}

/// Decide for one question. `candidates` are the retrieval output and
/// `snapshot` the full unit set they were drawn from.
pub fn decide(
    question: &str,
    candidates: &[ScoredUnit],
    snapshot: &[KnowledgeUnit],
    policy: &GroundingPolicy,
) -> Decision {
    if policy.is_social(question) {
        return unresolved(question, Vec::new(), ClarifyReason::SocialMessage, policy);
    }

    let mut ranked = candidates.to_vec();
    ranked.sort_by(rank_order);

    let missing = policy.missing_subfacts(question, snapshot);

    let Some(top) = ranked.first().map(|c| c.score) else {
        return unresolved(question, ranked, ClarifyReason::NoCandidates, policy);
    };

    let band: Vec<ScoredUnit> = ranked
        .iter()
        .filter(|c| c.score + BAND_EPSILON >= top - policy.ambiguity_margin())
        .cloned()
        .collect();
    let variants: BTreeSet<String> = band.iter().map(|c| c.unit.fingerprint()).collect();
    let ambiguous = variants.len() > 1;

    if top >= policy.answer_threshold() && !ambiguous && missing.is_empty() {
        return Decision::Answered { evidence: band };
    }

    if !missing.is_empty() {
        return unresolved(question, ranked, ClarifyReason::MissingSubFact { terms: missing }, policy);
    }

    if ambiguous {
        let reason = ClarifyReason::Ambiguous {
            variants: variants.len(),
        };
        return unresolved(question, band, reason, policy);
    }

    unresolved(question, ranked, ClarifyReason::BelowThreshold { top_score: top }, policy)
}

/// Clarify by default, escalate when the question carries an escalation keyword
fn unresolved(
    question: &str,
    candidates: Vec<ScoredUnit>,
    reason: ClarifyReason,
    policy: &GroundingPolicy,
) -> Decision {
    match policy.escalation_match(question) {
        Some(keyword) => Decision::Escalated {
            candidates,
            keyword,
            reason,
        },
        None => Decision::ClarifyRequested { candidates, reason },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyConfig;
    use crate::grounding::SourceType;
    use chrono::Utc;

    fn policy() -> GroundingPolicy {
        GroundingPolicy::try_from(&PolicyConfig::default()).unwrap()
    }

    fn unit(id: &str, key: &str, text: &str) -> KnowledgeUnit {
        KnowledgeUnit {
            source_type: SourceType::Term,
            source_id: id.to_string(),
            deal_id: None,
            key: key.to_string(),
            title: None,
            text: text.to_string(),
            aliases: vec![],
            verified_at: Utc::now(),
            approved: true,
        }
    }

    fn scored(unit: &KnowledgeUnit, score: f32) -> ScoredUnit {
        ScoredUnit {
            unit: unit.clone(),
            score,
        }
    }

    #[test]
    fn test_clear_match_is_answered() {
        let cap = unit("term:1", "valuation_cap", "$10M");
        let decision = decide("what's the cap?", &[scored(&cap, 0.9)], &[cap.clone()], &policy());

        assert_eq!(decision.kind(), DecisionKind::Answered);
        assert_eq!(decision.evidence().len(), 1);
        assert_eq!(decision.confidence_tier(), ConfidenceTier::High);
    }

    #[test]
    fn test_conflicting_top_band_asks_for_clarification() {
        let a = unit("term:1", "liquidation_preference", "1x");
        let b = unit("term:2", "liquidation_preference", "1.5x");
        let decision = decide(
            "What is the liquidation preference?",
            &[scored(&a, 0.8), scored(&b, 0.8)],
            &[a.clone(), b.clone()],
            &policy(),
        );

        match decision {
            Decision::ClarifyRequested { candidates, reason } => {
                assert_eq!(candidates.len(), 2);
                assert_eq!(reason, ClarifyReason::Ambiguous { variants: 2 });
            }
            other => panic!("expected clarification, got {:?}", other),
        }
    }

    #[test]
    fn test_agreeing_top_band_is_answered_with_all_agreeing_units() {
        let term = unit("term:1", "valuation_cap", "$10M");
        let mut faq = unit("faq:3", "valuation_cap", "The valuation cap is $10M.");
        faq.source_type = SourceType::Faq;
        let decision = decide(
            "what is the valuation cap",
            &[scored(&term, 0.95), scored(&faq, 0.93)],
            &[term.clone(), faq.clone()],
            &policy(),
        );

        assert_eq!(decision.kind(), DecisionKind::Answered);
        assert_eq!(decision.evidence().len(), 2);
    }

    #[test]
    fn test_shared_figure_with_different_qualifier_is_ambiguous() {
        let a = unit("term:1", "liquidation_preference", "1x non-participating");
        let b = unit("term:2", "liquidation_preference", "1x participating");
        let decision = decide(
            "What is the liquidation preference?",
            &[scored(&a, 1.0), scored(&b, 1.0)],
            &[a.clone(), b.clone()],
            &policy(),
        );

        assert_eq!(decision.kind(), DecisionKind::ClarifyRequested);
        assert!(matches!(
            decision,
            Decision::ClarifyRequested { reason: ClarifyReason::Ambiguous { variants: 2 }, .. }
        ));
    }

    #[test]
    fn test_same_figure_under_different_keys_is_ambiguous() {
        let management = unit("term:1", "management_fee", "2%");
        let setup = unit("term:2", "setup_fee", "2%");
        let decision = decide(
            "What is the fee?",
            &[scored(&management, 0.9), scored(&setup, 0.9)],
            &[management.clone(), setup.clone()],
            &policy(),
        );

        assert_eq!(decision.kind(), DecisionKind::ClarifyRequested);
        assert_eq!(decision.evidence().len(), 2);
    }

    #[test]
    fn test_candidate_just_outside_margin_does_not_block_answer() {
        let a = unit("term:1", "liquidation_preference", "1x");
        let b = unit("term:2", "liquidation_preference", "1.5x");
        let decision = decide(
            "What is the liquidation preference?",
            &[scored(&a, 0.80), scored(&b, 0.74)],
            &[a.clone(), b.clone()],
            &policy(),
        );

        match decision {
            Decision::Answered { evidence } => {
                assert_eq!(evidence.len(), 1);
                assert_eq!(evidence[0].unit.source_id, "term:1");
            }
            other => panic!("expected answer, got {:?}", other),
        }
    }

    #[test]
    fn test_candidate_exactly_at_margin_edge_is_in_band() {
        let a = unit("term:1", "liquidation_preference", "1x");
        let b = unit("term:2", "liquidation_preference", "1.5x");
        for (top, edge) in [(0.80, 0.75), (0.90, 0.85), (0.95, 0.90)] {
            let decision = decide(
                "What is the liquidation preference?",
                &[scored(&a, top), scored(&b, edge)],
                &[a.clone(), b.clone()],
                &policy(),
            );
            assert_eq!(decision.kind(), DecisionKind::ClarifyRequested, "top {} edge {}", top, edge);
            assert_eq!(decision.evidence().len(), 2);
        }
    }

    #[test]
    fn test_social_message_is_acknowledged_without_candidates() {
        let cap = unit("term:1", "valuation_cap", "$10M");
        let decision = decide("Thanks so much!", &[scored(&cap, 0.2)], &[cap.clone()], &policy());

        match decision {
            Decision::ClarifyRequested { candidates, reason } => {
                assert!(candidates.is_empty());
                assert_eq!(reason, ClarifyReason::SocialMessage);
            }
            other => panic!("expected acknowledgement, got {:?}", other),
        }

        let greeted = decide("Hi, what's the cap?", &[scored(&cap, 0.9)], &[cap.clone()], &policy());
        assert_eq!(greeted.kind(), DecisionKind::Answered);
    }

    #[test]
    fn test_below_threshold_never_answers() {
        let cap = unit("term:1", "valuation_cap", "$10M");
        for score in [0.16, 0.5, 0.74] {
            let decision = decide("cap?", &[scored(&cap, score)], &[cap.clone()], &policy());
            assert_eq!(decision.kind(), DecisionKind::ClarifyRequested);
            assert_eq!(decision.confidence_tier(), if score >= 0.7 { ConfidenceTier::Medium } else { ConfidenceTier::Low });
        }
    }

    #[test]
    fn test_no_candidates_clarifies_with_empty_evidence() {
        let cap = unit("term:1", "valuation_cap", "$10M");
        let decision = decide("what is your runway", &[], &[cap], &policy());

        assert_eq!(decision.kind(), DecisionKind::ClarifyRequested);
        assert!(decision.evidence().is_empty());
    }

    #[test]
    fn test_escalation_keyword_without_candidates() {
        let decision = decide("Is there any pending litigation?", &[], &[], &policy());
        match decision {
            Decision::Escalated { keyword, candidates, .. } => {
                assert_eq!(keyword, "litigation");
                assert!(candidates.is_empty());
            }
            other => panic!("expected escalation, got {:?}", other),
        }
    }

    #[test]
    fn test_escalation_outranks_clarification_but_not_answers() {
        let a = unit("term:1", "liquidation_preference", "1x");
        let b = unit("term:2", "liquidation_preference", "1.5x");
        let ambiguous = decide(
            "We will sue unless you confirm the liquidation preference",
            &[scored(&a, 0.8), scored(&b, 0.8)],
            &[a.clone(), b.clone()],
            &policy(),
        );
        assert_eq!(ambiguous.kind(), DecisionKind::Escalated);

        let answered = decide(
            "What is the liquidation preference? Asking before our complaint goes out.",
            &[scored(&a, 0.9)],
            &[a.clone()],
            &policy(),
        );
        assert_eq!(answered.kind(), DecisionKind::Answered);
    }

    #[test]
    fn test_missing_sub_fact_blocks_answer() {
        let cap = unit("term:1", "valuation_cap", "$10M");
        let decision = decide(
            "What is the cap and the discount?",
            &[scored(&cap, 0.9)],
            &[cap.clone()],
            &policy(),
        );

        match decision {
            Decision::ClarifyRequested { reason, .. } => {
                assert_eq!(reason, ClarifyReason::MissingSubFact { terms: vec!["discount".into()] });
            }
            other => panic!("expected clarification, got {:?}", other),
        }
    }

    #[test]
    fn test_decision_is_deterministic_regardless_of_input_order() {
        let a = unit("term:1", "liquidation_preference", "1x");
        let b = unit("term:2", "liquidation_preference", "1.5x");
        let c = unit("term:3", "valuation_cap", "$10M");
        let snapshot = vec![a.clone(), b.clone(), c.clone()];
        let forward = vec![scored(&a, 0.8), scored(&b, 0.78), scored(&c, 0.3)];
        let mut backward = forward.clone();
        backward.reverse();

        let first = decide("liquidation preference", &forward, &snapshot, &policy());
        assert_eq!(first, decide("liquidation preference", &backward, &snapshot, &policy()));
    }

    #[test]
    fn test_decision_serializes_with_tag() {
        let decision = Decision::ClarifyRequested {
            candidates: vec![],
            reason: ClarifyReason::NoCandidates,
        };
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["decision"], "CLARIFY_REQUESTED");
        assert_eq!(json["reason"]["kind"], "no_candidates");
    }
}
