//! Retrieval over a deal's knowledge snapshot
//!
//! Scoring is pluggable through [`Scorer`]; ranking, the score floor, and the
//! tie-break order live in [`Retriever`] and are the same for every scorer:
//! - score, descending
//! - source priority (dynamic fact > term > faq > document)
//! - last verified, newest first
//! - source id, ascending (total order, so output is reproducible)

mod lexical;

pub use lexical::LexicalScorer;

use crate::grounding::KnowledgeUnit;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Candidate unit with its relevance score in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredUnit {
    pub unit: KnowledgeUnit,
    pub score: f32,
}

/// Relevance function between a question and one unit
pub trait Scorer: Send + Sync {
    /// Score in [0, 1]; must be a pure function of its inputs
    fn score(&self, question: &str, unit: &KnowledgeUnit) -> f32;

    /// Identifier recorded in the policy fingerprint
    fn name(&self) -> &'static str;
}

/// Ranks units for a question
#[derive(Clone)]
pub struct Retriever {
    scorer: Arc<dyn Scorer>,
    min_floor: f32,
}

impl Retriever {
    pub fn new(scorer: Arc<dyn Scorer>, min_floor: f32) -> Self {
        Self { scorer, min_floor }
    }

    /// Retriever using the default lexical scorer
    pub fn lexical(min_floor: f32) -> Self {
        Self::new(Arc::new(LexicalScorer::default()), min_floor)
    }

    pub fn scorer_name(&self) -> &'static str {
        self.scorer.name()
    }

    /// At most `top_k` approved units scoring above the floor, best first.
    /// An empty result is a valid answer, not an error.
    pub fn retrieve(&self, question: &str, units: &[KnowledgeUnit], top_k: usize) -> Vec<ScoredUnit> {
        let mut candidates: Vec<ScoredUnit> = units
            .iter()
            .filter(|u| u.approved)
            .map(|u| ScoredUnit {
                unit: u.clone(),
                score: sanitize(self.scorer.score(question, u)),
            })
            .filter(|c| c.score > self.min_floor)
            .collect();

        candidates.sort_by(rank_order);
        candidates.truncate(top_k);

        debug!(
            scorer = self.scorer.name(),
            considered = units.len(),
            returned = candidates.len(),
            top_score = candidates.first().map(|c| c.score),
            "Retrieval complete"
        );

        candidates
    }
}

/// Total order used for ranking candidates
pub fn rank_order(a: &ScoredUnit, b: &ScoredUnit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.unit.source_type.priority().cmp(&a.unit.source_type.priority()))
        .then_with(|| b.unit.verified_at.cmp(&a.unit.verified_at))
        .then_with(|| a.unit.source_id.cmp(&b.unit.source_id))
}

fn sanitize(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}
