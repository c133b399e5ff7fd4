//! Lexical overlap scoring
//!
//! score = coverage_weight * coverage + (1 - coverage_weight) * specificity
//!
//! coverage:    mean over query terms of the best field weight the term hits
//!              (key > alias/title > text)
//! specificity: share of the unit's key terms the query names

use super::Scorer;
use crate::grounding::KnowledgeUnit;
use crate::text;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct LexicalScorer {
    pub key_weight: f32,
    pub alias_weight: f32,
    pub text_weight: f32,
    pub coverage_weight: f32,
}

impl Default for LexicalScorer {
    fn default() -> Self {
        Self {
            key_weight: 1.0,
            alias_weight: 0.9,
            text_weight: 0.6,
            coverage_weight: 0.8,
        }
    }
}

fn term_set<'a>(texts: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    texts.into_iter().flat_map(text::terms).collect()
}

impl Scorer for LexicalScorer {
    fn score(&self, question: &str, unit: &KnowledgeUnit) -> f32 {
        let query = text::terms(question);
        if query.is_empty() {
            return 0.0;
        }

        let key_label = text::labelize(&unit.key);
        let key_terms = term_set([key_label.as_str()]);
        let alias_terms = term_set(
            unit.aliases
                .iter()
                .map(String::as_str)
                .chain(unit.title.as_deref()),
        );
        let text_terms = term_set([unit.text.as_str()]);

        let hits: f32 = query
            .iter()
            .map(|term| {
                if key_terms.contains(term) {
                    self.key_weight
                } else if alias_terms.contains(term) {
                    self.alias_weight
                } else if text_terms.contains(term) {
                    self.text_weight
                } else {
                    0.0
                }
            })
            .sum();
        let coverage = hits / query.len() as f32;

        let specificity = if key_terms.is_empty() {
            0.0
        } else {
            let named = key_terms.iter().filter(|t| query.contains(t)).count();
            named as f32 / key_terms.len() as f32
        };

        (self.coverage_weight * coverage + (1.0 - self.coverage_weight) * specificity).clamp(0.0, 1.0)
    }

    fn name(&self) -> &'static str {
        "lexical-v1"
    }
}
