//! Knowledge Normalizer - Flattens stored records into searchable units
//!
//! Provides:
//! - Deal resolution with scope checks
//! - Approval and scope filtering
//! - Deterministic mapping of every source kind to one `KnowledgeUnit` shape

use crate::errors::{AppError, Result};
use crate::models::{Deal, DealId, KnowledgeRecord, ToneRule};
use crate::store::{DealDirectory, KnowledgeStore};
use crate::text;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Words kept when deriving a key from a question
const KEY_WORDS: usize = 6;

/// Where a unit came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Term,
    Document,
    Faq,
    DynamicFact,
}

impl SourceType {
    /// Tie-break rank: fresher, more specific sources first
    pub fn priority(&self) -> u8 {
        match self {
            SourceType::DynamicFact => 4,
            SourceType::Term => 3,
            SourceType::Faq => 2,
            SourceType::Document => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Term => "term",
            SourceType::Document => "document",
            SourceType::Faq => "faq",
            SourceType::DynamicFact => "dynamic_fact",
        }
    }
}

/// Uniform, derived view of one approved fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeUnit {
    pub source_type: SourceType,

    /// Stable record reference, e.g. "term:4"
    pub source_id: String,

    /// Owning deal; `None` for global units
    pub deal_id: Option<DealId>,

    /// Canonical short label, e.g. "valuation_cap"
    pub key: String,

    /// Document name for excerpts
    pub title: Option<String>,

    /// The fact itself
    pub text: String,

    /// Alternate phrasings (FAQ question, tags)
    pub aliases: Vec<String>,

    pub verified_at: DateTime<Utc>,

    pub approved: bool,
}

impl KnowledgeUnit {
    /// Identity of what this unit asserts
    pub fn fingerprint(&self) -> String {
        text::fingerprint(&text::labelize(&self.key), &self.text)
    }

    /// Human label for clarifying questions
    pub fn label(&self) -> String {
        match (&self.source_type, &self.title) {
            (SourceType::Document, Some(title)) => title.clone(),
            _ => text::labelize(&self.key),
        }
    }
}

/// Resolve a deal the engine may answer for
pub async fn resolve_active_deal(directory: &dyn DealDirectory, deal_id: DealId) -> Result<Deal> {
    let deal = directory
        .resolve_deal(deal_id)
        .await
        .map_err(|e| AppError::RetrievalUnavailable {
            message: format!("deal lookup failed: {}", e),
        })?
        .ok_or_else(|| AppError::Scope {
            deal_id: deal_id.0,
            reason: "deal not found".to_string(),
        })?;

    if !deal.is_active() {
        return Err(AppError::Scope {
            deal_id: deal_id.0,
            reason: "deal is closed".to_string(),
        });
    }

    Ok(deal)
}

/// Everything one question is answered from, read once and then frozen
#[derive(Debug, Clone)]
pub struct DealSnapshot {
    pub deal: Deal,
    pub units: Vec<KnowledgeUnit>,
    pub tone_rules: Vec<ToneRule>,
}

/// Normalizer over the deal directory and knowledge store
pub struct KnowledgeNormalizer {
    directory: Arc<dyn DealDirectory>,
    store: Arc<dyn KnowledgeStore>,
}

impl KnowledgeNormalizer {
    pub fn new(directory: Arc<dyn DealDirectory>, store: Arc<dyn KnowledgeStore>) -> Self {
        Self { directory, store }
    }

    /// Approved units for `deal_id`, in canonical order
    pub async fn normalize(&self, deal_id: DealId) -> Result<Vec<KnowledgeUnit>> {
        let deal = resolve_active_deal(self.directory.as_ref(), deal_id).await?;
        let records = self
            .store
            .fetch_approved_records(deal_id)
            .await
            .map_err(into_retrieval_unavailable)?;
        Ok(normalize_records(&deal, &records))
    }

    /// Units and tone rules for `deal_id`, fetched concurrently
    pub async fn snapshot(&self, deal_id: DealId) -> Result<DealSnapshot> {
        let deal = resolve_active_deal(self.directory.as_ref(), deal_id).await?;

        let (records, tone_rules) = tokio::try_join!(
            async {
                self.store
                    .fetch_approved_records(deal_id)
                    .await
                    .map_err(into_retrieval_unavailable)
            },
            async {
                self.store
                    .fetch_tone_rules(deal_id)
                    .await
                    .map_err(into_retrieval_unavailable)
            }
        )?;

        let units = normalize_records(&deal, &records);
        debug!(deal_id = %deal_id, units = units.len(), tone_rules = tone_rules.len(), "Snapshot taken");
        Ok(DealSnapshot {
            deal,
            units,
            tone_rules,
        })
    }
}

/// Collaborator failures surface as `RetrievalUnavailable`
fn into_retrieval_unavailable(err: AppError) -> AppError {
    match err {
        AppError::RetrievalUnavailable { .. } => err,
        other => AppError::RetrievalUnavailable {
            message: other.to_string(),
        },
    }
}

/// Pure mapping from records to units. Drops unapproved records, records of
/// other deals, and records without usable text.
pub fn normalize_records(deal: &Deal, records: &[KnowledgeRecord]) -> Vec<KnowledgeUnit> {
    let mut units: Vec<KnowledgeUnit> = records
        .iter()
        .filter(|r| {
            let in_scope = r.deal_id().map_or(true, |id| id == deal.id);
            if !in_scope || !r.is_approved() {
                debug!(source_id = %r.source_id(), in_scope, "Record excluded from snapshot");
            }
            in_scope && r.is_approved()
        })
        .filter_map(to_unit)
        .collect();

    units.sort_by(|a, b| {
        b.source_type
            .priority()
            .cmp(&a.source_type.priority())
            .then_with(|| a.key.cmp(&b.key))
            .then_with(|| a.source_id.cmp(&b.source_id))
    });

    units
}

fn to_unit(record: &KnowledgeRecord) -> Option<KnowledgeUnit> {
    let source_id = record.source_id();
    let deal_id = record.deal_id();

    let unit = match record {
        KnowledgeRecord::Term(t) => KnowledgeUnit {
            source_type: SourceType::Term,
            source_id,
            deal_id,
            key: t.key.trim().to_lowercase(),
            title: None,
            text: t.value.trim().to_string(),
            aliases: Vec::new(),
            verified_at: t.verified_at,
            approved: t.approved,
        },
        KnowledgeRecord::Document(d) => {
            let anchor = match d.page_number {
                Some(page) => format!("p{}", page),
                None => format!("c{}", d.chunk_index),
            };
            KnowledgeUnit {
                source_type: SourceType::Document,
                source_id,
                deal_id,
                key: format!("{}#{}", text::slugify(&d.document_name, KEY_WORDS), anchor),
                title: Some(d.document_name.clone()),
                text: d.text.trim().to_string(),
                aliases: Vec::new(),
                verified_at: d.verified_at,
                approved: d.approved,
            }
        }
        KnowledgeRecord::Faq(f) => {
            let key = f
                .tags
                .iter()
                .map(|t| t.trim())
                .find(|t| !t.is_empty())
                .map(|t| t.to_lowercase().replace(' ', "_"))
                .unwrap_or_else(|| text::slugify(&f.question, KEY_WORDS));
            let mut aliases = vec![f.question.trim().to_string()];
            aliases.extend(f.tags.iter().map(|t| t.trim().to_string()).filter(|t| !t.is_empty()));
            KnowledgeUnit {
                source_type: SourceType::Faq,
                source_id,
                deal_id,
                key,
                title: None,
                text: f.answer.trim().to_string(),
                aliases,
                verified_at: f.verified_at,
                approved: true,
            }
        }
        KnowledgeRecord::DynamicFact(f) => {
            let (key, value, aliases) = match (&f.fact_key, &f.fact_value, &f.question, &f.answer) {
                (Some(k), Some(v), _, _) if !k.trim().is_empty() => {
                    (k.trim().to_lowercase(), v.clone(), Vec::new())
                }
                (_, _, Some(q), Some(a)) => {
                    (text::slugify(q, KEY_WORDS), a.clone(), vec![q.trim().to_string()])
                }
                _ => {
                    debug!(source_id = %source_id, "Dynamic fact has neither key/value nor Q&A, skipped");
                    return None;
                }
            };
            KnowledgeUnit {
                source_type: SourceType::DynamicFact,
                source_id,
                deal_id,
                key,
                title: None,
                text: value.trim().to_string(),
                aliases,
                verified_at: f.created_at,
                approved: true,
            }
        }
    };

    if unit.text.is_empty() || unit.key.is_empty() {
        debug!(source_id = %unit.source_id, "Record has no usable text, skipped");
        return None;
    }

    Some(unit)
}
