//! Stored knowledge records
//!
//! The four fact sources a deal can carry, modelled as one tagged enum so
//! the normalizer can flatten them into a single searchable shape.

use super::DealId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A structured deal term, e.g. `valuation_cap = $10M`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealTerm {
    pub id: i64,
    pub deal_id: DealId,
    /// Snake_case key, e.g. "valuation_cap"
    pub key: String,
    pub value: String,
    pub source_page: Option<String>,
    pub approved: bool,
    pub verified_at: DateTime<Utc>,
}

/// A text chunk extracted from a deal document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentExcerpt {
    pub chunk_id: i64,
    pub doc_id: i64,
    pub deal_id: DealId,
    pub document_name: String,
    pub chunk_index: i32,
    pub page_number: Option<i32>,
    pub text: String,
    pub approved: bool,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaqStatus {
    Draft,
    Approved,
    Retired,
}

/// Curated Q/A pair. A FAQ without a deal applies to every deal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub id: i64,
    pub deal_id: Option<DealId>,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub status: FaqStatus,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Approved,
    Pending,
}

/// Team-supplied fact, either key/value (`share_price = ~$378`) or a Q&A pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicFact {
    pub id: i64,
    pub deal_id: DealId,
    pub fact_key: Option<String>,
    pub fact_value: Option<String>,
    pub question: Option<String>,
    pub answer: Option<String>,
    pub approval_status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
}

/// Any stored fact source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum KnowledgeRecord {
    Term(DealTerm),
    Document(DocumentExcerpt),
    Faq(FaqEntry),
    DynamicFact(DynamicFact),
}

impl KnowledgeRecord {
    /// Owning deal; `None` for global records
    pub fn deal_id(&self) -> Option<DealId> {
        match self {
            KnowledgeRecord::Term(t) => Some(t.deal_id),
            KnowledgeRecord::Document(d) => Some(d.deal_id),
            KnowledgeRecord::Faq(f) => f.deal_id,
            KnowledgeRecord::DynamicFact(f) => Some(f.deal_id),
        }
    }

    pub fn is_approved(&self) -> bool {
        match self {
            KnowledgeRecord::Term(t) => t.approved,
            KnowledgeRecord::Document(d) => d.approved,
            KnowledgeRecord::Faq(f) => f.status == FaqStatus::Approved,
            KnowledgeRecord::DynamicFact(f) => f.approval_status == ApprovalStatus::Approved,
        }
    }

    /// Stable identifier used in candidate snapshots, e.g. "faq:12"
    pub fn source_id(&self) -> String {
        match self {
            KnowledgeRecord::Term(t) => format!("term:{}", t.id),
            KnowledgeRecord::Document(d) => format!("document:{}", d.chunk_id),
            KnowledgeRecord::Faq(f) => format!("faq:{}", f.id),
            KnowledgeRecord::DynamicFact(f) => format!("dynamic_fact:{}", f.id),
        }
    }
}
