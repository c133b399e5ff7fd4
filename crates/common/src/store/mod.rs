//! Persistence collaborator interfaces
//!
//! The engine only reads knowledge and appends audit records. Storage,
//! retries, and consistency belong to whoever implements these traits.

mod memory;

pub use memory::{FaultPlan, InMemoryStore, KnowledgeSeed};

use crate::errors::Result;
use crate::grounding::{AuditId, AuditRecord};
use crate::models::{Deal, DealId, KnowledgeRecord, ToneRule};

/// Resolves deal identifiers
#[async_trait::async_trait]
pub trait DealDirectory: Send + Sync {
    /// `Ok(None)` when the deal does not exist
    async fn resolve_deal(&self, deal_id: DealId) -> Result<Option<Deal>>;
}

/// Read side of the knowledge base
#[async_trait::async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Records for the deal plus global records. Implementations should only
    /// return approved rows, but callers must not rely on it.
    async fn fetch_approved_records(&self, deal_id: DealId) -> Result<Vec<KnowledgeRecord>>;

    /// Global rules plus rules scoped to the deal
    async fn fetch_tone_rules(&self, deal_id: DealId) -> Result<Vec<ToneRule>>;
}

/// Append-only audit log
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    async fn append_audit_record(&self, record: &AuditRecord) -> Result<AuditId>;
}
