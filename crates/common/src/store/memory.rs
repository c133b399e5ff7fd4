//! In-memory collaborator
//!
//! Implements every persistence trait over `RwLock`ed collections. Used by
//! the gateway when no database is wired in and by the test suites, with a
//! fault plan for simulating an unavailable or slow store.

use super::{AuditSink, DealDirectory, KnowledgeStore};
use crate::errors::{AppError, Result};
use crate::grounding::{AuditId, AuditRecord};
use crate::models::{Deal, DealId, KnowledgeRecord, ToneRule};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Knowledge snapshot loadable from JSON
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeSeed {
    #[serde(default)]
    pub deals: Vec<Deal>,
    #[serde(default)]
    pub records: Vec<KnowledgeRecord>,
    #[serde(default)]
    pub tone_rules: Vec<ToneRule>,
}

/// Injected failures
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Record and tone-rule fetches fail
    pub fail_fetch: bool,
    /// Audit appends fail
    pub fail_append: bool,
    /// Delay applied before each record fetch
    pub fetch_delay: Option<Duration>,
}

#[derive(Default)]
pub struct InMemoryStore {
    deals: RwLock<BTreeMap<DealId, Deal>>,
    records: RwLock<Vec<KnowledgeRecord>>,
    tone_rules: RwLock<Vec<ToneRule>>,
    audit_log: RwLock<Vec<AuditRecord>>,
    faults: RwLock<FaultPlan>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: KnowledgeSeed) -> Self {
        let deals = seed.deals.into_iter().map(|d| (d.id, d)).collect();
        Self {
            deals: RwLock::new(deals),
            records: RwLock::new(seed.records),
            tone_rules: RwLock::new(seed.tone_rules),
            ..Self::default()
        }
    }

    /// Load a JSON [`KnowledgeSeed`] from disk
    pub async fn load_seed(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let seed: KnowledgeSeed = serde_json::from_str(&raw)?;
        info!(
            path = %path.display(),
            deals = seed.deals.len(),
            records = seed.records.len(),
            tone_rules = seed.tone_rules.len(),
            "Knowledge seed loaded"
        );
        Ok(Self::from_seed(seed))
    }

    pub async fn insert_deal(&self, deal: Deal) {
        self.deals.write().await.insert(deal.id, deal);
    }

    pub async fn insert_record(&self, record: KnowledgeRecord) {
        self.records.write().await.push(record);
    }

    pub async fn insert_tone_rule(&self, rule: ToneRule) {
        self.tone_rules.write().await.push(rule);
    }

    pub async fn set_faults(&self, plan: FaultPlan) {
        *self.faults.write().await = plan;
    }

    /// Full audit log in append order
    pub async fn audit_records(&self) -> Vec<AuditRecord> {
        self.audit_log.read().await.clone()
    }

    pub async fn audit_records_for(&self, deal_id: DealId) -> Vec<AuditRecord> {
        self.audit_log
            .read()
            .await
            .iter()
            .filter(|r| r.deal_id == deal_id)
            .cloned()
            .collect()
    }

    pub async fn deal_count(&self) -> usize {
        self.deals.read().await.len()
    }

    async fn check_fetch(&self) -> Result<()> {
        let faults = self.faults.read().await.clone();
        if let Some(delay) = faults.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        if faults.fail_fetch {
            return Err(AppError::RetrievalUnavailable {
                message: "in-memory store configured to fail fetches".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DealDirectory for InMemoryStore {
    async fn resolve_deal(&self, deal_id: DealId) -> Result<Option<Deal>> {
        Ok(self.deals.read().await.get(&deal_id).cloned())
    }
}

#[async_trait::async_trait]
impl KnowledgeStore for InMemoryStore {
    async fn fetch_approved_records(&self, deal_id: DealId) -> Result<Vec<KnowledgeRecord>> {
        self.check_fetch().await?;
        let records: Vec<KnowledgeRecord> = self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.is_approved())
            .filter(|r| r.deal_id().map_or(true, |id| id == deal_id))
            .cloned()
            .collect();
        debug!(deal_id = %deal_id, count = records.len(), "Fetched knowledge records");
        Ok(records)
    }

    async fn fetch_tone_rules(&self, deal_id: DealId) -> Result<Vec<ToneRule>> {
        if self.faults.read().await.fail_fetch {
            return Err(AppError::RetrievalUnavailable {
                message: "in-memory store configured to fail fetches".to_string(),
            });
        }
        Ok(self
            .tone_rules
            .read()
            .await
            .iter()
            .filter(|r| r.applies_to(deal_id))
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl AuditSink for InMemoryStore {
    async fn append_audit_record(&self, record: &AuditRecord) -> Result<AuditId> {
        if self.faults.read().await.fail_append {
            return Err(AppError::AuditUnavailable {
                message: "in-memory store configured to fail appends".to_string(),
            });
        }
        let mut log = self.audit_log.write().await;
        if log.iter().any(|r| r.id == record.id) {
            return Err(AppError::AuditUnavailable {
                message: format!("audit record {} already exists", record.id),
            });
        }
        log.push(record.clone());
        Ok(AuditId(record.id))
    }
}
