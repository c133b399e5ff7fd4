//! Audit Recorder - One immutable record per processed question
//!
//! Records are sealed with a SHA-256 hash over their canonical fields before
//! they are handed to the [`AuditSink`]. [`AuditRecord::verify`] recomputes
//! the hash, so a row edited after the fact no longer verifies.

use crate::errors::{AppError, Result};
use crate::grounding::{DecisionKind, SourceType};
use crate::metrics;
use crate::models::DealId;
use crate::retrieval::ScoredUnit;
use crate::store::AuditSink;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// Characters of unit text kept in a candidate snapshot
const PREVIEW_CHARS: usize = 200;

/// Identifier returned by the audit sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditId(pub Uuid);

impl fmt::Display for AuditId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Answered,
    ClarifyRequested,
    Escalated,
    Timeout,
    Failed,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Answered => "answered",
            AuditOutcome::ClarifyRequested => "clarify_requested",
            AuditOutcome::Escalated => "escalated",
            AuditOutcome::Timeout => "timeout",
            AuditOutcome::Failed => "failed",
        }
    }
}

impl From<DecisionKind> for AuditOutcome {
    fn from(kind: DecisionKind) -> Self {
        match kind {
            DecisionKind::Answered => AuditOutcome::Answered,
            DecisionKind::ClarifyRequested => AuditOutcome::ClarifyRequested,
            DecisionKind::Escalated => AuditOutcome::Escalated,
        }
    }
}

/// What retrieval returned, frozen at decision time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSnapshot {
    pub source_id: String,
    pub source_type: SourceType,
    pub key: String,
    pub score: f32,
    pub preview: String,
}

impl From<&ScoredUnit> for CandidateSnapshot {
    fn from(candidate: &ScoredUnit) -> Self {
        Self {
            source_id: candidate.unit.source_id.clone(),
            source_type: candidate.unit.source_type,
            key: candidate.unit.key.clone(),
            score: candidate.score,
            preview: candidate.unit.text.chars().take(PREVIEW_CHARS).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub deal_id: DealId,
    pub question: String,
    pub candidates: Vec<CandidateSnapshot>,
    pub outcome: AuditOutcome,

    /// Draft or internal notice; `None` when processing failed
    pub rendered_output: Option<String>,

    pub failure_reason: Option<String>,

    /// Top candidate score
    pub confidence: Option<f32>,

    /// Inbound channel, e.g. "email"
    pub channel: Option<String>,

    pub session_id: Option<String>,

    pub policy_version: String,

    pub created_at: DateTime<Utc>,

    /// Hex SHA-256 over every field above
    pub content_hash: String,
}

/// Fields covered by the content hash, in canonical order
#[derive(Serialize)]
struct HashedFields<'a> {
    id: &'a Uuid,
    deal_id: DealId,
    question: &'a str,
    candidates: &'a [CandidateSnapshot],
    outcome: AuditOutcome,
    rendered_output: Option<&'a str>,
    failure_reason: Option<&'a str>,
    confidence: Option<f32>,
    channel: Option<&'a str>,
    session_id: Option<&'a str>,
    policy_version: &'a str,
    created_at: &'a DateTime<Utc>,
}

impl AuditRecord {
    /// Unsealed record for one question; call [`AuditRecord::seal`] or hand
    /// it to [`AuditRecorder::record`]
    pub fn new(
        deal_id: DealId,
        question: impl Into<String>,
        candidates: &[ScoredUnit],
        outcome: AuditOutcome,
        policy_version: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            deal_id,
            question: question.into(),
            candidates: candidates.iter().map(CandidateSnapshot::from).collect(),
            outcome,
            rendered_output: None,
            failure_reason: None,
            confidence: candidates.iter().map(|c| c.score).reduce(f32::max),
            channel: None,
            session_id: None,
            policy_version: policy_version.into(),
            created_at: Utc::now(),
            content_hash: String::new(),
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.rendered_output = Some(output.into());
        self
    }

    pub fn with_failure(mut self, reason: impl Into<String>) -> Self {
        self.failure_reason = Some(reason.into());
        self
    }

    pub fn with_origin(mut self, channel: Option<String>, session_id: Option<String>) -> Self {
        self.channel = channel;
        self.session_id = session_id;
        self
    }

    pub fn compute_hash(&self) -> Result<String> {
        let canonical = serde_json::to_vec(&HashedFields {
            id: &self.id,
            deal_id: self.deal_id,
            question: &self.question,
            candidates: &self.candidates,
            outcome: self.outcome,
            rendered_output: self.rendered_output.as_deref(),
            failure_reason: self.failure_reason.as_deref(),
            confidence: self.confidence,
            channel: self.channel.as_deref(),
            session_id: self.session_id.as_deref(),
            policy_version: &self.policy_version,
            created_at: &self.created_at,
        })?;
        Ok(hex::encode(Sha256::digest(&canonical)))
    }

    pub fn seal(mut self) -> Result<Self> {
        self.content_hash = self.compute_hash()?;
        Ok(self)
    }

    /// True when the stored hash still matches the record's fields
    pub fn verify(&self) -> bool {
        !self.content_hash.is_empty()
            && self
                .compute_hash()
                .map(|hash| hash == self.content_hash)
                .unwrap_or(false)
    }
}

/// Writes sealed records through the collaborator's append API
#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Seal and append `record`. Any sink failure surfaces as `AuditUnavailable`.
    pub async fn record(&self, record: AuditRecord) -> Result<AuditRecord> {
        let record = record.seal()?;

        match self.sink.append_audit_record(&record).await {
            Ok(id) => {
                debug!(
                    audit_id = %id,
                    deal_id = %record.deal_id,
                    outcome = record.outcome.as_str(),
                    "Audit record appended"
                );
                Ok(record)
            }
            Err(e) => {
                metrics::record_audit_failure();
                error!(
                    audit_id = %record.id,
                    deal_id = %record.deal_id,
                    outcome = record.outcome.as_str(),
                    error = %e,
                    "Audit append failed"
                );
                Err(match e {
                    AppError::AuditUnavailable { .. } => e,
                    other => AppError::AuditUnavailable {
                        message: other.to_string(),
                    },
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grounding::KnowledgeUnit;
    use crate::store::{FaultPlan, InMemoryStore};

    fn candidate(text: &str, score: f32) -> ScoredUnit {
        ScoredUnit {
            unit: KnowledgeUnit {
                source_type: SourceType::Document,
                source_id: "document:5".into(),
                deal_id: Some(DealId(1)),
                key: "data_room#p2".into(),
                title: Some("Data Room".into()),
                text: text.into(),
                aliases: vec![],
                verified_at: Utc::now(),
                approved: true,
            },
            score,
        }
    }

    #[test]
    fn test_snapshot_truncates_preview() {
        let long = "x".repeat(500);
        let record = AuditRecord::new(
            DealId(1),
            "q",
            &[candidate(&long, 0.4), candidate("short", 0.6)],
            AuditOutcome::ClarifyRequested,
            "grounding-v1+abc",
        );
        assert_eq!(record.candidates[0].preview.chars().count(), PREVIEW_CHARS);
        assert_eq!(record.candidates[1].preview, "short");
        assert_eq!(record.confidence, Some(0.6));
    }

    #[test]
    fn test_record_ids_are_time_based() {
        let record = AuditRecord::new(DealId(1), "q", &[], AuditOutcome::Answered, "v1");
        assert_eq!(record.id.get_version_num(), 7);
    }

    #[test]
    fn test_sealed_record_detects_mutation() {
        let record = AuditRecord::new(DealId(1), "what's the cap?", &[], AuditOutcome::Answered, "v1")
            .with_output("Hi,\n\nThe valuation cap is $10M.\n\nBest,")
            .seal()
            .unwrap();
        assert!(record.verify());

        let mut tampered = record.clone();
        tampered.rendered_output = Some("Hi,\n\nThe valuation cap is $12M.\n\nBest,".into());
        assert!(!tampered.verify());

        let unsealed = AuditRecord::new(DealId(1), "q", &[], AuditOutcome::Failed, "v1");
        assert!(!unsealed.verify());
    }

    #[test]
    fn test_record_serializes_outcome() {
        let record = AuditRecord::new(DealId(3), "q", &[], AuditOutcome::Timeout, "v1")
            .with_failure("Pipeline exceeded its budget of 10ms")
            .with_origin(Some("email".into()), Some("thread-42".into()));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["outcome"], "timeout");
        assert_eq!(json["deal_id"], 3);
        assert_eq!(json["channel"], "email");
        assert!(json["rendered_output"].is_null());
    }

    #[tokio::test]
    async fn test_recorder_appends_sealed_records() {
        let store = Arc::new(InMemoryStore::new());
        let recorder = AuditRecorder::new(store.clone());

        let record = AuditRecord::new(DealId(1), "q", &[], AuditOutcome::Escalated, "v1");
        let sealed = recorder.record(record).await.unwrap();

        let log = store.audit_records().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0], sealed);
        assert!(log[0].verify());
    }

    #[tokio::test]
    async fn test_recorder_surfaces_sink_failure() {
        let store = Arc::new(InMemoryStore::new());
        store
            .set_faults(FaultPlan {
                fail_append: true,
                ..FaultPlan::default()
            })
            .await;
        let recorder = AuditRecorder::new(store.clone());

        let err = recorder
            .record(AuditRecord::new(DealId(1), "q", &[], AuditOutcome::Answered, "v1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuditUnavailable { .. }));
        assert!(store.audit_records().await.is_empty());
    }
}
