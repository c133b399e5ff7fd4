//! Grounding Engine - One question in, one audited outcome out
//!
//! Pipeline per question:
//! deal resolution -> concurrent fetch (records, tone rules) -> normalize
//! -> retrieve -> decide -> render -> audit
//!
//! Everything up to render runs under the request budget. The audit append
//! sits outside the timed section, so each question leaves exactly one record
//! whether it completes, fails, or times out.

use crate::errors::{AppError, Result};
use crate::grounding::{
    decide, AuditId, AuditOutcome, AuditRecord, AuditRecorder, ConfidenceTier, Decision,
    DecisionKind, GroundingPolicy, KnowledgeNormalizer, ToneRenderer, RENDER_FALLBACK_NOTICE,
};
use crate::metrics;
use crate::models::DealId;
use crate::retrieval::{Retriever, ScoredUnit, Scorer};
use crate::store::{AuditSink, DealDirectory, KnowledgeStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Question as delivered by a channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundQuestion {
    pub deal_id: DealId,
    pub text: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl InboundQuestion {
    pub fn new(deal_id: DealId, text: impl Into<String>) -> Self {
        Self {
            deal_id,
            text: text.into(),
            channel: None,
            session_id: None,
        }
    }
}

/// Text produced for a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum RenderedReply {
    /// Investor-facing draft
    Draft(String),
    /// Routing or fallback notice for the deal team
    InternalNotice(String),
}

impl RenderedReply {
    pub fn text(&self) -> &str {
        match self {
            RenderedReply::Draft(text) | RenderedReply::InternalNotice(text) => text.as_str(),
        }
    }

    pub fn is_draft(&self) -> bool {
        matches!(self, RenderedReply::Draft(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub audit_id: AuditId,
    pub decision: Decision,
    pub confidence: ConfidenceTier,
    pub reply: RenderedReply,
    pub policy_version: String,
}

impl ProcessOutcome {
    pub fn kind(&self) -> DecisionKind {
        self.decision.kind()
    }

    /// Investor-facing draft, `None` when only an internal notice exists
    pub fn draft(&self) -> Option<&str> {
        match &self.reply {
            RenderedReply::Draft(text) => Some(text.as_str()),
            RenderedReply::InternalNotice(_) => None,
        }
    }
}

/// Result of the timed section
struct Drafted {
    candidates: Vec<ScoredUnit>,
    decision: Decision,
    reply: RenderedReply,
    render_failure: Option<String>,
}

pub struct GroundingEngine {
    normalizer: KnowledgeNormalizer,
    retriever: Retriever,
    policy: GroundingPolicy,
    renderer: ToneRenderer,
    recorder: AuditRecorder,
    request_timeout: Duration,
}

impl GroundingEngine {
    /// Engine with the default lexical scorer
    pub fn new(
        directory: Arc<dyn DealDirectory>,
        store: Arc<dyn KnowledgeStore>,
        audit: Arc<dyn AuditSink>,
        policy: GroundingPolicy,
        request_timeout: Duration,
    ) -> Self {
        Self {
            normalizer: KnowledgeNormalizer::new(directory, store),
            retriever: Retriever::lexical(policy.min_retrieval_floor()),
            policy,
            renderer: ToneRenderer::new(),
            recorder: AuditRecorder::new(audit),
            request_timeout,
        }
    }

    /// Engine over one collaborator implementing every trait
    pub fn with_collaborator<C>(collaborator: Arc<C>, policy: GroundingPolicy, request_timeout: Duration) -> Self
    where
        C: DealDirectory + KnowledgeStore + AuditSink + 'static,
    {
        Self::new(
            collaborator.clone(),
            collaborator.clone(),
            collaborator,
            policy,
            request_timeout,
        )
    }

    /// Swap the scorer. The policy version is re-fingerprinted so audit rows
    /// show which scorer produced them.
    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Result<Self> {
        self.policy = self.policy.for_scorer(scorer.name())?;
        self.retriever = Retriever::new(scorer, self.policy.min_retrieval_floor());
        Ok(self)
    }

    pub fn policy(&self) -> &GroundingPolicy {
        &self.policy
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub async fn process(&self, deal_id: DealId, question: &str) -> Result<ProcessOutcome> {
        self.process_inbound(InboundQuestion::new(deal_id, question)).await
    }

    #[instrument(skip(self, inbound), fields(deal_id = %inbound.deal_id, channel = ?inbound.channel))]
    pub async fn process_inbound(&self, inbound: InboundQuestion) -> Result<ProcessOutcome> {
        if inbound.text.trim().is_empty() {
            return Err(AppError::Validation {
                message: "question must not be blank".to_string(),
                field: Some("question".to_string()),
            });
        }

        let started = Instant::now();
        let timed = tokio::time::timeout(self.request_timeout, self.draft(inbound.deal_id, &inbound.text)).await;

        let drafted = match timed {
            Ok(Ok(drafted)) => drafted,
            Ok(Err(e)) => {
                self.record_failure(&inbound, AuditOutcome::Failed, &e, started).await;
                return Err(e);
            }
            Err(_) => {
                let e = AppError::Timeout {
                    budget_ms: self.request_timeout.as_millis() as u64,
                };
                self.record_failure(&inbound, AuditOutcome::Timeout, &e, started).await;
                return Err(e);
            }
        };

        let kind = drafted.decision.kind();
        let mut record = AuditRecord::new(
            inbound.deal_id,
            inbound.text.clone(),
            &drafted.candidates,
            kind.into(),
            self.policy.version(),
        )
        .with_output(drafted.reply.text())
        .with_origin(inbound.channel.clone(), inbound.session_id.clone());
        if let Some(reason) = &drafted.render_failure {
            record = record.with_failure(reason.clone());
        }

        let sealed = self.recorder.record(record).await?;

        metrics::record_decision(kind.as_str(), started.elapsed().as_secs_f64(), drafted.candidates.len());
        info!(
            audit_id = %sealed.id,
            decision = %kind,
            candidates = drafted.candidates.len(),
            top_score = ?drafted.decision.top_score(),
            draft = drafted.reply.is_draft(),
            "Question processed"
        );

        Ok(ProcessOutcome {
            audit_id: AuditId(sealed.id),
            confidence: drafted.decision.confidence_tier(),
            decision: drafted.decision,
            reply: drafted.reply,
            policy_version: self.policy.version().to_string(),
        })
    }

    /// The timed section: fetch, decide, render. Never writes.
    async fn draft(&self, deal_id: DealId, question: &str) -> Result<Drafted> {
        let snapshot = self.normalizer.snapshot(deal_id).await?;
        let candidates = self.retriever.retrieve(question, &snapshot.units, self.policy.top_k());
        let decision = decide(question, &candidates, &snapshot.units, &self.policy);

        let (reply, render_failure) = match self.renderer.render(&decision, &snapshot.tone_rules, deal_id) {
            Ok(text) if decision.kind() == DecisionKind::Escalated => (RenderedReply::InternalNotice(text), None),
            Ok(text) => (RenderedReply::Draft(text), None),
            Err(e) if e.is_render_failure() => {
                warn!(
                    deal_id = %deal_id,
                    decision = %decision.kind(),
                    error = %e,
                    "Draft replaced by fallback notice"
                );
                metrics::record_tone_fallback(&format!("{:?}", e.code()));
                (
                    RenderedReply::InternalNotice(RENDER_FALLBACK_NOTICE.to_string()),
                    Some(e.to_string()),
                )
            }
            Err(e) => return Err(e),
        };

        Ok(Drafted {
            candidates,
            decision,
            reply,
            render_failure,
        })
    }

    /// Best effort: the original error is what the caller sees
    async fn record_failure(&self, inbound: &InboundQuestion, outcome: AuditOutcome, err: &AppError, started: Instant) {
        metrics::record_decision(outcome.as_str(), started.elapsed().as_secs_f64(), 0);

        let record = AuditRecord::new(inbound.deal_id, inbound.text.clone(), &[], outcome, self.policy.version())
            .with_failure(err.to_string())
            .with_origin(inbound.channel.clone(), inbound.session_id.clone());

        if let Err(audit_err) = self.recorder.record(record).await {
            warn!(
                deal_id = %inbound.deal_id,
                error = %err,
                audit_error = %audit_err,
                "Failure could not be audited"
            );
        }
    }
}
