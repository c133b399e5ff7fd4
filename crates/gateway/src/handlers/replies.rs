//! Reply drafting handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use validator::Validate;

use crate::AppState;
use dealdesk_common::{
    errors::{AppError, Result},
    grounding::{
        AuditId, ConfidenceTier, DecisionKind, InboundQuestion, RenderedReply, SourceType,
    },
    metrics::RequestMetrics,
    models::DealId,
};

const ENDPOINT: &str = "/v1/deals/{deal_id}/replies";

/// Draft request for one inbound investor question
#[derive(Debug, Deserialize, Validate)]
pub struct ReplyRequest {
    #[validate(length(min = 1, max = 4000))]
    pub question: String,

    /// Inbound channel, e.g. "email"
    #[serde(default)]
    #[validate(length(max = 64))]
    pub channel: Option<String>,

    /// Thread or conversation identifier
    #[serde(default)]
    #[validate(length(max = 128))]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReplyResponse {
    pub audit_id: AuditId,
    pub deal_id: DealId,
    pub decision: DecisionKind,
    pub confidence: ConfidenceTier,

    /// Investor-facing draft; null when escalated or when rendering fell back
    pub reply: Option<String>,

    /// Note for the deal team
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_notice: Option<String>,

    pub evidence: Vec<EvidenceItem>,
    pub policy_version: String,
    pub processing_time_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct EvidenceItem {
    pub source_id: String,
    pub source_type: SourceType,
    pub key: String,
    pub score: f32,
}

/// Decide and draft a reply
pub async fn create_reply(
    State(state): State<AppState>,
    Path(deal_id): Path<i64>,
    Json(request): Json<ReplyRequest>,
) -> Result<Json<ReplyResponse>> {
    let start = Instant::now();
    let request_metrics = RequestMetrics::start("POST", ENDPOINT);

    if let Err(e) = request.validate() {
        request_metrics.finish(400);
        return Err(AppError::Validation {
            message: e.to_string(),
            field: e.field_errors().keys().next().map(|k| k.to_string()),
        });
    }

    let inbound = InboundQuestion {
        deal_id: DealId(deal_id),
        text: request.question,
        channel: request.channel,
        session_id: request.session_id,
    };

    let outcome = match state.engine.process_inbound(inbound).await {
        Ok(outcome) => outcome,
        Err(e) => {
            request_metrics.finish(e.status_code().as_u16());
            return Err(e);
        }
    };

    let processing_time_ms = start.elapsed().as_millis() as u64;
    request_metrics.finish(200);

    tracing::info!(
        deal_id,
        decision = %outcome.kind(),
        audit_id = %outcome.audit_id,
        latency_ms = processing_time_ms,
        "Reply drafted"
    );

    let (reply, internal_notice) = match &outcome.reply {
        RenderedReply::Draft(text) => (Some(text.clone()), None),
        RenderedReply::InternalNotice(text) => (None, Some(text.clone())),
    };

    Ok(Json(ReplyResponse {
        audit_id: outcome.audit_id,
        deal_id: DealId(deal_id),
        decision: outcome.kind(),
        confidence: outcome.confidence,
        reply,
        internal_notice,
        evidence: outcome
            .decision
            .evidence()
            .iter()
            .map(|c| EvidenceItem {
                source_id: c.unit.source_id.clone(),
                source_type: c.unit.source_type,
                key: c.unit.key.clone(),
                score: c.score,
            })
            .collect(),
        policy_version: outcome.policy_version,
        processing_time_ms,
    }))
}
