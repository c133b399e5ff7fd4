//! Audit trail handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::AppState;
use dealdesk_common::{
    errors::{AppError, Result},
    grounding::AuditRecord,
    models::DealId,
    store::DealDirectory,
};

#[derive(Serialize)]
pub struct AuditTrailResponse {
    pub deal_id: DealId,
    pub total: usize,

    /// Records failing hash verification
    pub unverified: usize,

    pub records: Vec<AuditRecord>,
}

/// Audit records for a deal, oldest first
pub async fn list_audit(
    State(state): State<AppState>,
    Path(deal_id): Path<i64>,
) -> Result<Json<AuditTrailResponse>> {
    let deal_id = DealId(deal_id);

    if state.store.resolve_deal(deal_id).await?.is_none() {
        return Err(AppError::Scope {
            deal_id: deal_id.0,
            reason: "deal not found".to_string(),
        });
    }

    let records = state.store.audit_records_for(deal_id).await;
    let unverified = records.iter().filter(|r| !r.verify()).count();
    if unverified > 0 {
        tracing::warn!(deal_id = %deal_id, unverified, "Audit records failed verification");
    }

    Ok(Json(AuditTrailResponse {
        deal_id,
        total: records.len(),
        unverified,
        records,
    }))
}
