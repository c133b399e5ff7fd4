//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub service: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub knowledge: CheckResult,
    pub policy: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: dealdesk_common::VERSION.to_string(),
    })
}

/// Readiness probe - knowledge loaded and policy in force
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let deals = state.store.deal_count().await;

    let knowledge = if deals > 0 {
        CheckResult {
            status: "up".to_string(),
            detail: Some(format!("{} deals loaded", deals)),
        }
    } else {
        CheckResult {
            status: "down".to_string(),
            detail: Some("no deals loaded".to_string()),
        }
    };

    let policy = CheckResult {
        status: "up".to_string(),
        detail: Some(state.engine.policy().version().to_string()),
    };

    let all_healthy = knowledge.status == "up";

    Json(ReadyResponse {
        status: if all_healthy { "ready" } else { "not_ready" }.to_string(),
        service: state.config.observability.service_name.clone(),
        checks: HealthChecks { knowledge, policy },
    })
}
