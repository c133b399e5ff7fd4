//! DealDesk API Gateway
//!
//! HTTP delivery surface for the grounding engine.
//! Handles:
//! - Reply drafting per deal
//! - Audit trail read-out
//! - Health and readiness probes
//! - Observability (logging, metrics, request ids)

mod handlers;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use dealdesk_common::{
    config::{AppConfig, ObservabilityConfig},
    metrics, GroundingEngine, GroundingPolicy, InMemoryStore,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub engine: Arc<GroundingEngine>,
    pub store: Arc<InMemoryStore>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config.observability);

    info!("Starting DealDesk API Gateway v{}", dealdesk_common::VERSION);

    // Invalid thresholds stop the process here, never per request
    let policy = GroundingPolicy::try_from(&config.grounding).map_err(|e| {
        tracing::error!(error = %e, "Invalid grounding policy");
        e
    })?;
    info!(policy_version = policy.version(), "Grounding policy loaded");

    init_metrics(&config.observability)?;

    let store = match &config.knowledge.seed_path {
        Some(path) => Arc::new(InMemoryStore::load_seed(path).await?),
        None => {
            tracing::warn!("No knowledge seed configured, starting with an empty store");
            Arc::new(InMemoryStore::new())
        }
    };

    let engine = GroundingEngine::with_collaborator(store.clone(), policy, config.request_timeout());
    let config = Arc::new(config);

    let state = AppState {
        config: config.clone(),
        engine: Arc::new(engine),
        store,
    };

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Prometheus exporter on its own port; port 0 disables it
fn init_metrics(config: &ObservabilityConfig) -> anyhow::Result<()> {
    if config.metrics_port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], config.metrics_port)))
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            metrics::LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("retrieval_candidates".to_string()),
            metrics::CANDIDATE_BUCKETS,
        )?
        .install()
        .context("failed to install Prometheus exporter")?;

    metrics::register_metrics();
    info!(port = config.metrics_port, "Metrics exporter listening");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let api_routes = Router::new()
        .route("/deals/{deal_id}/replies", post(handlers::replies::create_reply))
        .route("/deals/{deal_id}/audit", get(handlers::audit::list_audit));

    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use dealdesk_common::models::{Deal, DealId, DealStatus, DealTerm, KnowledgeRecord};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    async fn state() -> AppState {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_deal(Deal {
                id: DealId(1),
                name: "Northwind Seed".into(),
                code: "northwind-seed".into(),
                status: DealStatus::Active,
                created_at: Utc::now(),
            })
            .await;
        store
            .insert_record(KnowledgeRecord::Term(DealTerm {
                id: 1,
                deal_id: DealId(1),
                key: "valuation_cap".into(),
                value: "$10M".into(),
                source_page: Some("4".into()),
                approved: true,
                verified_at: Utc::now(),
            }))
            .await;

        let config = AppConfig::default();
        let policy = GroundingPolicy::try_from(&config.grounding).unwrap();
        let engine = GroundingEngine::with_collaborator(store.clone(), policy, Duration::from_secs(5));
        AppState {
            config: Arc::new(config),
            engine: Arc::new(engine),
            store,
        }
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(state().await);
        let (status, body) = send(app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ready_reports_knowledge() {
        let app = create_router(state().await);
        let (status, body) = send(app, Request::get("/ready").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
        assert!(body["checks"]["policy"]["detail"].as_str().unwrap().starts_with("grounding-v1+"));
    }

    #[tokio::test]
    async fn test_reply_is_answered_and_audited() {
        let state = state().await;
        let app = create_router(state.clone());

        let (status, body) = send(
            app.clone(),
            post_json("/v1/deals/1/replies", json!({"question": "what's the cap?", "channel": "email"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["decision"], "ANSWERED");
        assert_eq!(body["confidence"], "high");
        assert!(body["reply"].as_str().unwrap().contains("$10M"));
        assert_eq!(body["evidence"][0]["source_id"], "term:1");

        let (status, trail) = send(app, Request::get("/v1/deals/1/audit").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(trail["total"], 1);
        assert_eq!(trail["unverified"], 0);
        assert_eq!(trail["records"][0]["outcome"], "answered");
        assert_eq!(trail["records"][0]["channel"], "email");
    }

    #[tokio::test]
    async fn test_escalated_reply_has_no_draft() {
        let app = create_router(state().await);
        let (status, body) = send(
            app,
            post_json("/v1/deals/1/replies", json!({"question": "We are considering a lawsuit."})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["decision"], "ESCALATED");
        assert!(body["reply"].is_null());
        assert!(body["internal_notice"].as_str().unwrap().starts_with("[INTERNAL]"));
    }

    #[tokio::test]
    async fn test_empty_question_is_rejected() {
        let state = state().await;
        let app = create_router(state.clone());
        let (status, body) = send(app, post_json("/v1/deals/1/replies", json!({"question": ""}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(state.store.audit_records().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_deal_is_not_found() {
        let app = create_router(state().await);
        let (status, body) = send(
            app.clone(),
            post_json("/v1/deals/404/replies", json!({"question": "what's the cap?"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "SCOPE_ERROR");

        let (status, _) = send(app, Request::get("/v1/deals/404/audit").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
