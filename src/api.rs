//! REST API server for the transaction analysis pipeline
//!
//! Exposes the analyzer via HTTP endpoints for the investigator chat UI.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::AnalysisError;
use crate::intent::{Intent, IntentClassifier, HELP_TEXT};
use crate::orchestrator::Analyzer;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    pub context: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub customer_id: Option<String>,
    pub message: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub error_kind: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            error_kind: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(err: &AnalysisError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind().to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type ApiResult = (StatusCode, Json<ApiResponse>);

fn ok<T: Serialize>(data: T) -> ApiResult {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

fn fail(err: &AnalysisError) -> ApiResult {
    (status_for(err), Json(ApiResponse::error(err)))
}

/// Client-closed-request; only ever seen in logs.
const CLIENT_CLOSED_REQUEST: u16 = 499;

pub fn status_for(err: &AnalysisError) -> StatusCode {
    match err {
        AnalysisError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        AnalysisError::CustomerNotFound(_) => StatusCode::NOT_FOUND,
        AnalysisError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        AnalysisError::MalformedResponse { .. } => StatusCode::BAD_GATEWAY,
        AnalysisError::ServiceUnavailable(_) | AnalysisError::StoreUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        AnalysisError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        AnalysisError::CompletionRejected(_) | AnalysisError::Config(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        AnalysisError::Cancelled => StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub analyzer: Arc<Analyzer>,
    pub completion_configured: bool,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let data = state.analyzer.data_info().await.ok();
    let status = if data.is_some() { "healthy" } else { "degraded" };

    Json(serde_json::json!({
        "status": status,
        "customers": data.as_ref().map(|d| d.customers),
        "data_source": data.map(|d| d.source),
        "completion_configured": state.completion_configured,
        "model": state.analyzer.model(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Data Source Endpoint
/// =============================

async fn data_info(State(state): State<ApiState>) -> ApiResult {
    match state.analyzer.data_info().await {
        Ok(info) => ok(info),
        Err(e) => fail(&e),
    }
}

/// =============================
/// Customer Endpoints
/// =============================

async fn list_customers(State(state): State<ApiState>) -> ApiResult {
    match state.analyzer.customers().await {
        Ok(customers) => ok(customers),
        Err(e) => fail(&e),
    }
}

async fn customer_summary(
    State(state): State<ApiState>,
    Path(customer_id): Path<String>,
) -> ApiResult {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    match state.analyzer.customer_summary(&customer_id, &cancel).await {
        Ok(summary) => ok(summary),
        Err(e) => fail(&e),
    }
}

/// =============================
/// Analysis Endpoint
/// =============================

async fn analyze_customer(
    State(state): State<ApiState>,
    Path(customer_id): Path<String>,
    body: Option<Json<AnalyzeRequest>>,
) -> ApiResult {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    info!(customer_id = %customer_id, "Received analysis request");

    // Dropping the handler future (client gone) cancels the analysis.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    match state
        .analyzer
        .analyze_with_context(&customer_id, request.context.as_deref(), &cancel)
        .await
    {
        Ok(result) => ok(result),
        Err(e) => {
            warn!(customer_id = %customer_id, kind = e.kind(), "Analysis request failed");
            fail(&e)
        }
    }
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> ApiResult {
    let explicit = req
        .customer_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    let (intent, context) = match explicit {
        Some(customer_id) => (Intent::Analyze { customer_id }, Some(req.message.as_str())),
        None => (IntentClassifier::classify(&req.message), None),
    };
    info!(intent = ?intent, "chat_handler");

    match intent {
        Intent::Analyze { customer_id } => {
            let cancel = CancellationToken::new();
            let _guard = cancel.clone().drop_guard();

            match state
                .analyzer
                .analyze_with_context(&customer_id, context, &cancel)
                .await
            {
                Ok(result) => ok(serde_json::json!({
                    "type": "analysis",
                    "customer_id": customer_id,
                    "result": result,
                })),
                Err(e) => fail(&e),
            }
        }
        Intent::ListCustomers => match state.analyzer.customers().await {
            Ok(customers) => ok(serde_json::json!({
                "type": "customers",
                "customers": customers,
            })),
            Err(e) => fail(&e),
        },
        Intent::Help => ok(serde_json::json!({
            "type": "help",
            "answer": HELP_TEXT,
        })),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/data/info", get(data_info))
        .route("/api/customers", get(list_customers))
        .route("/api/customer/:id/summary", get(customer_summary))
        .route("/api/analyze/:id", post(analyze_customer))
        .route("/api/chat", post(chat_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
