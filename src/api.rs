//! REST API server for the valuation toolkit
//!
//! Exposes the calculators, the valuation approaches and the raw record
//! tables over HTTP.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderValue, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::ValuationError;
use crate::execution::ApproachRunner;
use crate::models::ValuationApproach;
use crate::records::FinancialRecord;
use crate::store::{RecordStore, Table};
use crate::tools::{create_default_registry, ToolRegistry};

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub timestamp: String,
    pub request_id: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(request_id: Uuid, data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id: request_id.to_string(),
        }
    }

    pub fn error(request_id: Uuid, message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id: request_id.to_string(),
        }
    }
}

type ApiResult = (StatusCode, Json<ApiResponse>);

fn error_response(request_id: Uuid, err: &ValuationError) -> ApiResult {
    let status = match err {
        ValuationError::ToolNotFound(_) => StatusCode::NOT_FOUND,
        ValuationError::InvalidToolInput(_) | ValuationError::SerializationError(_) => {
            StatusCode::BAD_REQUEST
        }
        ValuationError::Fetch(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!(%request_id, error = %err, "Request failed");
    } else {
        warn!(%request_id, error = %err, "Request rejected");
    }

    (status, Json(ApiResponse::error(request_id, err.to_string())))
}

/// Empty bodies count as `{}`
fn parse_parameters(body: &Bytes) -> Result<Value, ValuationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    serde_json::from_slice(body)
        .map_err(|e| ValuationError::InvalidToolInput(format!("request body is not JSON: {}", e)))
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<ToolRegistry>,
    pub runner: Arc<ApproachRunner>,
    pub store: Arc<dyn RecordStore>,
}

impl ApiState {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        let registry = Arc::new(create_default_registry(store.clone()));
        Self {
            runner: Arc::new(ApproachRunner::new(registry.clone())),
            registry,
            store,
        }
    }
}

/// =============================
/// Service Endpoints
/// =============================

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Company Valuation API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "approaches": ValuationApproach::ALL
            .iter()
            .map(|a| json!({
                "id": a.as_str(),
                "name": a.to_string(),
                "tools": a.tools().map(|t| t.as_str()),
            }))
            .collect::<Vec<_>>(),
    }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn list_tools(State(state): State<ApiState>) -> ApiResult {
    let request_id = Uuid::new_v4();
    let tools: Vec<Value> = state
        .registry
        .list()
        .into_iter()
        .filter_map(|name| state.registry.get(name))
        .map(|tool| json!({"name": tool.name(), "description": tool.description()}))
        .collect();

    (StatusCode::OK, Json(ApiResponse::success(request_id, tools)))
}

/// =============================
/// Tool Execution
/// =============================

async fn run_tool(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult {
    let request_id = Uuid::new_v4();
    let name = name.trim().replace('-', "_");
    info!(%request_id, tool_name = %name, "Received tool request");

    let parameters = match parse_parameters(&body) {
        Ok(parameters) => parameters,
        Err(e) => return error_response(request_id, &e),
    };

    match state.registry.execute(&name, parameters).await {
        Ok(output) => {
            info!(%request_id, tool_name = %name, success = output.success, "Tool completed");
            (StatusCode::OK, Json(ApiResponse::success(request_id, output.data)))
        }
        Err(e) => error_response(request_id, &e),
    }
}

async fn run_approach(
    State(state): State<ApiState>,
    Path(approach): Path<String>,
    body: Bytes,
) -> ApiResult {
    let request_id = Uuid::new_v4();
    info!(%request_id, %approach, "Received approach request");

    let approach: ValuationApproach = match approach.parse() {
        Ok(approach) => approach,
        Err(message) => {
            warn!(%request_id, %message, "Unknown approach");
            return (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::error(request_id, message)),
            );
        }
    };

    let parameters = match parse_parameters(&body) {
        Ok(parameters) => parameters,
        Err(e) => return error_response(request_id, &e),
    };

    let observations = state.runner.run(approach, &parameters).await;

    (
        StatusCode::OK,
        Json(ApiResponse::success(
            request_id,
            json!({
                "approach": approach.as_str(),
                "name": approach.to_string(),
                "observations": observations,
            }),
        )),
    )
}

/// =============================
/// Record Tables
/// =============================

async fn list_table(State(state): State<ApiState>, Path(table): Path<String>) -> ApiResult {
    let request_id = Uuid::new_v4();

    let table: Table = match table.parse() {
        Ok(table) => table,
        Err(message) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::error(request_id, message)),
            )
        }
    };

    match state.store.fetch_table(table).await {
        Ok(records) => {
            info!(%request_id, %table, count = records.len(), "Listed table");
            let records: Vec<Value> = records.iter().map(FinancialRecord::to_value).collect();
            (StatusCode::OK, Json(ApiResponse::success(request_id, records)))
        }
        Err(e) => error_response(request_id, &ValuationError::from(e)),
    }
}

/// =============================
/// Router
/// =============================

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

pub fn create_router(state: ApiState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/tools", get(list_tools))
        .route("/api/tools/:name", post(run_tool))
        .route("/api/approaches/:approach", post(run_approach))
        .route("/api/tables/:table", get(list_table))
        .with_state(state)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    config: &AppConfig,
    store: Arc<dyn RecordStore>,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(ApiState::new(store), &config.cors_origins);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", config.port);
    info!("Local: http://127.0.0.1:{}", config.port);

    axum::serve(listener, router).await?;

    Ok(())
}
