//! PulseBridge HTTP REST API
//!
//! Axum-based HTTP server exposing consultations, triage routing and single
//! specialist analyses. Runs alongside the Unix socket IPC server on port 8767
//! (configurable).
//!
//! Each endpoint has a thin axum handler that delegates to an inner function
//! returning `(StatusCode, serde_json::Value)`; the inner functions build a
//! `PulseRequest` and go through the same router as the IPC server.
//!
//! Endpoints:
//! - GET  /health  — coordinator and agent health
//! - GET  /version — server version info
//! - POST /consult — full consultation (waits for the final answer)
//! - POST /route   — triage routing only
//! - POST /analyze — one specialist analysis

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use pulse_core::ipc::{PulseRequest, PulseResponse};
use pulse_core::models::Specialty;
use pulse_core::protocol::PatientProfile;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::router::{self, AppContext};

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub ctx: AppContext,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/consult", post(consult_handler))
        .route("/route", post(route_handler))
        .route("/analyze", post(analyze_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(ctx: AppContext, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    let addr = format!("{}:{}", ctx.config.http.host, ctx.config.http.port);
    let state = Arc::new(HttpState { ctx });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("PulseBridge HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct ConsultRequest {
    pub message: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    #[serde(default)]
    pub history: Vec<String>,
}

impl ConsultRequest {
    /// Patient details, if any were supplied.
    fn patient(&self) -> Option<PatientProfile> {
        if self.age.is_none() && self.gender.is_none() && self.history.is_empty() {
            return None;
        }
        Some(PatientProfile {
            age: self.age,
            gender: self.gender.clone(),
            history: self.history.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RouteRequest {
    pub symptoms: Option<String>,
    pub age: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub specialty: Option<String>,
    pub symptoms: Option<String>,
    pub age: Option<u32>,
    #[serde(default)]
    pub history: Vec<String>,
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }

    fn body(msg: impl Into<String>) -> serde_json::Value {
        serde_json::json!(Self::new(msg))
    }
}

fn required(field: Option<String>, name: &str) -> std::result::Result<String, serde_json::Value> {
    match field {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ErrorResponse::body(format!("{} field is required", name))),
    }
}

// ============================================================================
// Inner business logic functions
// ============================================================================

/// Healthy is 200, anything degraded is 503 with the same body.
pub async fn health_inner(ctx: &AppContext) -> (StatusCode, serde_json::Value) {
    let response = router::handle_request(PulseRequest::Health, ctx).await;
    match response_to_http(response) {
        Ok(mut data) => {
            let healthy = data["status"] == "healthy";
            if let Some(obj) = data.as_object_mut() {
                obj.insert("version".to_string(), serde_json::json!(env!("CARGO_PKG_VERSION")));
                obj.insert(
                    "socket".to_string(),
                    serde_json::json!(ctx.config.service.socket_path),
                );
            }
            let status = if healthy {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            (status, data)
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e,
            }),
        ),
    }
}

pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "pulse/1",
    })
}

/// Runs a poll-mode consultation. A consultation that ends in a user-visible
/// error or timeout is still a 200 with `success: false`.
pub async fn consult_inner(ctx: &AppContext, req: ConsultRequest) -> (StatusCode, serde_json::Value) {
    let patient = req.patient();
    let message = match required(req.message, "message") {
        Ok(m) => m,
        Err(body) => return (StatusCode::BAD_REQUEST, body),
    };

    let start = Instant::now();
    let response =
        router::handle_request(PulseRequest::Consult { message, patient }, ctx).await;
    let took_ms = start.elapsed().as_millis() as u64;

    match response_to_http(response) {
        Ok(mut data) => {
            if let Some(obj) = data.as_object_mut() {
                obj.insert("took_ms".to_string(), serde_json::json!(took_ms));
            }
            (StatusCode::OK, data)
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::body(e)),
    }
}

pub async fn route_inner(ctx: &AppContext, req: RouteRequest) -> (StatusCode, serde_json::Value) {
    let symptoms = match required(req.symptoms, "symptoms") {
        Ok(s) => s,
        Err(body) => return (StatusCode::BAD_REQUEST, body),
    };

    let response = router::handle_request(PulseRequest::Route { symptoms, age: req.age }, ctx).await;
    match response_to_http(response) {
        Ok(data) => (StatusCode::OK, data),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, ErrorResponse::body(e)),
    }
}

pub async fn analyze_inner(ctx: &AppContext, req: AnalyzeRequest) -> (StatusCode, serde_json::Value) {
    let specialty = match required(req.specialty, "specialty") {
        Ok(s) => s,
        Err(body) => return (StatusCode::BAD_REQUEST, body),
    };
    if let Err(e) = specialty.parse::<Specialty>() {
        return (StatusCode::BAD_REQUEST, ErrorResponse::body(e.to_string()));
    }
    let symptoms = match required(req.symptoms, "symptoms") {
        Ok(s) => s,
        Err(body) => return (StatusCode::BAD_REQUEST, body),
    };

    let request = PulseRequest::Analyze {
        specialty,
        symptoms,
        age: req.age,
        history: req.history,
    };
    match response_to_http(router::handle_request(request, ctx).await) {
        Ok(data) => (StatusCode::OK, data),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, ErrorResponse::body(e)),
    }
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.ctx).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn consult_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<ConsultRequest>,
) -> impl IntoResponse {
    let (status, body) = consult_inner(&state.ctx, req).await;
    (status, Json(body))
}

pub async fn route_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<RouteRequest>,
) -> impl IntoResponse {
    let (status, body) = route_inner(&state.ctx, req).await;
    (status, Json(body))
}

pub async fn analyze_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<AnalyzeRequest>,
) -> impl IntoResponse {
    let (status, body) = analyze_inner(&state.ctx, req).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

/// Convert an IPC `PulseResponse` into an HTTP body value, or an error string.
pub fn response_to_http(response: PulseResponse) -> std::result::Result<serde_json::Value, String> {
    if response.status == "ok" {
        Ok(response.data.unwrap_or(serde_json::json!({})))
    } else {
        Err(response.error.unwrap_or_else(|| "unknown error".to_string()))
    }
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================
