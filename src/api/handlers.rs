use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::alerts::{DispatchReport, DispatchStatsSnapshot, DispatchStatus, Dispatcher};
use crate::channels::DispatchOutcome;

/// Application state shared across handlers
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    /// Upper bound on handling one alert end to end
    pub dispatch_deadline: Duration,
}

// ============================================================================
// Alert Intake
// ============================================================================

#[derive(Debug, Serialize)]
pub struct AlertResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub outcomes: Vec<DispatchOutcome>,
}

impl AlertResponse {
    /// HTTP status and body for a dispatch report
    pub fn from_report(report: DispatchReport) -> (StatusCode, Self) {
        let (code, status, message) = match report.status {
            DispatchStatus::Rejected => (
                StatusCode::BAD_REQUEST,
                "error",
                report.detail.unwrap_or_else(|| "Invalid alert".to_string()),
            ),
            DispatchStatus::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Alert rate limited".to_string(),
            ),
            DispatchStatus::Success => (StatusCode::OK, "success", "Alert processed".to_string()),
            DispatchStatus::DeliveredNowhere => (
                StatusCode::ACCEPTED,
                "warning",
                "Alert received but no notifications were sent".to_string(),
            ),
            DispatchStatus::NoChannelsConfigured => (
                StatusCode::ACCEPTED,
                "warning",
                "Alert received but no notification channels are configured".to_string(),
            ),
        };

        (
            code,
            Self {
                status,
                message,
                outcomes: report.outcomes,
            },
        )
    }
}

/// Receive one alert.
///
/// The body is parsed here rather than by the `Json` extractor so that
/// malformed input gets the same response shape as a validation failure.
pub async fn receive_alert(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<AlertResponse>), ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::BadRequest("No data provided".to_string()));
    }

    let raw = match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(serde_json::Value::Object(map)) if !map.is_empty() => map,
        Ok(serde_json::Value::Object(_)) | Ok(serde_json::Value::Null) => {
            return Err(ApiError::BadRequest("No data provided".to_string()))
        }
        Ok(_) => {
            return Err(ApiError::BadRequest(
                "Alert must be a JSON object".to_string(),
            ))
        }
        Err(e) => return Err(ApiError::BadRequest(format!("Invalid JSON: {}", e))),
    };

    // A panic inside dispatch surfaces as a JoinError instead of tearing
    // down the connection
    let dispatcher = Arc::clone(&state.dispatcher);
    let mut task = tokio::spawn(async move { dispatcher.handle(raw).await });

    let report = match tokio::time::timeout(state.dispatch_deadline, &mut task).await {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Error processing alert");
            return Err(ApiError::Internal);
        }
        Err(_) => {
            tracing::error!(
                deadline = ?state.dispatch_deadline,
                "Alert dispatch exceeded deadline"
            );
            // Sends already in flight are not cancelled; record how they end
            tokio::spawn(async move {
                match task.await {
                    Ok(report) => tracing::warn!(
                        status = ?report.status,
                        "Alert dispatch finished after its deadline"
                    ),
                    Err(e) => tracing::error!(error = %e, "Alert dispatch failed after its deadline"),
                }
            });
            return Err(ApiError::Timeout);
        }
    };

    let (code, response) = AlertResponse::from_report(report);
    Ok((code, Json(response)))
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub version: &'static str,
    pub config: ChannelFlags,
}

#[derive(Serialize)]
pub struct ChannelFlags {
    pub email_enabled: bool,
    pub webhook_enabled: bool,
    pub rate_limiting_enabled: bool,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let dispatcher = &state.dispatcher;
    Json(HealthResponse {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION"),
        config: ChannelFlags {
            email_enabled: dispatcher.channel_enabled("email"),
            webhook_enabled: dispatcher.channel_enabled("webhook"),
            rate_limiting_enabled: dispatcher.limiter().is_enabled(),
        },
    })
}

// ============================================================================
// Stats
// ============================================================================

#[derive(Serialize)]
pub struct StatsResponse {
    pub alerts: DispatchStatsSnapshot,
    pub tracked_fingerprints: usize,
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        alerts: state.dispatcher.stats().snapshot(),
        tracked_fingerprints: state.dispatcher.limiter().tracked_fingerprints(),
    })
}

// ============================================================================
// Index
// ============================================================================

pub async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "alert-relay",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/alert": "POST - Send an alert",
            "/health": "GET - Health check",
            "/stats": "GET - Dispatch counters"
        }
    }))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Timeout,
    /// Details are logged, never returned
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "Alert dispatch timed out".to_string(),
            ),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = serde_json::json!({
            "status": "error",
            "message": message
        });

        (status, Json(body)).into_response()
    }
}
