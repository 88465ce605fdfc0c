//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::time::Instant;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub database: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: menuchat_common::VERSION,
    })
}

/// Readiness probe - checks the database when one is attached
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let database = match &state.db {
        None => CheckResult {
            status: "skipped",
            latency_ms: None,
            error: None,
        },
        Some(db) => {
            let start = Instant::now();
            match db.ping().await {
                Ok(()) => CheckResult {
                    status: "up",
                    latency_ms: Some(start.elapsed().as_millis() as u64),
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Readiness check failed");
                    CheckResult {
                        status: "down",
                        latency_ms: None,
                        error: Some(e.to_string()),
                    }
                }
            }
        }
    };

    let ready = database.status != "down";
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status,
        Json(ReadyResponse {
            status: if ready { "ready" } else { "not_ready" },
            checks: HealthChecks { database },
        }),
    )
}
