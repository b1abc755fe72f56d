pub mod balance;
pub mod game;
pub mod payment;

use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub store: String,
    pub uptime_secs: u64,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store_status = match state.transactions.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not reach the store");
            "disconnected"
        }
    };
    let healthy = store_status == "connected";

    let health_response = HealthStatus {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: store_status.to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    };

    // Return 503 if the store is down, 200 otherwise
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health_response))
}
