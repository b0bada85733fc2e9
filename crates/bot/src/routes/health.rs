//! Keep-alive endpoints for the hosting platform's uptime pings

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub members: Option<usize>,
}

pub async fn keep_alive() -> &'static str {
    "PrimeBot is running"
}

/// Reports the member count when the store answers; a store outage still
/// returns 200 so the process is not restarted over it.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let members = match state.ctx.store.count().await {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not reach the store");
            None
        }
    };

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        members,
    })
}
