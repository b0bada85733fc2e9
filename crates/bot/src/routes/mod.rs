//! HTTP routes

pub mod admin;
pub mod commands;
pub mod health;
pub mod sweep;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use subtle::ConstantTimeEq;

use crate::{error::ApiError, state::AppState};

pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/commands", post(commands::run_command))
        .route("/sweep", post(sweep::trigger_sweep))
        .route("/admin/invariants", get(admin::check_invariants))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/", get(health::keep_alive))
        .route("/health", get(health::health))
        .merge(protected)
        .with_state(state)
}

/// Middleware that requires `Authorization: Bearer <ADMIN_API_TOKEN>`
pub async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    match token {
        Some(token) if token_matches(token, &state.config.admin_api_token) => next.run(request).await,
        _ => {
            tracing::warn!(path = %request.uri().path(), "Rejected unauthenticated admin request");
            ApiError::Unauthorized.into_response()
        }
    }
}

fn token_matches(given: &str, expected: &str) -> bool {
    given.as_bytes().ct_eq(expected.as_bytes()).into()
}
