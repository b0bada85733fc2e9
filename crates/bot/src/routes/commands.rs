//! Operator command endpoint

use axum::{extract::State, Json};
use primebot_membership::{handle_command, Command, CommandOutcome, CommandRequest};

use crate::{error::ApiResult, state::AppState};

/// Validate and run one command
///
/// Validation happens before anything is touched, so a 400 never leaves a
/// partial change behind.
pub async fn run_command(
    State(state): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> ApiResult<Json<CommandOutcome>> {
    let action = request.action;
    let command = Command::try_from(request).inspect_err(|e| {
        tracing::info!(action = ?action, error = %e, "Rejected command");
    })?;

    let outcome = handle_command(&state.ctx, command, state.now()).await?;
    tracing::info!(action = ?action, "Command handled");
    Ok(Json(outcome))
}
