//! Admin diagnostics

use axum::{
    extract::{Query, State},
    Json,
};
use primebot_membership::InvariantChecker;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct InvariantsQuery {
    /// Run only the named check
    pub check: Option<String>,
}

/// Response for membership invariant checks
#[derive(Debug, Serialize)]
pub struct InvariantsResponse {
    pub healthy: bool,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub violations: Vec<InvariantViolationResponse>,
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct InvariantViolationResponse {
    pub invariant: String,
    pub severity: String,
    pub description: String,
    pub user_ids: Vec<String>,
    pub context: serde_json::Value,
}

/// Run membership invariant checks
///
/// Checks that:
/// - Warned members are inside the warn window
/// - No lapsed member is still stored
/// - Allocation months are 1-12
/// - Allocation amounts are positive
pub async fn check_invariants(
    State(state): State<AppState>,
    Query(query): Query<InvariantsQuery>,
) -> ApiResult<Json<InvariantsResponse>> {
    let now = state.now();
    let checked_at = primebot_membership::clock::from_epoch_ms(now)?;
    let checker = InvariantChecker::new(state.ctx.store.as_ref(), state.ctx.settings.warn_window_ms);

    tracing::info!(check = ?query.check, "Admin checking membership invariants");

    let (checks_run, violations) = match query.check.as_deref() {
        Some(name) => {
            if !InvariantChecker::available_checks().contains(&name) {
                return Err(ApiError::BadRequest(format!("unknown check: {}", name)));
            }
            (1, checker.run_check(name, now).await?)
        }
        None => {
            let summary = checker.run_all_checks(now).await?;
            (summary.checks_run, summary.violations)
        }
    };

    let checks_failed = if violations.is_empty() {
        0
    } else {
        let mut names: Vec<&str> = violations.iter().map(|v| v.invariant.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names.len()
    };

    if checks_failed > 0 {
        tracing::warn!(checks_failed, "Membership invariants violated");
    }

    let violations = violations
        .into_iter()
        .map(|v| InvariantViolationResponse {
            invariant: v.invariant,
            severity: v.severity.to_string(),
            description: v.description,
            user_ids: v.user_ids,
            context: v.context,
        })
        .collect::<Vec<_>>();

    Ok(Json(InvariantsResponse {
        healthy: violations.is_empty(),
        checks_run,
        checks_passed: checks_run - checks_failed,
        checks_failed,
        violations,
        checked_at,
    }))
}
