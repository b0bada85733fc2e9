//! Manual sweep trigger

use axum::{extract::State, Json};
use primebot_membership::{run_daily_sweep, SweepReport};

use crate::{error::ApiResult, state::AppState};

/// Run the sweep now instead of waiting for the scheduled tick
pub async fn trigger_sweep(State(state): State<AppState>) -> ApiResult<Json<SweepReport>> {
    tracing::info!("Manual sweep triggered");
    let report = run_daily_sweep(&state.ctx, state.now()).await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use crate::routes::create_router;
    use crate::routes::test_support::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use primebot_membership::{MembershipRecord, MembershipStore, DAY_MS};
    use serde_json::Value;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_manual_sweep_expires_and_warns() {
        let (state, store) = state_with(vec![
            MembershipRecord::new("gone", NOW - 1),
            MembershipRecord::new("soon", NOW + DAY_MS),
            MembershipRecord::new("fine", NOW + 30 * DAY_MS),
        ]);
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::post("/sweep")
                    .header("authorization", format!("Bearer {}", TOKEN))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let report: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(report["checked"], 3);
        assert_eq!(report["expired"], 1);
        assert_eq!(report["warned"], 1);

        assert!(store.get("gone").await.unwrap().is_none());
        assert!(store.get("soon").await.unwrap().unwrap().warned);
        assert!(!store.get("fine").await.unwrap().unwrap().warned);
    }
}
