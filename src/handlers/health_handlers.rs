//! Health & readiness handlers.
//!
//! - GET /healthz      -> simple liveness ("ok")
//! - GET /api/healthz  -> readiness; pings storage

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

/// `GET /healthz`
///
/// Very small liveness probe — always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /api/healthz`
///
/// HTTP 200 `{"ok": true}` when storage answers, HTTP 503 `{"ok": false}`
/// otherwise. Independent of any paste.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let ok = state.pastes.ping().await;
    let status = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ReadyResponse { ok }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::paste_service::testing::harness;

    #[tokio::test]
    async fn liveness_is_always_ok() {
        assert_eq!(healthz().await.into_response().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_storage() {
        let h = harness().await;
        let state = AppState::new(h.service.clone(), "http://localhost:3000");

        let up = readyz(State(state.clone())).await.into_response();
        assert_eq!(up.status(), StatusCode::OK);

        h.store.db.close().await;
        let down = readyz(State(state)).await.into_response();
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
