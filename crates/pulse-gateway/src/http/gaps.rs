//! Dashboard routes that are declared but not built yet.

use axum::{http::StatusCode, Json};
use pulse_protocol::frames::ErrorBody;

/// GET /v1/dashboard/gaps
pub async fn gaps_handler() -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(ErrorBody::not_implemented(
            "gap analysis for tenant event streams is not available yet",
        )),
    )
}

#[cfg(test)]
mod tests {
    use crate::app::{build_router, AppState};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use pulse_core::config::PulseConfig;
    use pulse_protocol::frames::ErrorBody;
    use tower::ServiceExt;

    #[tokio::test]
    async fn answers_not_implemented() {
        let resp = build_router(AppState::new(PulseConfig::default()))
            .oneshot(Request::get("/v1/dashboard/gaps").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.code, "not_implemented");
        assert!(!body.message.is_empty());
    }
}
