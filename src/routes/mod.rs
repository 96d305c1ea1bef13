pub mod alerts;
pub mod health;
pub mod tracking;

use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .nest(
            "/api",
            Router::new()
                .merge(alerts::router())
                .merge(tracking::router())
                .merge(crate::openapi::router()),
        )
        .with_state(state)
}

#[cfg(test)]
mod surface_tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use std::sync::OnceLock;
    use tower::ServiceExt;

    static STATE: OnceLock<AppState> = OnceLock::new();

    fn state() -> AppState {
        STATE.get_or_init(crate::test_support::test_state).clone()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn healthz_is_open() {
        let resp = router(state()).oneshot(get("/healthz")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn alert_views_respond_before_first_batch() {
        let resp = router(state())
            .oneshot(get("/api/alerts/active"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = router(state())
            .oneshot(get("/api/alerts/resolved?limit=5"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_limit_is_rejected() {
        let resp = router(state())
            .oneshot(get("/api/alerts/active?limit=abc"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn tracking_roster_responds() {
        let resp = router(state())
            .oneshot(get("/api/tracking/subjects"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn resolving_unknown_alert_is_not_found() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/alerts/no-such-alert/resolve")
            .body(Body::empty())
            .unwrap();
        let resp = router(state()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn resolving_seeded_alert_succeeds() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/alerts/alert-active/resolve")
            .body(Body::empty())
            .unwrap();
        let resp = router(state()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let resp = router(state())
            .oneshot(get("/api/openapi.json"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
