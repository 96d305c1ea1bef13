use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;
use crate::store::Store;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
}

#[utoipa::path(
    get,
    path = "/healthz",
    responses((status = 200, description = "OK", body = HealthResponse))
)]
pub(crate) async fn healthz_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<HealthResponse> {
    let store = match state.store {
        Store::Http(_) => "http",
        Store::Memory(_) => "memory",
    };
    Json(HealthResponse {
        status: "ok".to_string(),
        store: store.to_string(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz_handler))
}
