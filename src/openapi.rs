use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::routes;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "TravelScape Operations API",
        description = "Live alert and tracking feeds for monitored travelers."
    ),
    paths(
        routes::health::healthz_handler,
        routes::alerts::list_active_alerts,
        routes::alerts::list_resolved_alerts,
        routes::alerts::resolve_alert,
        routes::tracking::list_tracked_subjects,
    ),
    components(schemas(
        routes::health::HealthResponse,
        routes::alerts::AlertResponse,
        routes::alerts::AlertFeedResponse,
        routes::alerts::ResolveResponse,
        routes::tracking::SubjectResponse,
        routes::tracking::TrackingStatsResponse,
        routes::tracking::TrackingFeedResponse,
    )),
    tags(
        (name = "alerts", description = "Alert lifecycle"),
        (name = "tracking", description = "Enriched tracking roster")
    )
)]
struct ApiDoc;

pub fn openapi_json() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

pub(crate) async fn openapi_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi_json())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_handler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_exported_path() {
        let doc = openapi_json();
        let paths = &doc.paths.paths;
        assert!(paths.contains_key("/healthz"));
        assert!(paths.contains_key("/api/alerts/active"));
        assert!(paths.contains_key("/api/alerts/resolved"));
        assert!(paths.contains_key("/api/alerts/{alert_id}/resolve"));
        assert!(paths.contains_key("/api/tracking/subjects"));
    }
}
