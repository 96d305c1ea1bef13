use axum::extract::{Path, Query};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::watch;

use crate::error::{map_store_error, AppError, AppResult};
use crate::services::alert_feed::AlertFeed;
use crate::state::AppState;
use crate::store::record::AlertRecord;
use crate::store::ResolveOutcome;

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct AlertResponse {
    alert_id: String,
    subject_id: String,
    subject_name: String,
    latitude: f64,
    longitude: f64,
    raised_at: String,
    is_active: bool,
    resolved_at: Option<String>,
}

impl From<&AlertRecord> for AlertResponse {
    fn from(record: &AlertRecord) -> Self {
        Self {
            alert_id: record.alert_id.clone(),
            subject_id: record.subject_id.clone(),
            subject_name: record.subject_name.clone(),
            latitude: record.coordinates.latitude,
            longitude: record.coordinates.longitude,
            raised_at: record.raised_at.to_rfc3339(),
            is_active: record.is_active,
            resolved_at: record.resolved_at.map(|mark| mark.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct AlertFeedResponse {
    phase: String,
    revision: u64,
    alerts: Vec<AlertResponse>,
    error: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize, utoipa::IntoParams)]
pub(crate) struct FeedQuery {
    #[param(minimum = 1, maximum = 250)]
    limit: Option<u32>,
}

fn feed_response(view: &watch::Receiver<AlertFeed>, limit: usize) -> AlertFeedResponse {
    let feed = view.borrow().clone();
    AlertFeedResponse {
        phase: feed.phase.as_str().to_string(),
        revision: feed.revision,
        alerts: feed
            .alerts
            .iter()
            .take(limit)
            .map(AlertResponse::from)
            .collect(),
        error: feed.error,
    }
}

#[utoipa::path(
    get,
    path = "/api/alerts/active",
    tag = "alerts",
    params(FeedQuery),
    responses((status = 200, description = "Active alerts, newest raised first", body = AlertFeedResponse))
)]
pub(crate) async fn list_active_alerts(
    axum::extract::State(state): axum::extract::State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Json<AlertFeedResponse> {
    let limit = query.limit.unwrap_or(100).clamp(1, 250) as usize;
    Json(feed_response(&state.active_alerts, limit))
}

#[utoipa::path(
    get,
    path = "/api/alerts/resolved",
    tag = "alerts",
    params(FeedQuery),
    responses((status = 200, description = "Resolved alerts, newest resolved first", body = AlertFeedResponse))
)]
pub(crate) async fn list_resolved_alerts(
    axum::extract::State(state): axum::extract::State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Json<AlertFeedResponse> {
    let limit = query.limit.unwrap_or(100).clamp(1, 250) as usize;
    Json(feed_response(&state.resolved_alerts, limit))
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct ResolveResponse {
    alert_id: String,
    status: String,
}

#[utoipa::path(
    post,
    path = "/api/alerts/{alert_id}/resolve",
    tag = "alerts",
    params(("alert_id" = String, Path, description = "Alert id")),
    responses(
        (status = 200, description = "Alert resolved or already resolved", body = ResolveResponse),
        (status = 404, description = "Alert not found"),
        (status = 502, description = "Store write failed")
    )
)]
pub(crate) async fn resolve_alert(
    axum::extract::State(state): axum::extract::State<AppState>,
    Path(alert_id): Path<String>,
) -> AppResult<Json<ResolveResponse>> {
    let alert_id = alert_id.trim();
    if alert_id.is_empty() {
        return Err(AppError::not_found("Alert not found"));
    }
    let outcome = state
        .lifecycle
        .resolve(alert_id)
        .await
        .map_err(map_store_error)?;
    let status = match outcome {
        ResolveOutcome::Resolved => "resolved",
        ResolveOutcome::AlreadyResolved => "already_resolved",
        ResolveOutcome::NotFound => return Err(AppError::not_found("Alert not found")),
    };
    Ok(Json(ResolveResponse {
        alert_id: alert_id.to_string(),
        status: status.to_string(),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/alerts/active", get(list_active_alerts))
        .route("/alerts/resolved", get(list_resolved_alerts))
        .route("/alerts/{alert_id}/resolve", post(resolve_alert))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::alert_feed::FeedPhase;
    use crate::store::record::Coordinates;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn record(id: &str, hour: u32) -> AlertRecord {
        AlertRecord {
            alert_id: id.to_string(),
            subject_id: "subject-1".to_string(),
            subject_name: "Asha Rai".to_string(),
            coordinates: Coordinates {
                latitude: 25.57,
                longitude: 91.89,
            },
            raised_at: Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap(),
            is_active: true,
            resolved_at: None,
        }
    }

    #[test]
    fn feed_response_applies_limit_and_maps_fields() {
        let feed = AlertFeed {
            phase: FeedPhase::Live,
            revision: 7,
            alerts: Arc::new(vec![record("alert-a", 10), record("alert-b", 9)]),
            error: None,
        };
        let (_tx, rx) = tokio::sync::watch::channel(feed);

        let response = feed_response(&rx, 1);
        assert_eq!(response.phase, "live");
        assert_eq!(response.revision, 7);
        assert_eq!(response.alerts.len(), 1);
        assert_eq!(response.alerts[0].alert_id, "alert-a");
        assert!(response.alerts[0]
            .raised_at
            .starts_with("2026-03-01T10:00:00"));
        assert_eq!(response.alerts[0].resolved_at, None);
    }

    #[tokio::test]
    async fn resolve_handler_reports_idempotent_outcomes() {
        let state = crate::test_support::test_state();

        let first = resolve_alert(
            axum::extract::State(state.clone()),
            Path("alert-active".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(first.0.status, "resolved");
        assert_eq!(first.0.alert_id, "alert-active");

        let second = resolve_alert(
            axum::extract::State(state.clone()),
            Path("alert-active".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(second.0.status, "already_resolved");

        let err = resolve_alert(axum::extract::State(state), Path("  ".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::NOT_FOUND);
    }
}
