use axum::routing::get;
use axum::{Json, Router};

use crate::services::tracking::{EnrichedSubjectView, TrackingStats};
use crate::state::AppState;

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct SubjectResponse {
    subject_id: String,
    display_name: String,
    email: Option<String>,
    contact_number: Option<String>,
    age: Option<u32>,
    gender: Option<String>,
    document_number: Option<String>,
    resolved_address: String,
    last_seen_at: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    risk_level: String,
    safety_score: u8,
}

impl From<&EnrichedSubjectView> for SubjectResponse {
    fn from(view: &EnrichedSubjectView) -> Self {
        Self {
            subject_id: view.subject_id.clone(),
            display_name: view.display_name.clone(),
            email: view.email.clone(),
            contact_number: view.contact_number.clone(),
            age: view.age,
            gender: view.gender.clone(),
            document_number: view.document_number.clone(),
            resolved_address: view.resolved_address.clone(),
            last_seen_at: view.last_seen_at.to_rfc3339(),
            latitude: view.coordinates.map(|point| point.latitude),
            longitude: view.coordinates.map(|point| point.longitude),
            risk_level: view.risk_level.as_str().to_string(),
            safety_score: view.safety_score,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct TrackingStatsResponse {
    active_subjects: usize,
    high_risk_subjects: usize,
    average_safety_score: Option<f64>,
}

impl From<TrackingStats> for TrackingStatsResponse {
    fn from(stats: TrackingStats) -> Self {
        Self {
            active_subjects: stats.active_subjects,
            high_risk_subjects: stats.high_risk_subjects,
            average_safety_score: stats.average_safety_score,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct TrackingFeedResponse {
    phase: String,
    revision: u64,
    subjects: Vec<SubjectResponse>,
    stats: TrackingStatsResponse,
    error: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/tracking/subjects",
    tag = "tracking",
    responses((status = 200, description = "Enriched roster, most recently seen first", body = TrackingFeedResponse))
)]
pub(crate) async fn list_tracked_subjects(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<TrackingFeedResponse> {
    let feed = state.tracking.borrow().clone();
    Json(TrackingFeedResponse {
        phase: feed.phase.as_str().to_string(),
        revision: feed.revision,
        subjects: feed.subjects.iter().map(SubjectResponse::from).collect(),
        stats: feed.stats.into(),
        error: feed.error,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/tracking/subjects", get(list_tracked_subjects))
}
