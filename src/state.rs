use crate::services::alert_feed::AlertFeed;
use crate::services::lifecycle::AlertLifecycle;
use crate::services::tracking::TrackingFeed;
use crate::store::Store;
use std::sync::Arc;
use tokio::sync::watch;

/// Shared state handed to every route. The feed receivers are cheap clones;
/// each carries the latest published snapshot even after the producing
/// service stops.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub lifecycle: Arc<AlertLifecycle>,
    pub active_alerts: watch::Receiver<AlertFeed>,
    pub resolved_alerts: watch::Receiver<AlertFeed>,
    pub tracking: watch::Receiver<TrackingFeed>,
}
