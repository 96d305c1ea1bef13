use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use crate::config::Config;
use crate::services::alert_feed::AlertFeedService;
use crate::services::geocode::GeocodeResolver;
use crate::services::lifecycle::AlertLifecycle;
use crate::services::profiles::ProfileDirectory;
use crate::services::risk::FixedRiskModel;
use crate::services::tracking::TrackingFeedService;
use crate::state::AppState;
use crate::store::memory::MemoryStore;
use crate::store::record::{AlertRecord, Coordinates};
use crate::store::Store;

/// Offline endpoints so tests never touch the network.
pub fn test_config() -> Config {
    Config {
        store_base_url: None,
        store_timeout_seconds: 5,
        store_retry_seconds: 1,
        geocode_base_url: "http://127.0.0.1:9".to_string(),
        geocode_timeout_seconds: 1,
        geocode_user_agent: "travelscape-tests".to_string(),
        demo_mode: true,
        demo_tick_seconds: 5,
    }
}

pub fn seeded_store() -> MemoryStore {
    let store = MemoryStore::default();
    store.insert_alert(AlertRecord {
        alert_id: "alert-active".to_string(),
        subject_id: "subject-1".to_string(),
        subject_name: "Asha Rai".to_string(),
        coordinates: Coordinates {
            latitude: 25.57,
            longitude: 91.89,
        },
        raised_at: Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
        is_active: true,
        resolved_at: None,
    });
    store.insert_alert(AlertRecord {
        alert_id: "alert-resolved".to_string(),
        subject_id: "subject-2".to_string(),
        subject_name: "Dorji Phuntsho".to_string(),
        coordinates: Coordinates {
            latitude: 27.58,
            longitude: 91.85,
        },
        raised_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        is_active: false,
        resolved_at: Some(Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap()),
    });
    store
}

/// State for route tests. Feed services are constructed but never started, so
/// the views stay on their loading snapshot and the state carries no
/// background tasks; the lifecycle talks straight to the seeded store.
pub fn test_state() -> AppState {
    let config = test_config();
    let store = Store::Memory(seeded_store());
    let geocoder = Arc::new(GeocodeResolver::new(
        reqwest::Client::new(),
        config.geocode_base_url.clone(),
        Duration::from_secs(config.geocode_timeout_seconds),
        config.geocode_user_agent.clone(),
    ));
    let profiles = Arc::new(ProfileDirectory::new(store.clone()));
    let alert_feeds = AlertFeedService::new(store.clone());
    let tracking =
        TrackingFeedService::new(store.clone(), profiles, geocoder, Arc::new(FixedRiskModel));
    AppState {
        active_alerts: alert_feeds.active_view(),
        resolved_alerts: alert_feeds.resolved_view(),
        tracking: tracking.view(),
        lifecycle: Arc::new(AlertLifecycle::new(store.clone())),
        store,
    }
}
