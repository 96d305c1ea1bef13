use chrono::Utc;
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::store::memory::MemoryStore;
use crate::store::record::{AlertRecord, Coordinates, ProfileRecord, TelemetryRecord};

const MAX_ACTIVE_DEMO_ALERTS: usize = 3;
const ALERT_EVERY_N_TICKS: u64 = 7;
const DRIFT_DEGREES: f64 = 0.0015;

struct DemoSubject {
    subject_id: &'static str,
    name: &'static str,
    latitude: f64,
    longitude: f64,
}

fn fleet() -> Vec<DemoSubject> {
    vec![
        DemoSubject {
            subject_id: "demo-ananya",
            name: "Ananya Deb",
            latitude: 25.5788,
            longitude: 91.8933,
        },
        DemoSubject {
            subject_id: "demo-rohan",
            name: "Rohan Kalita",
            latitude: 26.5775,
            longitude: 93.1711,
        },
        DemoSubject {
            subject_id: "demo-mei",
            name: "Mei Lyngdoh",
            latitude: 25.2702,
            longitude: 91.7323,
        },
        DemoSubject {
            subject_id: "demo-tashi",
            name: "Tashi Wangmo",
            latitude: 27.5861,
            longitude: 91.8594,
        },
    ]
}

// demo-tashi is deliberately left unregistered so the roster shows a
// telemetry-only entry.
fn demo_profiles() -> Vec<ProfileRecord> {
    vec![
        ProfileRecord {
            subject_id: "demo-ananya".to_string(),
            display_name: Some("Ananya Deb".to_string()),
            email: Some("ananya.deb@example.com".to_string()),
            contact_number: Some("+91-98640-11223".to_string()),
            age: Some(29),
            gender: Some("female".to_string()),
            document_number: Some("P-4411876".to_string()),
        },
        ProfileRecord {
            subject_id: "demo-rohan".to_string(),
            display_name: Some("Rohan Kalita".to_string()),
            email: Some("rohan.kalita@example.com".to_string()),
            contact_number: None,
            age: Some(34),
            gender: Some("male".to_string()),
            document_number: Some("P-2209154".to_string()),
        },
        ProfileRecord {
            subject_id: "demo-mei".to_string(),
            display_name: Some("Mei Lyngdoh".to_string()),
            email: None,
            contact_number: Some("+91-96150-77841".to_string()),
            age: Some(41),
            gender: Some("female".to_string()),
            document_number: None,
        },
    ]
}

fn telemetry_for(subject: &DemoSubject) -> TelemetryRecord {
    TelemetryRecord {
        record_id: format!("loc-{}", subject.subject_id),
        subject_id: subject.subject_id.to_string(),
        subject_name: subject.name.to_string(),
        coordinates: Some(Coordinates {
            latitude: subject.latitude,
            longitude: subject.longitude,
        }),
        reported_at: Utc::now(),
    }
}

/// Feeds the in-memory store with a small fleet of fictional travelers so the
/// server has live data without an upstream store.
pub struct DemoFeedService {
    store: MemoryStore,
    interval: Duration,
}

impl DemoFeedService {
    pub fn new(store: MemoryStore, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Seeds profiles, starting positions, and one already-resolved alert so
    /// every view has data before the first tick.
    pub fn seed(&self) {
        for subject in fleet() {
            self.store.push_location(telemetry_for(&subject));
        }
        for profile in demo_profiles() {
            self.store.upsert_profile(profile);
        }
        let resolved_mark = Utc::now() - chrono::Duration::minutes(40);
        self.store.insert_alert(AlertRecord {
            alert_id: "demo-alert-resolved".to_string(),
            subject_id: "demo-rohan".to_string(),
            subject_name: "Rohan Kalita".to_string(),
            coordinates: Coordinates {
                latitude: 26.5775,
                longitude: 93.1711,
            },
            raised_at: resolved_mark - chrono::Duration::minutes(25),
            is_active: false,
            resolved_at: Some(resolved_mark),
        });
    }

    pub fn start(self, cancel: CancellationToken) {
        let store = self.store.clone();
        let interval = self.interval;
        tokio::spawn(async move {
            let mut subjects = fleet();
            let mut ticks: u64 = 0;
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        ticks += 1;
                        advance(&store, &mut subjects, ticks);
                    }
                }
            }
        });
    }
}

/// One simulation step: every subject drifts a little, and every seventh tick
/// raises an alert for a random subject while fewer than
/// `MAX_ACTIVE_DEMO_ALERTS` are active.
fn advance(store: &MemoryStore, subjects: &mut [DemoSubject], ticks: u64) {
    let mut rng = rand::thread_rng();
    for subject in subjects.iter_mut() {
        subject.latitude += rng.gen_range(-DRIFT_DEGREES..=DRIFT_DEGREES);
        subject.longitude += rng.gen_range(-DRIFT_DEGREES..=DRIFT_DEGREES);
        store.push_location(telemetry_for(subject));
    }
    if ticks % ALERT_EVERY_N_TICKS == 0 && store.active_alert_count() < MAX_ACTIVE_DEMO_ALERTS {
        let pick = rng.gen_range(0..subjects.len());
        let subject = &subjects[pick];
        let alert_id = store.raise_alert(
            subject.subject_id,
            subject.name,
            Coordinates {
                latitude: subject.latitude,
                longitude: subject.longitude,
            },
        );
        tracing::info!("demo alert {alert_id} raised for {}", subject.subject_id);
    }
}
