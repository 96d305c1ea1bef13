use crate::services::alert_feed::FeedPhase;
use crate::services::geocode::{GeocodeResolver, UNKNOWN_LOCATION};
use crate::services::profiles::ProfileDirectory;
use crate::services::risk::{RiskLevel, RiskModel};
use crate::store::{Coordinates, FeedEvent, Store, TelemetryRecord};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// One subject on the tracking roster. Identity fields come from the profile
/// join and stay empty when no profile exists; the entry itself is never
/// omitted.
#[derive(Debug, Clone)]
pub struct EnrichedSubjectView {
    pub subject_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub contact_number: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub document_number: Option<String>,
    pub resolved_address: String,
    pub last_seen_at: DateTime<Utc>,
    pub coordinates: Option<Coordinates>,
    pub risk_level: RiskLevel,
    pub safety_score: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingStats {
    pub active_subjects: usize,
    pub high_risk_subjects: usize,
    pub average_safety_score: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct TrackingFeed {
    pub phase: FeedPhase,
    pub revision: u64,
    pub subjects: Arc<Vec<EnrichedSubjectView>>,
    pub stats: TrackingStats,
    pub error: Option<String>,
}

impl TrackingFeed {
    pub(crate) fn loading() -> Self {
        Self {
            phase: FeedPhase::Loading,
            revision: 0,
            subjects: Arc::new(Vec::new()),
            stats: TrackingStats {
                active_subjects: 0,
                high_risk_subjects: 0,
                average_safety_score: None,
            },
            error: None,
        }
    }
}

/// Builds the enriched tracking roster from the live-location subscription.
/// Each batch is collapsed to the latest record per subject, enriched
/// concurrently (profile join + reverse geocode), and published atomically
/// once every record has finished. A batch interrupted by cancellation is
/// never published.
pub struct TrackingFeedService {
    store: Store,
    profiles: Arc<ProfileDirectory>,
    geocoder: Arc<GeocodeResolver>,
    risk: Arc<dyn RiskModel>,
    tx: watch::Sender<TrackingFeed>,
}

impl TrackingFeedService {
    pub fn new(
        store: Store,
        profiles: Arc<ProfileDirectory>,
        geocoder: Arc<GeocodeResolver>,
        risk: Arc<dyn RiskModel>,
    ) -> Self {
        let (tx, _) = watch::channel(TrackingFeed::loading());
        Self {
            store,
            profiles,
            geocoder,
            risk,
            tx,
        }
    }

    pub fn view(&self) -> watch::Receiver<TrackingFeed> {
        self.tx.subscribe()
    }

    pub fn start(self, cancel: CancellationToken) {
        tokio::spawn(self.run(cancel));
    }

    async fn run(self, cancel: CancellationToken) {
        let mut sub = self.store.subscribe_locations();
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = sub.next_event() => event,
            };
            match event {
                Some(FeedEvent::Batch(batch)) => {
                    let feed = tokio::select! {
                        _ = cancel.cancelled() => break,
                        feed = self.build_feed(batch.revision, batch.records) => feed,
                    };
                    tracing::debug!(
                        revision = feed.revision,
                        subjects = feed.subjects.len(),
                        "published tracking roster"
                    );
                    self.tx.send_replace(feed);
                }
                Some(FeedEvent::Fault(fault)) if fault.terminal => {
                    tracing::error!(error = %fault.message, "location stream failed permanently");
                    self.tx.send_modify(|feed| {
                        feed.phase = FeedPhase::Failed;
                        feed.error = Some(fault.message.clone());
                    });
                }
                Some(FeedEvent::Fault(fault)) => {
                    tracing::warn!("location stream interrupted: {}", fault.message);
                }
                None => break,
            }
        }
    }

    async fn build_feed(&self, revision: u64, records: Vec<TelemetryRecord>) -> TrackingFeed {
        let latest = latest_per_subject(records);
        let mut subjects = join_all(latest.into_iter().map(|record| self.enrich(record))).await;
        subjects.sort_by(|a, b| {
            b.last_seen_at
                .cmp(&a.last_seen_at)
                .then_with(|| a.subject_id.cmp(&b.subject_id))
        });
        let stats = compute_stats(&subjects);
        TrackingFeed {
            phase: FeedPhase::Live,
            revision,
            subjects: Arc::new(subjects),
            stats,
            error: None,
        }
    }

    async fn enrich(&self, record: TelemetryRecord) -> EnrichedSubjectView {
        let profile_lookup = self.profiles.lookup(&record.subject_id);
        let address_lookup = async {
            match record.coordinates {
                Some(coords) => self.geocoder.resolve(coords.latitude, coords.longitude).await,
                None => UNKNOWN_LOCATION.to_string(),
            }
        };
        let (profile, resolved_address) = futures::join!(profile_lookup, address_lookup);
        let assessment = self.risk.assess(&record, profile.as_ref());
        let display_name = profile
            .as_ref()
            .and_then(|p| p.display_name.clone())
            .unwrap_or_else(|| record.subject_name.clone());
        EnrichedSubjectView {
            subject_id: record.subject_id,
            display_name,
            email: profile.as_ref().and_then(|p| p.email.clone()),
            contact_number: profile.as_ref().and_then(|p| p.contact_number.clone()),
            age: profile.as_ref().and_then(|p| p.age),
            gender: profile.as_ref().and_then(|p| p.gender.clone()),
            document_number: profile.as_ref().and_then(|p| p.document_number.clone()),
            resolved_address,
            last_seen_at: record.reported_at,
            coordinates: record.coordinates,
            risk_level: assessment.level,
            safety_score: assessment.safety_score,
        }
    }
}

/// Collapses a batch to the newest record per subject; equal timestamps fall
/// back to the greater record id so replays pick a stable winner.
fn latest_per_subject(records: Vec<TelemetryRecord>) -> Vec<TelemetryRecord> {
    let mut latest: HashMap<String, TelemetryRecord> = HashMap::new();
    for record in records {
        match latest.get(&record.subject_id) {
            Some(existing) if !newer_than(&record, existing) => {}
            _ => {
                latest.insert(record.subject_id.clone(), record);
            }
        }
    }
    latest.into_values().collect()
}

fn newer_than(candidate: &TelemetryRecord, existing: &TelemetryRecord) -> bool {
    match candidate.reported_at.cmp(&existing.reported_at) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => candidate.record_id > existing.record_id,
    }
}

fn compute_stats(subjects: &[EnrichedSubjectView]) -> TrackingStats {
    let active_subjects = subjects.len();
    let high_risk_subjects = subjects
        .iter()
        .filter(|subject| subject.risk_level == RiskLevel::High)
        .count();
    let average_safety_score = if subjects.is_empty() {
        None
    } else {
        let total: f64 = subjects
            .iter()
            .map(|subject| f64::from(subject.safety_score))
            .sum();
        Some(total / active_subjects as f64)
    };
    TrackingStats {
        active_subjects,
        high_risk_subjects,
        average_safety_score,
    }
}
