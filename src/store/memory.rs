use super::record::{AlertRecord, Coordinates, ProfileRecord, TelemetryRecord};
use super::{AlertFilter, ChangeBatch, FeedEvent, ResolveOutcome, StreamFault, Subscription};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// In-memory store backend. Mutations bump a global revision and push the
/// full matching set to every live watcher, which is the same contract the
/// HTTP gateway exposes. Also carries a few simulation knobs (latency, fault
/// injection, write counters) used by demo mode and tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    revision: u64,
    alerts: HashMap<String, AlertRecord>,
    locations: HashMap<String, TelemetryRecord>,
    profiles: HashMap<String, ProfileRecord>,
    alert_watchers: Vec<AlertWatcher>,
    location_watchers: Vec<mpsc::UnboundedSender<FeedEvent<TelemetryRecord>>>,
    subscribe_fault: Option<String>,
    resolve_latency: Duration,
    profile_latency: Duration,
    fail_resolves: u32,
    resolve_writes: u64,
}

struct AlertWatcher {
    filter: AlertFilter,
    tx: mpsc::UnboundedSender<FeedEvent<AlertRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Recovering in-memory store from poisoned lock");
                poisoned.into_inner()
            }
        }
    }

    pub fn subscribe_alerts(&self, filter: AlertFilter) -> Subscription<AlertRecord> {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let mut inner = self.lock();
        if let Some(message) = inner.subscribe_fault.clone() {
            let _ = tx.send(FeedEvent::Fault(StreamFault {
                terminal: true,
                message,
            }));
            return Subscription::new(rx, cancel);
        }
        let _ = tx.send(FeedEvent::Batch(alert_snapshot(&inner, filter)));
        inner.alert_watchers.push(AlertWatcher { filter, tx });
        Subscription::new(rx, cancel)
    }

    pub fn subscribe_locations(&self) -> Subscription<TelemetryRecord> {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let mut inner = self.lock();
        if let Some(message) = inner.subscribe_fault.clone() {
            let _ = tx.send(FeedEvent::Fault(StreamFault {
                terminal: true,
                message,
            }));
            return Subscription::new(rx, cancel);
        }
        let _ = tx.send(FeedEvent::Batch(location_snapshot(&inner)));
        inner.location_watchers.push(tx);
        Subscription::new(rx, cancel)
    }

    pub async fn fetch_profile(&self, subject_id: &str) -> Result<Option<ProfileRecord>> {
        let latency = self.lock().profile_latency;
        if latency > Duration::ZERO {
            tokio::time::sleep(latency).await;
        }
        Ok(self.lock().profiles.get(subject_id).cloned())
    }

    pub async fn resolve_alert(
        &self,
        alert_id: &str,
        resolved_at: DateTime<Utc>,
    ) -> Result<ResolveOutcome> {
        let latency = self.lock().resolve_latency;
        if latency > Duration::ZERO {
            tokio::time::sleep(latency).await;
        }
        let mut inner = self.lock();
        inner.resolve_writes += 1;
        if inner.fail_resolves > 0 {
            inner.fail_resolves -= 1;
            anyhow::bail!("injected resolve failure for alert {alert_id}");
        }
        let Some(alert) = inner.alerts.get_mut(alert_id) else {
            return Ok(ResolveOutcome::NotFound);
        };
        if !alert.is_active {
            return Ok(ResolveOutcome::AlreadyResolved);
        }
        alert.is_active = false;
        alert.resolved_at = Some(resolved_at);
        inner.revision += 1;
        broadcast_alerts(&mut inner);
        Ok(ResolveOutcome::Resolved)
    }

    pub fn insert_alert(&self, alert: AlertRecord) {
        let mut inner = self.lock();
        inner.alerts.insert(alert.alert_id.clone(), alert);
        inner.revision += 1;
        broadcast_alerts(&mut inner);
    }

    pub fn raise_alert(
        &self,
        subject_id: &str,
        subject_name: &str,
        coordinates: Coordinates,
    ) -> String {
        let alert_id = Uuid::new_v4().to_string();
        self.insert_alert(AlertRecord {
            alert_id: alert_id.clone(),
            subject_id: subject_id.to_string(),
            subject_name: subject_name.to_string(),
            coordinates,
            raised_at: Utc::now(),
            is_active: true,
            resolved_at: None,
        });
        alert_id
    }

    /// Upsert keyed by `record_id`; a stable id per subject gives the
    /// "latest position" semantics the live collection has upstream.
    pub fn push_location(&self, record: TelemetryRecord) {
        let mut inner = self.lock();
        inner.locations.insert(record.record_id.clone(), record);
        inner.revision += 1;
        broadcast_locations(&mut inner);
    }

    pub fn upsert_profile(&self, profile: ProfileRecord) {
        self.lock()
            .profiles
            .insert(profile.subject_id.clone(), profile);
    }

    pub fn alert(&self, alert_id: &str) -> Option<AlertRecord> {
        self.lock().alerts.get(alert_id).cloned()
    }

    pub fn active_alert_count(&self) -> usize {
        self.lock()
            .alerts
            .values()
            .filter(|alert| alert.is_active)
            .count()
    }

    /// Number of resolve operations issued to the store, successful or not.
    pub fn resolve_write_count(&self) -> u64 {
        self.lock().resolve_writes
    }

    /// Every new subscription receives an immediate terminal fault instead
    /// of a snapshot.
    pub fn set_subscribe_fault(&self, message: impl Into<String>) {
        self.lock().subscribe_fault = Some(message.into());
    }

    /// Delay applied before each resolve write lands.
    pub fn set_resolve_latency(&self, latency: Duration) {
        self.lock().resolve_latency = latency;
    }

    /// Delay applied before each profile fetch returns.
    pub fn set_profile_latency(&self, latency: Duration) {
        self.lock().profile_latency = latency;
    }

    /// The next `count` resolve writes fail with an error.
    pub fn fail_next_resolves(&self, count: u32) {
        self.lock().fail_resolves = count;
    }
}

fn alert_snapshot(inner: &MemoryInner, filter: AlertFilter) -> ChangeBatch<AlertRecord> {
    let records = inner
        .alerts
        .values()
        .filter(|alert| alert.is_active == filter.is_active())
        .cloned()
        .collect();
    ChangeBatch {
        revision: inner.revision,
        records,
    }
}

fn location_snapshot(inner: &MemoryInner) -> ChangeBatch<TelemetryRecord> {
    ChangeBatch {
        revision: inner.revision,
        records: inner.locations.values().cloned().collect(),
    }
}

fn broadcast_alerts(inner: &mut MemoryInner) {
    let active = alert_snapshot(inner, AlertFilter::Active);
    let resolved = alert_snapshot(inner, AlertFilter::Resolved);
    inner.alert_watchers.retain(|watcher| {
        let batch = match watcher.filter {
            AlertFilter::Active => active.clone(),
            AlertFilter::Resolved => resolved.clone(),
        };
        watcher.tx.send(FeedEvent::Batch(batch)).is_ok()
    });
}

fn broadcast_locations(inner: &mut MemoryInner) {
    let snapshot = location_snapshot(inner);
    inner
        .location_watchers
        .retain(|tx| tx.send(FeedEvent::Batch(snapshot.clone())).is_ok());
}
