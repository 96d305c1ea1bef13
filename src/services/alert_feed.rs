use crate::store::{AlertFilter, AlertRecord, FeedEvent, Store};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Lifecycle phase of a published view. `Failed` is terminal and distinct
/// from an empty `Live` view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPhase {
    Loading,
    Live,
    Failed,
}

impl FeedPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedPhase::Loading => "loading",
            FeedPhase::Live => "live",
            FeedPhase::Failed => "failed",
        }
    }
}

/// Immutable snapshot of one alert partition. Cheap to clone out of the
/// watch channel; the record list is shared.
#[derive(Debug, Clone)]
pub struct AlertFeed {
    pub phase: FeedPhase,
    pub revision: u64,
    pub alerts: Arc<Vec<AlertRecord>>,
    pub error: Option<String>,
}

impl AlertFeed {
    pub(crate) fn loading() -> Self {
        Self {
            phase: FeedPhase::Loading,
            revision: 0,
            alerts: Arc::new(Vec::new()),
            error: None,
        }
    }
}

/// Maintains the active and resolved alert views from the store's two alert
/// subscriptions. Every batch rebuilds the affected view from scratch; the
/// two views are published independently and may briefly sit one revision
/// apart.
pub struct AlertFeedService {
    store: Store,
    active_tx: watch::Sender<AlertFeed>,
    resolved_tx: watch::Sender<AlertFeed>,
}

impl AlertFeedService {
    pub fn new(store: Store) -> Self {
        let (active_tx, _) = watch::channel(AlertFeed::loading());
        let (resolved_tx, _) = watch::channel(AlertFeed::loading());
        Self {
            store,
            active_tx,
            resolved_tx,
        }
    }

    pub fn active_view(&self) -> watch::Receiver<AlertFeed> {
        self.active_tx.subscribe()
    }

    pub fn resolved_view(&self) -> watch::Receiver<AlertFeed> {
        self.resolved_tx.subscribe()
    }

    pub fn start(self, cancel: CancellationToken) {
        let Self {
            store,
            active_tx,
            resolved_tx,
        } = self;
        tokio::spawn(run_feed(
            store.clone(),
            AlertFilter::Active,
            active_tx,
            cancel.clone(),
        ));
        tokio::spawn(run_feed(store, AlertFilter::Resolved, resolved_tx, cancel));
    }
}

async fn run_feed(
    store: Store,
    filter: AlertFilter,
    tx: watch::Sender<AlertFeed>,
    cancel: CancellationToken,
) {
    let mut sub = store.subscribe_alerts(filter);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = sub.next_event() => {
                match event {
                    Some(FeedEvent::Batch(batch)) => {
                        let feed = build_feed(filter, batch.revision, batch.records);
                        tracing::debug!(
                            partition = filter.as_str(),
                            revision = feed.revision,
                            alerts = feed.alerts.len(),
                            "published alert view"
                        );
                        tx.send_replace(feed);
                    }
                    Some(FeedEvent::Fault(fault)) if fault.terminal => {
                        tracing::error!(
                            partition = filter.as_str(),
                            error = %fault.message,
                            "alert stream failed permanently"
                        );
                        tx.send_modify(|feed| {
                            feed.phase = FeedPhase::Failed;
                            feed.error = Some(fault.message.clone());
                        });
                    }
                    Some(FeedEvent::Fault(fault)) => {
                        tracing::warn!(
                            partition = filter.as_str(),
                            "alert stream interrupted: {}",
                            fault.message
                        );
                    }
                    None => break,
                }
            }
        }
    }
}

fn build_feed(filter: AlertFilter, revision: u64, mut records: Vec<AlertRecord>) -> AlertFeed {
    records.retain(|alert| alert.is_active == filter.is_active());
    match filter {
        AlertFilter::Active => records.sort_by(|a, b| {
            b.raised_at
                .cmp(&a.raised_at)
                .then_with(|| a.alert_id.cmp(&b.alert_id))
        }),
        AlertFilter::Resolved => records.sort_by(|a, b| {
            b.resolved_at
                .cmp(&a.resolved_at)
                .then_with(|| a.alert_id.cmp(&b.alert_id))
        }),
    }
    AlertFeed {
        phase: FeedPhase::Live,
        revision,
        alerts: Arc::new(records),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Coordinates, MemoryStore};
    use chrono::{DateTime, TimeZone, Utc};

    fn active_alert(alert_id: &str, raised_at: DateTime<Utc>) -> AlertRecord {
        AlertRecord {
            alert_id: alert_id.to_string(),
            subject_id: format!("subject-{alert_id}"),
            subject_name: String::new(),
            coordinates: Coordinates {
                latitude: 26.1,
                longitude: 91.7,
            },
            raised_at,
            is_active: true,
            resolved_at: None,
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, minute, 0).unwrap()
    }

    async fn wait_for<F>(rx: &mut watch::Receiver<AlertFeed>, mut pred: F) -> AlertFeed
    where
        F: FnMut(&AlertFeed) -> bool,
    {
        loop {
            {
                let feed = rx.borrow_and_update();
                if pred(&feed) {
                    return feed.clone();
                }
            }
            rx.changed().await.expect("alert feed channel closed");
        }
    }

    #[tokio::test]
    async fn active_view_sorts_newest_first_with_id_tiebreak() {
        let store = MemoryStore::new();
        store.insert_alert(active_alert("alert-a", at(10, 0)));
        store.insert_alert(active_alert("alert-c", at(10, 5)));
        store.insert_alert(active_alert("alert-b", at(10, 5)));

        let service = AlertFeedService::new(Store::Memory(store));
        let mut active = service.active_view();
        service.start(CancellationToken::new());

        let feed = wait_for(&mut active, |feed| feed.phase == FeedPhase::Live).await;
        let order: Vec<&str> = feed
            .alerts
            .iter()
            .map(|alert| alert.alert_id.as_str())
            .collect();
        assert_eq!(order, vec!["alert-b", "alert-c", "alert-a"]);
    }

    #[tokio::test]
    async fn resolution_moves_alerts_between_disjoint_views() {
        let store = MemoryStore::new();
        store.insert_alert(active_alert("alert-a", at(10, 0)));
        store.insert_alert(active_alert("alert-b", at(10, 5)));
        store.insert_alert(active_alert("alert-c", at(10, 10)));

        let service = AlertFeedService::new(Store::Memory(store.clone()));
        let mut active = service.active_view();
        let mut resolved = service.resolved_view();
        service.start(CancellationToken::new());

        wait_for(&mut active, |feed| feed.alerts.len() == 3).await;
        store.resolve_alert("alert-b", Utc::now()).await.unwrap();

        let active_feed = wait_for(&mut active, |feed| feed.alerts.len() == 2).await;
        let resolved_feed = wait_for(&mut resolved, |feed| feed.alerts.len() == 1).await;

        assert_eq!(active_feed.revision, resolved_feed.revision);
        assert_eq!(resolved_feed.alerts[0].alert_id, "alert-b");
        assert!(resolved_feed.alerts[0].resolved_at.is_some());
        for alert in resolved_feed.alerts.iter() {
            assert!(active_feed
                .alerts
                .iter()
                .all(|candidate| candidate.alert_id != alert.alert_id));
        }
    }

    #[tokio::test]
    async fn terminal_fault_marks_view_failed() {
        let store = MemoryStore::new();
        store.set_subscribe_fault("stream offline");

        let service = AlertFeedService::new(Store::Memory(store));
        let mut active = service.active_view();
        service.start(CancellationToken::new());

        let feed = wait_for(&mut active, |feed| feed.phase == FeedPhase::Failed).await;
        assert!(feed.alerts.is_empty());
        assert_eq!(feed.error.as_deref(), Some("stream offline"));
    }

    #[tokio::test]
    async fn cancellation_stops_publication() {
        let store = MemoryStore::new();
        store.insert_alert(active_alert("alert-a", at(10, 0)));

        let cancel = CancellationToken::new();
        let service = AlertFeedService::new(Store::Memory(store.clone()));
        let mut active = service.active_view();
        service.start(cancel.clone());

        wait_for(&mut active, |feed| feed.phase == FeedPhase::Live).await;
        cancel.cancel();

        // The producer drops its side on cancellation; no later store change
        // can reach this receiver.
        assert!(active.changed().await.is_err());
        store.insert_alert(active_alert("alert-z", at(11, 0)));
        assert_eq!(active.borrow().alerts.len(), 1);
    }
}
