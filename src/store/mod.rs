pub mod http;
pub mod memory;
pub mod record;

pub use http::HttpStore;
pub use memory::MemoryStore;
pub use record::{AlertRecord, Coordinates, ProfileRecord, TelemetryRecord};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One full assignment of a subscribed collection, tagged with the store
/// revision that produced it. Revisions are monotonically non-decreasing
/// within a subscription.
#[derive(Debug, Clone)]
pub struct ChangeBatch<T> {
    pub revision: u64,
    pub records: Vec<T>,
}

#[derive(Debug, Clone)]
pub struct StreamFault {
    /// Terminal faults mean no subscription could be established at all;
    /// non-terminal faults are followed by an internal resubscribe.
    pub terminal: bool,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum FeedEvent<T> {
    Batch(ChangeBatch<T>),
    Fault(StreamFault),
}

/// Which alert partition a subscription follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertFilter {
    Active,
    Resolved,
}

impl AlertFilter {
    pub fn is_active(self) -> bool {
        matches!(self, AlertFilter::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertFilter::Active => "active",
            AlertFilter::Resolved => "resolved",
        }
    }
}

/// Outcome of an alert resolution write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    Resolved,
    AlreadyResolved,
    NotFound,
}

/// A live subscription handle. Dropping it (or calling [`Subscription::cancel`])
/// releases the producer side; no further events are yielded afterwards.
pub struct Subscription<T> {
    events: mpsc::UnboundedReceiver<FeedEvent<T>>,
    cancel: CancellationToken,
}

impl<T> Subscription<T> {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<FeedEvent<T>>,
        cancel: CancellationToken,
    ) -> Self {
        Self { events, cancel }
    }

    /// Next event in delivery order. `None` once the subscription is
    /// cancelled or the producer is gone.
    pub async fn next_event(&mut self) -> Option<FeedEvent<T>> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.events.recv() => event,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Store backends. The HTTP gateway is the production backend; the in-memory
/// store backs demo mode and tests.
#[derive(Clone)]
pub enum Store {
    Http(HttpStore),
    Memory(MemoryStore),
}

impl Store {
    pub fn subscribe_alerts(&self, filter: AlertFilter) -> Subscription<AlertRecord> {
        match self {
            Store::Http(store) => store.subscribe_alerts(filter),
            Store::Memory(store) => store.subscribe_alerts(filter),
        }
    }

    pub fn subscribe_locations(&self) -> Subscription<TelemetryRecord> {
        match self {
            Store::Http(store) => store.subscribe_locations(),
            Store::Memory(store) => store.subscribe_locations(),
        }
    }

    pub async fn fetch_profile(&self, subject_id: &str) -> Result<Option<ProfileRecord>> {
        match self {
            Store::Http(store) => store.fetch_profile(subject_id).await,
            Store::Memory(store) => store.fetch_profile(subject_id).await,
        }
    }

    pub async fn resolve_alert(
        &self,
        alert_id: &str,
        resolved_at: DateTime<Utc>,
    ) -> Result<ResolveOutcome> {
        match self {
            Store::Http(store) => store.resolve_alert(alert_id, resolved_at).await,
            Store::Memory(store) => store.resolve_alert(alert_id, resolved_at).await,
        }
    }
}
