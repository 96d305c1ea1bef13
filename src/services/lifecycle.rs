use crate::store::{ResolveOutcome, Store};
use anyhow::Result;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

type FlightOutcome = Result<ResolveOutcome, String>;

struct ResolveFlight {
    id: u64,
    future: Shared<BoxFuture<'static, FlightOutcome>>,
}

impl Clone for ResolveFlight {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            future: self.future.clone(),
        }
    }
}

/// Drives the open → resolved alert transition against the store.
///
/// Resolve is idempotent: an alert that is already resolved reports
/// `AlreadyResolved` and keeps its original resolution time. Concurrent
/// resolves for the same alert share a single in-flight store write and all
/// callers observe its outcome. Outcomes are never cached; the store stays
/// authoritative.
pub struct AlertLifecycle {
    store: Store,
    in_flight: Mutex<FlightMap>,
}

#[derive(Default)]
struct FlightMap {
    flights: HashMap<String, ResolveFlight>,
    next_flight_id: u64,
}

impl AlertLifecycle {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            in_flight: Mutex::new(FlightMap::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FlightMap> {
        match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Recovering resolve flight map from poisoned lock");
                poisoned.into_inner()
            }
        }
    }

    /// True while a resolve write for this alert is in flight; lets callers
    /// suppress the resolve affordance instead of queueing duplicates.
    pub fn is_resolving(&self, alert_id: &str) -> bool {
        self.lock().flights.contains_key(alert_id)
    }

    pub async fn resolve(&self, alert_id: &str) -> Result<ResolveOutcome> {
        let key = alert_id.to_string();
        let flight = {
            let mut map = self.lock();
            match map.flights.get(&key) {
                Some(flight) => flight.clone(),
                None => {
                    let store = self.store.clone();
                    let target = key.clone();
                    let flight = ResolveFlight {
                        id: map.next_flight_id,
                        future: async move {
                            store
                                .resolve_alert(&target, Utc::now())
                                .await
                                .map_err(|err| format!("{err:#}"))
                        }
                        .boxed()
                        .shared(),
                    };
                    map.next_flight_id += 1;
                    map.flights.insert(key.clone(), flight.clone());
                    flight
                }
            }
        };

        let ResolveFlight { id, future } = flight;
        let result = future.await;

        {
            let mut map = self.lock();
            if map.flights.get(&key).map(|flight| flight.id) == Some(id) {
                map.flights.remove(&key);
            }
        }

        match result {
            Ok(outcome) => {
                match outcome {
                    ResolveOutcome::Resolved => {
                        tracing::info!(alert_id = %key, "alert resolved");
                    }
                    ResolveOutcome::AlreadyResolved => {
                        tracing::debug!(alert_id = %key, "alert was already resolved");
                    }
                    ResolveOutcome::NotFound => {
                        tracing::warn!(alert_id = %key, "resolve requested for unknown alert");
                    }
                }
                Ok(outcome)
            }
            Err(message) => Err(anyhow::anyhow!("{message}")),
        }
    }
}
