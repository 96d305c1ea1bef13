use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

/// Lookup cache for slow external fetches. Completed values are served from
/// memory, lookups already in flight are joined instead of duplicated, and a
/// failed lookup (`None`) is handed to everyone waiting on it but never
/// cached, so the next caller retries.
pub struct FlightCache<K, V> {
    inner: Mutex<CacheInner<K, V>>,
}

struct CacheInner<K, V> {
    ready: HashMap<K, V>,
    in_flight: HashMap<K, Flight<V>>,
    next_flight_id: u64,
}

struct Flight<V> {
    id: u64,
    future: Shared<BoxFuture<'static, Option<V>>>,
}

impl<V> Clone for Flight<V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            future: self.future.clone(),
        }
    }
}

impl<K, V> FlightCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                ready: HashMap::new(),
                in_flight: HashMap::new(),
                next_flight_id: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner<K, V>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Recovering lookup cache from poisoned lock");
                poisoned.into_inner()
            }
        }
    }

    pub fn peek(&self, key: &K) -> Option<V> {
        self.lock().ready.get(key).cloned()
    }

    pub fn insert(&self, key: K, value: V) {
        self.lock().ready.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.lock().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().ready.is_empty()
    }

    /// Returns the value for `key`, joining an in-flight lookup when one
    /// exists and starting `load` otherwise. The lock is never held across
    /// an await; `load` is only invoked to construct the future.
    pub async fn fetch<F, Fut>(&self, key: K, load: F) -> Option<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<V>> + Send + 'static,
    {
        let flight = {
            let mut inner = self.lock();
            if let Some(value) = inner.ready.get(&key) {
                return Some(value.clone());
            }
            match inner.in_flight.get(&key) {
                Some(flight) => flight.clone(),
                None => {
                    let flight = Flight {
                        id: inner.next_flight_id,
                        future: load().boxed().shared(),
                    };
                    inner.next_flight_id += 1;
                    inner.in_flight.insert(key.clone(), flight.clone());
                    flight
                }
            }
        };

        let Flight { id, future } = flight;
        let result = future.await;

        let mut inner = self.lock();
        // A late waiter must not evict a newer flight started after this
        // one failed, hence the id check.
        if inner.in_flight.get(&key).map(|flight| flight.id) == Some(id) {
            inner.in_flight.remove(&key);
        }
        if let Some(value) = &result {
            inner.ready.entry(key).or_insert_with(|| value.clone());
        }
        result
    }
}

impl<K, V> Default for FlightCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
