use crate::services::coalesce::FlightCache;
use crate::store::{ProfileRecord, Store};

/// Joins subjects against the slow-changing profile collection. Successful
/// lookups are cached for the process lifetime; misses and faults are not,
/// so a profile registered after the first lookup still becomes visible.
pub struct ProfileDirectory {
    store: Store,
    cache: FlightCache<String, ProfileRecord>,
}

impl ProfileDirectory {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            cache: FlightCache::new(),
        }
    }

    pub async fn lookup(&self, subject_id: &str) -> Option<ProfileRecord> {
        if subject_id.trim().is_empty() {
            return None;
        }
        let store = self.store.clone();
        let id = subject_id.to_string();
        self.cache
            .fetch(id.clone(), move || async move {
                match store.fetch_profile(&id).await {
                    Ok(profile) => profile,
                    Err(err) => {
                        tracing::warn!(subject_id = %id, "profile lookup failed: {err:#}");
                        None
                    }
                }
            })
            .await
    }
}
