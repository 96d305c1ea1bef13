use crate::services::coalesce::FlightCache;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Address shown whenever a lookup fails or the geocoder has no name for the
/// position. Never cached, so a later lookup gets another chance upstream.
pub const UNKNOWN_LOCATION: &str = "Unknown location";

/// Reverse geocoder backed by a Nominatim-compatible endpoint. Resolved
/// addresses are memoized per quantized coordinate cell and concurrent
/// lookups for the same cell collapse into one upstream request. The API is
/// infallible: callers always get a displayable address.
pub struct GeocodeResolver {
    http: Client,
    base_url: String,
    timeout: Duration,
    user_agent: String,
    cache: FlightCache<GeocodeKey, String>,
}

/// Coordinates quantized to 1e-4 degrees (about 11 m), so jittery fixes from
/// the same spot hit the same cache cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeocodeKey {
    lat_e4: i64,
    lon_e4: i64,
}

impl GeocodeKey {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            lat_e4: (latitude * 10_000.0).round() as i64,
            lon_e4: (longitude * 10_000.0).round() as i64,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReversePayload {
    #[serde(default)]
    display_name: Option<String>,
}

impl GeocodeResolver {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        timeout: Duration,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            timeout,
            user_agent: user_agent.into(),
            cache: FlightCache::new(),
        }
    }

    pub async fn resolve(&self, latitude: f64, longitude: f64) -> String {
        if !latitude.is_finite() || !longitude.is_finite() {
            return UNKNOWN_LOCATION.to_string();
        }
        let key = GeocodeKey::new(latitude, longitude);
        let http = self.http.clone();
        let url = format!("{}/reverse", self.base_url);
        let timeout = self.timeout;
        let user_agent = self.user_agent.clone();
        let resolved = self
            .cache
            .fetch(key, move || async move {
                match lookup(http, url, latitude, longitude, timeout, user_agent).await {
                    Ok(address) => address,
                    Err(err) => {
                        tracing::warn!(
                            latitude,
                            longitude,
                            "reverse geocode failed: {err:#}"
                        );
                        None
                    }
                }
            })
            .await;
        resolved.unwrap_or_else(|| UNKNOWN_LOCATION.to_string())
    }

    pub fn cached_cells(&self) -> usize {
        self.cache.len()
    }
}

async fn lookup(
    http: Client,
    url: String,
    latitude: f64,
    longitude: f64,
    timeout: Duration,
    user_agent: String,
) -> Result<Option<String>> {
    let response = http
        .get(&url)
        .query(&[
            ("format", "json".to_string()),
            ("lat", latitude.to_string()),
            ("lon", longitude.to_string()),
            ("zoom", "14".to_string()),
            ("addressdetails", "1".to_string()),
        ])
        .header(reqwest::header::USER_AGENT, user_agent)
        .timeout(timeout)
        .send()
        .await
        .context("reverse geocode request failed")?;
    if !response.status().is_success() {
        anyhow::bail!("reverse geocode returned HTTP {}", response.status());
    }
    let payload: ReversePayload = response
        .json()
        .await
        .context("reverse geocode response was not valid json")?;
    Ok(payload
        .display_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty()))
}
