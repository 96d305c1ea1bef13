use super::record::{self, AlertRecord, ProfileRecord, TelemetryRecord};
use super::{AlertFilter, ChangeBatch, FeedEvent, ResolveOutcome, StreamFault, Subscription};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Client for the document-store gateway. Watch endpoints stream NDJSON
/// frames, one full matching set per line; point operations are plain JSON.
#[derive(Clone)]
pub struct HttpStore {
    http: Client,
    base_url: String,
    timeout: Duration,
    retry_delay: Duration,
}

impl HttpStore {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        timeout: Duration,
        retry_delay: Duration,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            timeout,
            retry_delay,
        }
    }

    pub fn subscribe_alerts(&self, filter: AlertFilter) -> Subscription<AlertRecord> {
        let url = format!("{}/v1/sos/watch", self.base_url);
        let query = vec![("isActive".to_string(), filter.is_active().to_string())];
        self.spawn_watch(url, query, filter.as_str(), record::normalize_alert)
    }

    pub fn subscribe_locations(&self) -> Subscription<TelemetryRecord> {
        let url = format!("{}/v1/live-locations/watch", self.base_url);
        self.spawn_watch(url, Vec::new(), "live-locations", record::normalize_telemetry)
    }

    pub async fn fetch_profile(&self, subject_id: &str) -> Result<Option<ProfileRecord>> {
        let url = format!("{}/v1/users/{subject_id}", self.base_url);
        let response = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .context("profile request failed")?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            anyhow::bail!("profile request returned HTTP {}", response.status());
        }
        let doc: JsonValue = response
            .json()
            .await
            .context("profile response was not valid json")?;
        Ok(Some(record::normalize_profile(subject_id, &doc)))
    }

    pub async fn resolve_alert(
        &self,
        alert_id: &str,
        resolved_at: DateTime<Utc>,
    ) -> Result<ResolveOutcome> {
        let url = format!("{}/v1/sos/{alert_id}", self.base_url);
        let body = serde_json::json!({
            "isActive": false,
            "resolvedAt": resolved_at.to_rfc3339(),
        });
        let response = self
            .http
            .patch(&url)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .context("resolve request failed")?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(ResolveOutcome::NotFound);
        }
        if !response.status().is_success() {
            anyhow::bail!("resolve request returned HTTP {}", response.status());
        }
        let doc: JsonValue = response.json().await.unwrap_or(JsonValue::Null);
        match doc.get("status").and_then(JsonValue::as_str) {
            Some("already_resolved") => Ok(ResolveOutcome::AlreadyResolved),
            _ => Ok(ResolveOutcome::Resolved),
        }
    }

    fn spawn_watch<T>(
        &self,
        url: String,
        query: Vec<(String, String)>,
        label: &'static str,
        normalize: fn(&JsonValue) -> Option<T>,
    ) -> Subscription<T>
    where
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let http = self.http.clone();
        let retry_delay = self.retry_delay;
        let token = cancel.clone();
        tokio::spawn(async move {
            loop {
                if token.is_cancelled() {
                    break;
                }
                match run_watch_once(&http, &url, &query, normalize, &tx, &token).await {
                    Ok(()) => break,
                    Err(WatchFailure::Terminal(message)) => {
                        tracing::error!(stream = label, error = %message, "watch failed permanently");
                        let _ = tx.send(FeedEvent::Fault(StreamFault {
                            terminal: true,
                            message,
                        }));
                        break;
                    }
                    Err(WatchFailure::Transient(err)) => {
                        tracing::warn!(stream = label, "watch interrupted, resubscribing: {err:#}");
                        let _ = tx.send(FeedEvent::Fault(StreamFault {
                            terminal: false,
                            message: format!("{err:#}"),
                        }));
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = tokio::time::sleep(retry_delay) => {}
                        }
                    }
                }
            }
        });
        Subscription::new(rx, cancel)
    }
}

enum WatchFailure {
    Terminal(String),
    Transient(anyhow::Error),
}

/// Runs one watch connection to completion. `Ok(())` means the subscription
/// was cancelled or the consumer went away; everything else is a failure the
/// outer loop classifies.
async fn run_watch_once<T>(
    http: &Client,
    url: &str,
    query: &[(String, String)],
    normalize: fn(&JsonValue) -> Option<T>,
    tx: &mpsc::UnboundedSender<FeedEvent<T>>,
    cancel: &CancellationToken,
) -> Result<(), WatchFailure> {
    let response = http.get(url).query(query).send().await.map_err(|err| {
        WatchFailure::Transient(anyhow::Error::new(err).context("watch request failed"))
    })?;
    let status = response.status();
    if status.is_client_error() {
        return Err(WatchFailure::Terminal(format!(
            "watch rejected by store: HTTP {status}"
        )));
    }
    if !status.is_success() {
        return Err(WatchFailure::Transient(anyhow::anyhow!(
            "watch returned HTTP {status}"
        )));
    }

    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            chunk = stream.next() => {
                match chunk {
                    Some(Ok(bytes)) => {
                        buffer.extend_from_slice(&bytes);
                        for line in drain_lines(&mut buffer) {
                            let Some(batch) = parse_frame(&line, normalize) else {
                                continue;
                            };
                            if tx.send(FeedEvent::Batch(batch)).is_err() {
                                return Ok(());
                            }
                        }
                    }
                    Some(Err(err)) => {
                        return Err(WatchFailure::Transient(
                            anyhow::Error::new(err).context("watch stream read failed"),
                        ));
                    }
                    None => {
                        return Err(WatchFailure::Transient(anyhow::anyhow!(
                            "watch stream ended"
                        )));
                    }
                }
            }
        }
    }
}

fn drain_lines(buffer: &mut Vec<u8>) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|byte| *byte == b'\n') {
        let mut line: Vec<u8> = buffer.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        lines.push(line);
    }
    lines
}

fn parse_frame<T>(line: &[u8], normalize: fn(&JsonValue) -> Option<T>) -> Option<ChangeBatch<T>> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    let frame: JsonValue = match serde_json::from_slice(line) {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!("skipping unparseable watch frame: {err}");
            return None;
        }
    };
    let revision = frame
        .get("revision")
        .and_then(JsonValue::as_u64)
        .unwrap_or(0);
    let records = frame
        .get("records")
        .and_then(JsonValue::as_array)
        .map(|docs| docs.iter().filter_map(normalize).collect())
        .unwrap_or_default();
    Some(ChangeBatch { revision, records })
}
