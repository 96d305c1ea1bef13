use anyhow::{Context, Result};

const DEFAULT_GEOCODE_BASE_URL: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_GEOCODE_USER_AGENT: &str = "travelscape-server";

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the document-store gateway. Required unless demo mode is on.
    pub store_base_url: Option<String>,
    pub store_timeout_seconds: u64,
    pub store_retry_seconds: u64,
    pub geocode_base_url: String,
    pub geocode_timeout_seconds: u64,
    pub geocode_user_agent: String,
    pub demo_mode: bool,
    pub demo_tick_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let demo_mode = env_bool("SCAPE_DEMO_MODE", false);
        let store_base_url = env_optional_string("SCAPE_STORE_BASE_URL")
            .map(|value| validate_base_url(&value, "SCAPE_STORE_BASE_URL"))
            .transpose()?;
        if store_base_url.is_none() && !demo_mode {
            anyhow::bail!(
                "SCAPE_STORE_BASE_URL must be set for the live runtime (or enable SCAPE_DEMO_MODE)"
            );
        }
        let store_timeout_seconds = env_u64("SCAPE_STORE_TIMEOUT_SECONDS", 10).clamp(1, 120);
        let store_retry_seconds = env_u64("SCAPE_STORE_RETRY_SECONDS", 2).clamp(1, 300);

        let geocode_base_url = validate_base_url(
            &env_string("SCAPE_GEOCODE_BASE_URL", DEFAULT_GEOCODE_BASE_URL),
            "SCAPE_GEOCODE_BASE_URL",
        )?;
        let geocode_timeout_seconds = env_u64("SCAPE_GEOCODE_TIMEOUT_SECONDS", 12).clamp(1, 120);
        let geocode_user_agent =
            env_string("SCAPE_GEOCODE_USER_AGENT", DEFAULT_GEOCODE_USER_AGENT);

        let demo_tick_seconds = env_u64("SCAPE_DEMO_TICK_SECONDS", 5).clamp(1, 3600);

        Ok(Self {
            store_base_url,
            store_timeout_seconds,
            store_retry_seconds,
            geocode_base_url,
            geocode_timeout_seconds,
            geocode_user_agent,
            demo_mode,
            demo_tick_seconds,
        })
    }
}

fn validate_base_url(value: &str, label: &str) -> Result<String> {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        anyhow::bail!("{label} resolved to an empty value");
    }
    let parsed = url::Url::parse(trimmed)
        .with_context(|| format!("{label} is not a valid URL ({trimmed})"))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("{label} must use http or https");
    }
    if parsed.host_str().is_none() {
        anyhow::bail!("{label} must include a host");
    }
    Ok(trimmed.to_string())
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_optional_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key)
        .ok()
        .map(|value| value.trim().to_lowercase())
    {
        Some(value) if value == "1" || value == "true" || value == "yes" => true,
        Some(value) if value == "0" || value == "false" || value == "no" => false,
        _ => default,
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}
