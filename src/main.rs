use anyhow::{Context, Result};
use clap::Parser;
use scape_server_rs::{cli, config, openapi, routes, services, state, store};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::CorsLayer;

async fn bind_listener(addr: &str) -> Result<TcpListener> {
    match TcpListener::bind(addr).await {
        Ok(listener) => Ok(listener),
        Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Failed to bind scape-server-rs listener on {addr}: port already in use. Stop the other service using this port or re-run with --port to choose another port.",
            );
        }
        Err(err) => {
            Err(err).with_context(|| format!("failed to bind scape-server-rs listener on {addr}"))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    if args.print_openapi {
        println!(
            "{}",
            serde_json::to_string_pretty(&openapi::openapi_json())?
        );
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = config::Config::from_env()?;
    let http = reqwest::Client::new();
    let cancel = CancellationToken::new();

    let store = if config.demo_mode {
        let memory = store::memory::MemoryStore::new();
        let demo = services::demo::DemoFeedService::new(
            memory.clone(),
            Duration::from_secs(config.demo_tick_seconds),
        );
        demo.seed();
        demo.start(cancel.clone());
        tracing::info!("demo mode: serving a simulated fleet from the in-memory store");
        store::Store::Memory(memory)
    } else {
        let base_url = config
            .store_base_url
            .clone()
            .context("SCAPE_STORE_BASE_URL must be set outside demo mode")?;
        store::Store::Http(store::http::HttpStore::new(
            http.clone(),
            base_url,
            Duration::from_secs(config.store_timeout_seconds),
            Duration::from_secs(config.store_retry_seconds),
        ))
    };

    let geocoder = Arc::new(services::geocode::GeocodeResolver::new(
        http.clone(),
        config.geocode_base_url.clone(),
        Duration::from_secs(config.geocode_timeout_seconds),
        config.geocode_user_agent.clone(),
    ));
    let profiles = Arc::new(services::profiles::ProfileDirectory::new(store.clone()));
    let lifecycle = Arc::new(services::lifecycle::AlertLifecycle::new(store.clone()));

    let alert_feeds = services::alert_feed::AlertFeedService::new(store.clone());
    let active_alerts = alert_feeds.active_view();
    let resolved_alerts = alert_feeds.resolved_view();
    alert_feeds.start(cancel.clone());

    let tracking_feed = services::tracking::TrackingFeedService::new(
        store.clone(),
        profiles,
        geocoder,
        Arc::new(services::risk::FixedRiskModel),
    );
    let tracking = tracking_feed.view();
    tracking_feed.start(cancel.clone());

    let state = state::AppState {
        store,
        lifecycle,
        active_alerts,
        resolved_alerts,
        tracking,
    };

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(20)
            .burst_size(60)
            .methods(vec![
                axum::http::Method::POST,
                axum::http::Method::PUT,
                axum::http::Method::DELETE,
            ])
            .use_headers()
            .finish()
            .context("failed to build rate limiter config")?,
    );

    let governor_limiter = governor_conf.limiter().clone();
    std::thread::spawn(move || loop {
        std::thread::sleep(std::time::Duration::from_secs(60));
        governor_limiter.retain_recent();
    });

    let app = routes::router(state)
        .layer(GovernorLayer::new(governor_conf))
        .layer(CorsLayer::permissive());
    let addr = format!("{}:{}", args.host, args.port);
    let listener = bind_listener(&addr).await?;
    tracing::info!("scape-server-rs listening on {addr}");

    let serve = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    tokio::select! {
        result = serve => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }
    cancel.cancel();
    Ok(())
}
