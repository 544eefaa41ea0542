#![forbid(unsafe_code)]

//! Provenance gateway: token endpoint and active-location feed for map viewers.

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use provenance_client::config::period_from_minutes;
use provenance_client::{ProviderExchange, TokenCache, TokenPolicy};
use provenance_gateway::{router, FileSnapshotSource};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "provenance-gateway", version)]
struct Args {
    /// Listen address, e.g. 127.0.0.1:3000
    #[arg(long, default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// JSON file served as the active-locations feed.
    #[arg(long, default_value = "fixtures/active-locations.json")]
    snapshot_file: PathBuf,

    /// Background token refresh interval in minutes. 0 disables it.
    #[arg(long, default_value_t = 55)]
    token_refresh_minutes: u64,

    /// Seconds subtracted from the provider's token lifetime.
    #[arg(long, default_value_t = 300)]
    safety_margin_secs: u64,

    /// Minimum remaining life, in seconds, of any token handed to a viewer.
    #[arg(long, default_value_t = 120)]
    min_remaining_secs: u64,

    /// Provider request timeout in seconds.
    #[arg(long, default_value_t = 15)]
    timeout_seconds: u64,

    /// Log level (env-filter syntax).
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.timeout_seconds))
        .build()
        .context("build http client")?;

    let exchange = ProviderExchange::from_env(http);
    if !exchange.is_configured() {
        // Keep serving the feed; the token endpoint reports the misconfiguration.
        tracing::warn!("map provider credentials missing; /api/refresh-token will fail");
    }

    let policy = TokenPolicy {
        safety_margin: Duration::from_secs(args.safety_margin_secs),
        check_margin: Duration::from_secs(args.min_remaining_secs),
        refresh_interval: period_from_minutes(args.token_refresh_minutes),
    };
    let tokens = Arc::new(TokenCache::new(Arc::new(exchange), policy));
    let refresh = tokens.spawn_refresh_timer();

    let source = Arc::new(FileSnapshotSource::new(&args.snapshot_file));
    let app = router(tokens, source)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!(listen = %args.listen, snapshot = %args.snapshot_file.display(), "gateway starting");
    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("bind {}", args.listen))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;

    if let Some(task) = refresh {
        task.cancel().await;
    }
    Ok(())
}
