#![forbid(unsafe_code)]

//! Headless map viewer: runs a map session against the gateway and writes the
//! overlay to a GeoJSON file after every render.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use provenance_client::config::period_from_minutes;
use provenance_client::{
    GatewayExchange, GeoJsonSurface, HttpLocationFeed, MapSession, SessionConfig, TokenCache,
    TokenPolicy,
};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "provenance-viewer", version, about = "Headless supply-chain provenance map")]
struct Args {
    /// Gateway base URL.
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    base_url: String,

    /// Output GeoJSON path, rewritten after every render.
    #[arg(long, default_value = "overlay.geojson")]
    out: PathBuf,

    /// Feed poll interval in seconds. 0 disables periodic polling.
    #[arg(long, default_value_t = 30)]
    poll_seconds: u64,

    /// Token refresh interval in minutes. 0 disables the refresh timer.
    #[arg(long, default_value_t = 55)]
    token_refresh_minutes: u64,

    /// Seconds subtracted from each token's lifetime.
    #[arg(long, default_value_t = 60)]
    token_margin_seconds: u64,

    /// HTTP request timeout in seconds.
    #[arg(long, default_value_t = 15)]
    timeout_seconds: u64,

    /// Also draw origin-destination route lines.
    #[arg(long, default_value_t = false)]
    draw_route_lines: bool,

    /// Render once and exit.
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Log level (env-filter syntax).
    #[arg(long, default_value = "info")]
    log: String,
}

fn non_zero(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.log))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = SessionConfig {
        base_url: args.base_url.clone(),
        poll_interval: if args.once { None } else { non_zero(args.poll_seconds) },
        request_timeout: Duration::from_secs(args.timeout_seconds),
        token_policy: TokenPolicy {
            safety_margin: Duration::from_secs(args.token_margin_seconds),
            refresh_interval: if args.once {
                None
            } else {
                period_from_minutes(args.token_refresh_minutes)
            },
            ..TokenPolicy::default()
        },
        draw_route_lines: args.draw_route_lines,
        ..SessionConfig::default()
    };

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .context("build http client")?;

    let tokens = Arc::new(TokenCache::new(
        Arc::new(GatewayExchange::new(http.clone(), &config.base_url)),
        config.token_policy.clone(),
    ));
    let feed = Arc::new(HttpLocationFeed::new(http, &config.base_url));
    let surface = GeoJsonSurface::new(&args.out);

    tracing::info!(base_url = %config.base_url, out = %args.out.display(), "viewer starting");

    let mut session = MapSession::new(tokens, feed, surface, config);
    session.start().await.context("start map session")?;

    if args.once {
        let result = session.poll_once().await;
        session.dispose().await;
        let n = result.context("render overlay")?;
        tracing::info!(graphics = n, "overlay written");
        return Ok(());
    }

    let _ = signal::ctrl_c().await;
    tracing::info!("shutdown requested");
    session.dispose().await;
    Ok(())
}
