mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::post, Form, Json, Router};
use common::{serve, FakeExchange, ManualClock};
use provenance_client::config::ProviderCredentials;
use provenance_client::{AuthError, ProviderExchange, TokenCache, TokenExchange, TokenPolicy};
use serde_json::json;

const T0: i64 = 1_700_000_000_000;

fn policy() -> TokenPolicy {
    TokenPolicy {
        safety_margin: Duration::from_secs(300),
        check_margin: Duration::ZERO,
        refresh_interval: None,
    }
}

fn cache(exchange: Arc<FakeExchange>, clock: Arc<ManualClock>) -> TokenCache {
    TokenCache::with_clock(exchange, policy(), clock)
}

#[tokio::test]
async fn two_calls_in_one_window_exchange_once() {
    let ex = Arc::new(FakeExchange::new(3600));
    let clock = Arc::new(ManualClock::at(T0));
    let cache = cache(Arc::clone(&ex), Arc::clone(&clock));

    let a = cache.get_token().await.unwrap();
    clock.advance(Duration::from_secs(600));
    let b = cache.get_token().await.unwrap();

    assert_eq!(ex.calls(), 1);
    assert_eq!(a, b);
    assert_eq!(a.expires_at_ms, T0 + 3300 * 1000);
}

#[tokio::test]
async fn expiry_triggers_exactly_one_new_exchange() {
    let ex = Arc::new(FakeExchange::new(3600));
    let clock = Arc::new(ManualClock::at(T0));
    let cache = cache(Arc::clone(&ex), Arc::clone(&clock));

    let first = cache.get_token().await.unwrap();
    clock.advance(Duration::from_secs(3300));
    let second = cache.get_token().await.unwrap();
    let third = cache.get_token().await.unwrap();

    assert_eq!(ex.calls(), 2);
    assert_ne!(first.value, second.value);
    assert_eq!(second, third);
    assert_eq!(second.expires_at_ms, T0 + 3300 * 1000 + 3300 * 1000);
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
    let ex = Arc::new(FakeExchange::new(3600).with_delay(Duration::from_millis(50)));
    let clock = Arc::new(ManualClock::at(T0));
    let cache = Arc::new(cache(Arc::clone(&ex), clock));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_token().await })
        })
        .collect();

    let mut values = Vec::new();
    for h in handles {
        values.push(h.await.unwrap().unwrap().value);
    }

    assert_eq!(ex.calls(), 1);
    assert_eq!(cache.exchange_count(), 1);
    assert!(values.iter().all(|v| v == "tok-1"));
}

#[tokio::test]
async fn racing_explicit_refreshes_coalesce() {
    let ex = Arc::new(FakeExchange::new(3600).with_delay(Duration::from_millis(50)));
    let cache = Arc::new(cache(Arc::clone(&ex), Arc::new(ManualClock::at(T0))));

    let c1 = Arc::clone(&cache);
    let c2 = Arc::clone(&cache);
    let (a, b) = tokio::join!(
        tokio::spawn(async move { c1.refresh().await }),
        tokio::spawn(async move { c2.refresh().await })
    );

    assert_eq!(ex.calls(), 1);
    assert_eq!(a.unwrap().unwrap(), b.unwrap().unwrap());
}

#[tokio::test]
async fn invalidate_forces_refresh() {
    let ex = Arc::new(FakeExchange::new(3600));
    let cache = cache(Arc::clone(&ex), Arc::new(ManualClock::at(T0)));

    cache.get_token().await.unwrap();
    cache.invalidate().await;
    assert!(cache.peek().await.is_none());
    let t = cache.get_token().await.unwrap();

    assert_eq!(ex.calls(), 2);
    assert_eq!(t.value, "tok-2");
}

#[tokio::test]
async fn failed_exchange_is_returned_and_retried_next_call() {
    let ex = Arc::new(FakeExchange::new(3600));
    ex.fail_next(AuthError::Provider {
        status: Some(400),
        message: "invalid_grant".into(),
    });
    let cache = cache(Arc::clone(&ex), Arc::new(ManualClock::at(T0)));

    let err = cache.get_token().await.unwrap_err();
    assert!(matches!(err, AuthError::Provider { status: Some(400), .. }));
    assert!(cache.peek().await.is_none());

    let t = cache.get_token().await.unwrap();
    assert_eq!(t.value, "tok-2");
}

#[tokio::test]
async fn lifetime_shorter_than_margin_is_immediately_stale() {
    let ex = Arc::new(FakeExchange::new(120));
    let cache = cache(Arc::clone(&ex), Arc::new(ManualClock::at(T0)));

    let t = cache.get_token().await.unwrap();
    assert_eq!(t.expires_at_ms, T0);
    cache.get_token().await.unwrap();
    assert_eq!(ex.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn refresh_timer_renews_on_cadence_and_stops_on_cancel() {
    let ex = Arc::new(FakeExchange::new(3600));
    let cache = Arc::new(TokenCache::new(
        ex.clone(),
        TokenPolicy {
            refresh_interval: Some(Duration::from_secs(55 * 60)),
            ..policy()
        },
    ));

    let timer = cache.spawn_refresh_timer().expect("timer enabled");
    tokio::time::sleep(Duration::from_secs(54 * 60)).await;
    assert_eq!(ex.calls(), 0);
    tokio::time::sleep(Duration::from_secs(2 * 60)).await;
    assert_eq!(ex.calls(), 1);

    timer.cancel().await;
    tokio::time::sleep(Duration::from_secs(3 * 55 * 60)).await;
    assert_eq!(ex.calls(), 1);
}

#[tokio::test]
async fn disabled_timer_is_not_spawned() {
    let cache = Arc::new(TokenCache::new(Arc::new(FakeExchange::new(3600)), policy()));
    assert!(cache.spawn_refresh_timer().is_none());
}

fn creds(token_url: String) -> ProviderCredentials {
    ProviderCredentials {
        client_id: "client".into(),
        client_secret: "secret".into(),
        refresh_token: "long-lived".into(),
        token_url,
    }
}

#[tokio::test]
async fn provider_exchange_posts_refresh_grant_form() {
    let app = Router::new().route(
        "/oauth2/token",
        post(|Form(form): Form<HashMap<String, String>>| async move {
            let ok = form.get("grant_type").map(String::as_str) == Some("refresh_token")
                && form.get("client_id").map(String::as_str) == Some("client")
                && form.get("client_secret").map(String::as_str) == Some("secret")
                && form.get("refresh_token").map(String::as_str) == Some("long-lived");
            if ok {
                Json(json!({ "access_token": "provider-token", "expires_in": 7200 }))
            } else {
                Json(json!({ "error": { "code": 400, "message": "bad form" } }))
            }
        }),
    );
    let base = serve(app).await;

    let ex = ProviderExchange::new(reqwest::Client::new(), Ok(creds(format!("{base}/oauth2/token"))));
    let cache = TokenCache::with_clock(Arc::new(ex), policy(), Arc::new(ManualClock::at(T0)));

    let t = cache.get_token().await.unwrap();
    assert_eq!(t.value, "provider-token");
    assert_eq!(t.expires_at_ms, T0 + (7200 - 300) * 1000);
}

#[tokio::test]
async fn provider_error_body_with_ok_status_is_a_provider_error() {
    let app = Router::new().route(
        "/oauth2/token",
        post(|| async { Json(json!({ "error": { "code": 498, "message": "Invalid refresh token" } })) }),
    );
    let base = serve(app).await;

    let ex = ProviderExchange::new(reqwest::Client::new(), Ok(creds(format!("{base}/oauth2/token"))));
    let err = TokenCache::new(Arc::new(ex), policy()).get_token().await.unwrap_err();

    assert_eq!(
        err,
        AuthError::Provider {
            status: Some(200),
            message: "Invalid refresh token".into()
        }
    );
}

#[tokio::test]
async fn provider_non_success_status_is_reported() {
    let app = Router::new().route(
        "/oauth2/token",
        post(|| async {
            (
                axum::http::StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "invalid_client", "error_description": "client revoked" })),
            )
        }),
    );
    let base = serve(app).await;

    let ex = ProviderExchange::new(reqwest::Client::new(), Ok(creds(format!("{base}/oauth2/token"))));
    let err = TokenCache::new(Arc::new(ex), policy()).get_token().await.unwrap_err();

    assert_eq!(
        err,
        AuthError::Provider {
            status: Some(401),
            message: "client revoked".into()
        }
    );
}

#[tokio::test]
async fn missing_credentials_fail_without_network() {
    let ex = ProviderExchange::new(
        reqwest::Client::new(),
        ProviderCredentials::from_lookup(|_| None),
    );
    assert!(!ex.is_configured());
    let err = TokenCache::new(Arc::new(ex), policy()).get_token().await.unwrap_err();
    assert!(matches!(err, AuthError::Config(ref m) if m.contains("MAP_PROVIDER_CLIENT_ID")));
}

#[tokio::test]
async fn gateway_exchange_maps_status_codes() {
    use axum::{http::StatusCode, routing::get};
    use provenance_client::GatewayExchange;

    let ok = serve(Router::new().route(
        "/api/refresh-token",
        get(|| async { Json(json!({ "access_token": "via-gateway", "expires_in": 3000 })) }),
    ))
    .await;
    let misconfigured = serve(Router::new().route(
        "/api/refresh-token",
        get(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "server misconfigured: MAP_PROVIDER_REFRESH_TOKEN not set" })),
            )
        }),
    ))
    .await;
    let rejected = serve(Router::new().route(
        "/api/refresh-token",
        get(|| async { (StatusCode::BAD_GATEWAY, Json(json!({ "error": "invalid_grant" }))) }),
    ))
    .await;

    let clock = Arc::new(ManualClock::at(T0));
    let cache = |base: &str| {
        TokenCache::with_clock(
            Arc::new(GatewayExchange::new(reqwest::Client::new(), base)),
            policy(),
            clock.clone(),
        )
    };

    let t = cache(ok.as_str()).get_token().await.unwrap();
    assert_eq!(t.value, "via-gateway");
    assert_eq!(t.expires_at_ms, T0 + (3000 - 300) * 1000);

    let err = cache(misconfigured.as_str()).get_token().await.unwrap_err();
    assert_eq!(err, AuthError::Config("MAP_PROVIDER_REFRESH_TOKEN not set".into()));
    assert_eq!(err.to_string(), "server misconfigured: MAP_PROVIDER_REFRESH_TOKEN not set");

    let err = cache(rejected.as_str()).get_token().await.unwrap_err();
    assert_eq!(
        err,
        AuthError::Provider {
            status: Some(502),
            message: "invalid_grant".into()
        }
    );
}

#[tokio::test]
async fn gateway_500_without_misconfigured_body_is_a_provider_error() {
    use axum::{http::StatusCode, routing::get};
    use provenance_client::GatewayExchange;

    let plain = serve(Router::new().route(
        "/api/refresh-token",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream crashed") }),
    ))
    .await;
    let other = serve(Router::new().route(
        "/api/refresh-token",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "disk full" }))) }),
    ))
    .await;

    let err = GatewayExchange::new(reqwest::Client::new(), &plain)
        .exchange()
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Provider { status: Some(500), .. }), "{err:?}");

    let err = GatewayExchange::new(reqwest::Client::new(), &other)
        .exchange()
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AuthError::Provider {
            status: Some(500),
            message: "disk full".into()
        }
    );
}
