//! Cached provider access token with single-flight renewal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::TokenPolicy;
use crate::error::AuthError;
use crate::task::{FirstTick, ScheduledTask};

/// Bearer token for the mapping provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    /// Safety margin already subtracted.
    pub expires_at_ms: i64,
}

impl Token {
    pub fn is_usable(&self, now_ms: i64, margin_ms: i64) -> bool {
        now_ms < self.expires_at_ms - margin_ms
    }

    /// Whole seconds left before the token stops being usable.
    pub fn remaining_secs(&self, now_ms: i64) -> u64 {
        ((self.expires_at_ms - now_ms).max(0) / 1000) as u64
    }
}

/// Source of "now". Swapped for a manual clock in tests.
pub trait Clock: Send + Sync + 'static {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        provenance_core::now_ms()
    }
}

/// What a successful exchange hands back before expiry arithmetic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeGrant {
    pub access_token: String,
    pub expires_in_secs: u64,
}

/// One network round trip that produces a fresh access token.
#[async_trait]
pub trait TokenExchange: Send + Sync + 'static {
    async fn exchange(&self) -> Result<ExchangeGrant, AuthError>;
}

/// Owns at most one access token and renews it on demand.
///
/// Renewal runs under the cache lock, so callers arriving while a refresh is in
/// flight wait for it and reuse its result instead of starting another.
pub struct TokenCache {
    exchange: Arc<dyn TokenExchange>,
    clock: Arc<dyn Clock>,
    policy: TokenPolicy,
    slot: Mutex<Option<Token>>,
    generation: AtomicU64,
    exchanges: AtomicU64,
}

impl TokenCache {
    pub fn new(exchange: Arc<dyn TokenExchange>, policy: TokenPolicy) -> Self {
        Self::with_clock(exchange, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(exchange: Arc<dyn TokenExchange>, policy: TokenPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            exchange,
            clock,
            policy,
            slot: Mutex::new(None),
            generation: AtomicU64::new(0),
            exchanges: AtomicU64::new(0),
        }
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Number of exchange calls issued so far.
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::SeqCst)
    }

    /// Returns the cached token while usable, otherwise refreshes.
    pub async fn get_token(&self) -> Result<Token, AuthError> {
        let mut slot = self.slot.lock().await;
        if let Some(tok) = slot.as_ref() {
            if tok.is_usable(self.clock.now_ms(), self.check_margin_ms()) {
                return Ok(tok.clone());
            }
        }
        self.exchange_into(&mut slot).await
    }

    /// Exchanges credentials for a new token and replaces the cached one.
    ///
    /// If another refresh completed while this call waited for the lock, its
    /// token is returned instead of issuing a second exchange.
    pub async fn refresh(&self) -> Result<Token, AuthError> {
        let seen = self.generation.load(Ordering::SeqCst);
        let mut slot = self.slot.lock().await;
        if self.generation.load(Ordering::SeqCst) != seen {
            if let Some(tok) = slot.as_ref() {
                return Ok(tok.clone());
            }
        }
        self.exchange_into(&mut slot).await
    }

    /// Drops the cached token; the next `get_token` refreshes.
    pub async fn invalidate(&self) {
        let mut slot = self.slot.lock().await;
        if slot.take().is_some() {
            info!("access token invalidated");
        }
    }

    /// Current cached token, usable or not, without refreshing.
    pub async fn peek(&self) -> Option<Token> {
        self.slot.lock().await.clone()
    }

    /// Refreshes on the policy's cadence until the returned task is cancelled.
    /// Returns `None` when the policy disables the timer.
    pub fn spawn_refresh_timer(self: &Arc<Self>) -> Option<ScheduledTask> {
        let period = self.policy.refresh_interval?;
        let cache = Arc::clone(self);
        Some(ScheduledTask::spawn_every(
            "token-refresh",
            period,
            FirstTick::AfterPeriod,
            move || {
                let cache = Arc::clone(&cache);
                async move {
                    if let Err(e) = cache.refresh().await {
                        warn!(error = %e, "background token refresh failed");
                    }
                }
            },
        ))
    }

    fn check_margin_ms(&self) -> i64 {
        duration_ms(self.policy.check_margin)
    }

    async fn exchange_into(&self, slot: &mut Option<Token>) -> Result<Token, AuthError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        let grant = self.exchange.exchange().await?;

        let margin_secs = self.policy.safety_margin.as_secs();
        if grant.expires_in_secs <= margin_secs {
            warn!(
                expires_in = grant.expires_in_secs,
                margin = margin_secs,
                "provider token lifetime shorter than safety margin"
            );
        }
        let usable_secs = grant.expires_in_secs.saturating_sub(margin_secs);
        let now = self.clock.now_ms();
        let token = Token {
            value: grant.access_token,
            expires_at_ms: now.saturating_add((usable_secs as i64).saturating_mul(1000)),
        };

        *slot = Some(token.clone());
        self.generation.fetch_add(1, Ordering::SeqCst);
        info!(expires_at_ms = token.expires_at_ms, "access token refreshed");
        Ok(token)
    }
}

fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
