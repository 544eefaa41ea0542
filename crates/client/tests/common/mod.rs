#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use provenance_client::{AuthError, Clock, ExchangeGrant, FeedFetchError, LocationFeed, TokenExchange};
use provenance_core::model::{BatchSnapshot, BatchStatus, EventType, HistoryPoint};

pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn at(ms: i64) -> Self {
        Self(AtomicI64::new(ms))
    }

    pub fn advance(&self, d: Duration) {
        self.0.fetch_add(d.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counts exchanges; hands out `tok-1`, `tok-2`, ... unless a scripted failure is queued.
pub struct FakeExchange {
    pub calls: AtomicUsize,
    pub expires_in: u64,
    pub delay: Duration,
    failures: Mutex<VecDeque<AuthError>>,
}

impl FakeExchange {
    pub fn new(expires_in: u64) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            expires_in,
            delay: Duration::ZERO,
            failures: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_next(&self, err: AuthError) {
        self.failures.lock().unwrap().push_back(err);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenExchange for FakeExchange {
    async fn exchange(&self) -> Result<ExchangeGrant, AuthError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(ExchangeGrant {
            access_token: format!("tok-{n}"),
            expires_in_secs: self.expires_in,
        })
    }
}

/// Serves scripted results first, then `fallback` forever.
pub struct FakeFeed {
    pub calls: AtomicUsize,
    pub delay: Duration,
    scripted: Mutex<VecDeque<Result<Vec<BatchSnapshot>, FeedFetchError>>>,
    fallback: Vec<BatchSnapshot>,
}

impl FakeFeed {
    pub fn always(fallback: Vec<BatchSnapshot>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            scripted: Mutex::new(VecDeque::new()),
            fallback,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn then(&self, r: Result<Vec<BatchSnapshot>, FeedFetchError>) {
        self.scripted.lock().unwrap().push_back(r);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationFeed for FakeFeed {
    async fn fetch_active_locations(&self) -> Result<Vec<BatchSnapshot>, FeedFetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.scripted.lock().unwrap().pop_front() {
            Some(r) => r,
            None => Ok(self.fallback.clone()),
        }
    }
}

pub fn history(event: &str, lat: f64, lng: f64) -> HistoryPoint {
    HistoryPoint {
        event_type: EventType::parse(event),
        latitude: lat,
        longitude: lng,
        timestamp: Some("2024-05-01T10:00:00Z".into()),
        metadata: BTreeMap::new(),
    }
}

/// Batch B1: delivered, farm registration then final destination, no routes.
pub fn delivered_b1() -> BatchSnapshot {
    BatchSnapshot {
        batch_id: "B1".into(),
        status: BatchStatus::Delivered,
        history_points: vec![
            history("FARM_REGISTRATION", 18.52, 73.85),
            history("FINAL_DESTINATION", 19.07, 72.87),
        ],
        active_routes: vec![],
        weather: None,
    }
}

pub async fn serve(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}
