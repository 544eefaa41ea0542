//! Map session lifecycle: authenticate, initialize the surface, poll and
//! render, tear down.

use std::sync::{Arc, Mutex, MutexGuard};

use provenance_core::symbol::legend;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::{AuthError, SessionError};
use crate::feed::LocationFeed;
use crate::overlay::{OverlayOptions, OverlayRenderer};
use crate::surface::{Geometry, Graphic, MapControl, MapSurface};
use crate::task::{FirstTick, ScheduledTask};
use crate::token::{Token, TokenCache};

/// `Uninitialized -> Authenticating -> Ready -> (Polling <-> Rendering) -> Disposed`.
/// `Disposed` is reachable from every state and is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Authenticating,
    Ready,
    Polling,
    Rendering,
    Disposed,
}

/// State shared with the poll and refresh tasks.
struct Shared<S> {
    feed: Arc<dyn LocationFeed>,
    surface: Mutex<S>,
    renderer: Mutex<OverlayRenderer>,
    state: Mutex<SessionState>,
}

impl<S: MapSurface> Shared<S> {
    fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    fn set_state(&self, next: SessionState) {
        let mut st = lock(&self.state);
        if *st != SessionState::Disposed {
            *st = next;
        }
    }

    /// Moves `from -> to` or reports the state that blocked `op`.
    fn transition(&self, op: &'static str, from: SessionState, to: SessionState) -> Result<(), SessionError> {
        let mut st = lock(&self.state);
        if *st != from {
            return Err(SessionError::InvalidState { op, state: *st });
        }
        *st = to;
        Ok(())
    }

    /// One fetch-and-render cycle. A failed fetch leaves the previous render
    /// on the surface.
    async fn poll(&self) -> Result<usize, SessionError> {
        self.transition("poll", SessionState::Ready, SessionState::Polling)?;

        let snapshots = match self.feed.fetch_active_locations().await {
            Ok(s) => s,
            Err(e) => {
                warn!(kind = ?e.kind, error = %e, "feed fetch failed; keeping previous overlay");
                self.set_state(SessionState::Ready);
                return Err(e.into());
            }
        };

        // Disposal may have happened while the fetch was in flight.
        self.transition("render", SessionState::Polling, SessionState::Rendering)?;

        let rendered = {
            let mut surface = lock(&self.surface);
            let mut renderer = lock(&self.renderer);
            renderer.render(&mut *surface, &snapshots)
        };

        match rendered {
            Ok(n) => {
                self.set_state(SessionState::Ready);
                info!(batches = snapshots.len(), graphics = n, "overlay updated");
                Ok(n)
            }
            Err(e) => {
                error!(error = %e, "map surface failed; session needs re-initialization");
                self.set_state(SessionState::Uninitialized);
                Err(e.into())
            }
        }
    }

    fn push_token(&self, token: &Token) {
        if self.state() == SessionState::Disposed {
            return;
        }
        if let Err(e) = lock(&self.surface).update_token(&token.value) {
            warn!(error = %e, "could not hand renewed token to map surface");
        }
    }
}

/// Composes token cache, feed, renderer and surface for one map view.
///
/// Owns two cancellable tasks: token refresh and feed poll. Both are cancelled
/// before the surface is destroyed, and dropping the session stops them too.
pub struct MapSession<S: MapSurface> {
    tokens: Arc<TokenCache>,
    shared: Arc<Shared<S>>,
    config: SessionConfig,
    refresh_task: Option<ScheduledTask>,
    poll_task: Option<ScheduledTask>,
}

impl<S: MapSurface> MapSession<S> {
    pub fn new(tokens: Arc<TokenCache>, feed: Arc<dyn LocationFeed>, surface: S, config: SessionConfig) -> Self {
        let renderer = OverlayRenderer::new(OverlayOptions {
            draw_route_lines: config.draw_route_lines,
        });
        Self {
            tokens,
            shared: Arc::new(Shared {
                feed,
                surface: Mutex::new(surface),
                renderer: Mutex::new(renderer),
                state: Mutex::new(SessionState::Uninitialized),
            }),
            config,
            refresh_task: None,
            poll_task: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Graphics from the last successful render.
    pub fn graphics(&self) -> Vec<Graphic> {
        lock(&self.shared.renderer).graphics().to_vec()
    }

    /// Whether the refresh and poll tasks are currently scheduled.
    pub fn timers_active(&self) -> (bool, bool) {
        (self.refresh_task.is_some(), self.poll_task.is_some())
    }

    /// Authenticates, initializes the surface, and starts both timers.
    ///
    /// Fails closed: without a token the surface is never touched. Allowed from
    /// `Uninitialized`, including after a surface failure.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        self.shared
            .transition("start", SessionState::Uninitialized, SessionState::Authenticating)?;
        self.cancel_timers().await;

        let token = match self.authenticate().await {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, "map session authentication failed");
                self.shared.set_state(SessionState::Uninitialized);
                return Err(e.into());
            }
        };

        if let Err(e) = self.initialize_surface(&token) {
            error!(error = %e, "map surface initialization failed");
            self.shared.set_state(SessionState::Uninitialized);
            return Err(e.into());
        }

        self.shared.set_state(SessionState::Ready);
        info!("map session ready");
        self.spawn_timers();
        Ok(())
    }

    /// Runs one fetch-and-render cycle now.
    pub async fn poll_once(&self) -> Result<usize, SessionError> {
        self.shared.poll().await
    }

    /// Opens the popup of the `index`-th graphic from the last render.
    /// Returns `false` when there is no such graphic or it carries no popup.
    pub fn open_popup(&self, index: usize) -> Result<bool, SessionError> {
        let state = self.state();
        // The last render stays on screen while the next fetch is in flight.
        if !matches!(state, SessionState::Ready | SessionState::Polling) {
            return Err(SessionError::InvalidState { op: "open popup", state });
        }
        let Some(graphic) = lock(&self.shared.renderer).graphics().get(index).cloned() else {
            return Ok(false);
        };
        let at = match &graphic.geometry {
            Geometry::Point(p) => Some(*p),
            Geometry::Line(pts) => pts.last().copied(),
        };
        let (Some(at), Some(popup)) = (at, graphic.popup.as_ref()) else {
            return Ok(false);
        };
        lock(&self.shared.surface).show_popup(at, popup)?;
        Ok(true)
    }

    /// Cancels both timers, then releases the surface. Idempotent.
    pub async fn dispose(&mut self) {
        {
            let mut st = lock(&self.shared.state);
            if *st == SessionState::Disposed {
                return;
            }
            *st = SessionState::Disposed;
        }
        self.cancel_timers().await;
        lock(&self.shared.surface).destroy();
        lock(&self.shared.renderer).reset();
        info!("map session disposed");
    }

    /// A provider rejection gets one invalidate-and-retry; missing credentials
    /// do not.
    async fn authenticate(&self) -> Result<Token, AuthError> {
        match self.tokens.get_token().await {
            Ok(t) => Ok(t),
            Err(e @ AuthError::Provider { .. }) => {
                warn!(error = %e, "token rejected; invalidating and retrying once");
                self.tokens.invalidate().await;
                self.tokens.get_token().await
            }
            Err(e) => Err(e),
        }
    }

    fn initialize_surface(&self, token: &Token) -> Result<(), crate::error::RenderError> {
        let mut surface = lock(&self.shared.surface);
        surface.initialize(&token.value, &self.config.view)?;
        surface.add_control(MapControl::Zoom)?;
        surface.add_control(MapControl::Legend(legend()))?;
        Ok(())
    }

    fn spawn_timers(&mut self) {
        if let Some(period) = self.config.token_policy.refresh_interval {
            let tokens = Arc::clone(&self.tokens);
            let shared = Arc::clone(&self.shared);
            self.refresh_task = Some(ScheduledTask::spawn_every(
                "token-refresh",
                period,
                FirstTick::AfterPeriod,
                move || {
                    let tokens = Arc::clone(&tokens);
                    let shared = Arc::clone(&shared);
                    async move {
                        match tokens.refresh().await {
                            Ok(t) => shared.push_token(&t),
                            Err(e) => warn!(error = %e, "scheduled token refresh failed"),
                        }
                    }
                },
            ));
        }

        if let Some(period) = self.config.poll_interval {
            let shared = Arc::clone(&self.shared);
            self.poll_task = Some(ScheduledTask::spawn_every(
                "feed-poll",
                period,
                FirstTick::Immediate,
                move || {
                    let shared = Arc::clone(&shared);
                    async move {
                        // Feed and render failures are logged inside `poll`.
                        if let Err(e @ SessionError::InvalidState { .. }) = shared.poll().await {
                            debug!(error = %e, "poll tick skipped");
                        }
                    }
                },
            ));
        }
    }

    async fn cancel_timers(&mut self) {
        if let Some(t) = self.refresh_task.take() {
            t.cancel().await;
        }
        if let Some(t) = self.poll_task.take() {
            t.cancel().await;
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
