//! Session lifecycle: silent token refresh and the pre-expiry warning.
//!
//! Tokens are issued with a fixed lifetime (30 minutes by convention with the
//! backend). The controller refreshes on a fixed interval a little short of
//! that and, independently, shows a one-shot warning at the same mark so the
//! user can extend explicitly. Both timers belong to a single cancellation
//! token; stopping the controller cancels them along with any refresh call
//! still in flight.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{TokenStore, UnauthorizedHandler};
use crate::api::{ApiError, AuthApi, Result};
use crate::view::{ViewHandle, ViewUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    pub refresh_interval: Duration,
    pub warning_after: Duration,
    /// How long the "session extended" notice stays up.
    pub extend_notice: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(25 * 60),
            warning_after: Duration::from_secs(25 * 60),
            extend_notice: Duration::from_secs(3),
        }
    }
}

#[derive(Default)]
struct Timers {
    cancel: Option<CancellationToken>,
    refresh: Option<JoinHandle<()>>,
    warning: Option<JoinHandle<()>>,
    warning_visible: bool,
}

struct Inner<A> {
    api: Arc<A>,
    tokens: TokenStore,
    view: ViewHandle,
    timings: SessionTimings,
    timers: Mutex<Timers>,
}

pub struct SessionLifecycle<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for SessionLifecycle<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A: AuthApi> SessionLifecycle<A> {
    pub fn new(api: Arc<A>, tokens: TokenStore, view: ViewHandle, timings: SessionTimings) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                tokens,
                view,
                timings,
                timers: Mutex::new(Timers::default()),
            }),
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    /// Authenticate, store the token and arm both timers.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let token = self.inner.api.login(username, password).await?;
        self.inner.tokens.set(token);
        info!(user = username, "logged in");
        self.start();
        Ok(())
    }

    /// Stop the timers, drop the token and ask for credentials again.
    pub fn logout(&self) {
        self.reset();
        self.inner.view.send(ViewUpdate::LoginRequired);
        info!("logged out");
    }

    /// Arm the refresh interval and the warning one-shot, replacing any that
    /// are already armed.
    pub fn start(&self) {
        let mut timers = self.inner.lock();
        disarm(&mut timers);

        let cancel = CancellationToken::new();
        timers.refresh = Some(tokio::spawn(refresh_loop(
            self.inner.clone(),
            cancel.clone(),
        )));
        timers.warning = Some(tokio::spawn(warning_timer(
            self.inner.clone(),
            cancel.clone(),
        )));
        timers.cancel = Some(cancel);
        debug!(
            refresh_secs = self.inner.timings.refresh_interval.as_secs(),
            warning_secs = self.inner.timings.warning_after.as_secs(),
            "session timers armed"
        );
    }

    /// Cancel both timers and any refresh in flight. The token is kept.
    pub fn stop(&self) {
        disarm(&mut self.inner.lock());
    }

    /// Back to the logged-out state: timers stopped, token dropped, warning
    /// cleared.
    pub fn reset(&self) {
        self.stop();
        self.inner.tokens.clear();
        self.clear_warning();
    }

    pub fn is_armed(&self) -> bool {
        self.inner.lock().cancel.is_some()
    }

    pub fn warning_visible(&self) -> bool {
        self.inner.lock().warning_visible
    }

    /// The "extend" action of the session warning.
    pub async fn extend_session(&self) -> Result<()> {
        let cancel = self.current_cancel();
        match self.inner.refresh(&cancel).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("session ended while extending");
                return Err(ApiError::NotAuthenticated);
            }
            Err(e) => {
                warn!(error = %e, "session extension failed");
                return Err(e);
            }
        }

        self.inner.lock().warning_visible = false;
        self.inner.view.send(ViewUpdate::SessionExtended);
        info!("session extended");

        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(inner.timings.extend_notice) => {
                    inner.view.send(ViewUpdate::SessionWarningCleared);
                }
            }
        });
        Ok(())
    }

    /// The "dismiss" action of the session warning.
    pub fn dismiss_warning(&self) {
        self.clear_warning();
    }

    fn clear_warning(&self) {
        self.inner.lock().warning_visible = false;
        self.inner.view.send(ViewUpdate::SessionWarningCleared);
    }

    fn current_cancel(&self) -> CancellationToken {
        self.inner
            .lock()
            .cancel
            .clone()
            .unwrap_or_default()
    }
}

impl<A: AuthApi> UnauthorizedHandler for SessionLifecycle<A> {
    fn handle_unauthorized(&self) {
        warn!("authorization rejected, session ended");
        self.stop();
        self.inner.tokens.clear();
        self.inner.view.send(ViewUpdate::LoginRequired);
        self.inner.view.send(ViewUpdate::Unauthenticated);
    }
}

impl<A> Inner<A> {
    fn lock(&self) -> MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<A: AuthApi> Inner<A> {
    /// Swap in a fresh token. `Ok(false)` when the session was stopped while
    /// the call was in flight and the new token was discarded.
    async fn refresh(&self, cancel: &CancellationToken) -> Result<bool> {
        let token = self.tokens.get().ok_or(ApiError::NotAuthenticated)?;
        let fresh = self.api.refresh_token(&token).await?;

        // Checked under the timer lock so a concurrent stop() wins.
        let _timers = self.lock();
        if cancel.is_cancelled() {
            return Ok(false);
        }
        self.tokens.set(fresh);
        Ok(true)
    }
}

fn disarm(timers: &mut Timers) {
    if let Some(cancel) = timers.cancel.take() {
        cancel.cancel();
    }
    for handle in [timers.refresh.take(), timers.warning.take()]
        .into_iter()
        .flatten()
    {
        handle.abort();
    }
}

async fn refresh_loop<A: AuthApi>(inner: Arc<Inner<A>>, cancel: CancellationToken) {
    let period = inner.timings.refresh_interval;
    let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticks.tick() => {}
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            result = inner.refresh(&cancel) => match result {
                Ok(true) => info!("token refreshed"),
                Ok(false) => debug!("session stopped during token refresh"),
                Err(ApiError::NotAuthenticated) => debug!("no token to refresh"),
                // Transient by assumption; the next tick tries again.
                Err(e) => warn!(error = %e, "token refresh failed, retrying next interval"),
            }
        }
    }
}

async fn warning_timer<A: AuthApi>(inner: Arc<Inner<A>>, cancel: CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(inner.timings.warning_after) => {
            inner.lock().warning_visible = true;
            inner.view.send(ViewUpdate::SessionWarningShown);
            info!("session expiring soon");
        }
    }
}
