//! Periodic re-fetch of whatever node data the visible section shows.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{self, NodeApi};
use crate::auth::{TokenStore, UnauthorizedHandler};
use crate::nodes::{DashboardStats, NodeRecord};
use crate::progress::ListingRefresh;
use crate::view::{ViewHandle, ViewUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Section {
    #[default]
    Dashboard,
    EdgeNodes,
    IotNodes,
    /// Anything without node data (deployment, settings, ...).
    Other,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::Dashboard,
        Section::EdgeNodes,
        Section::IotNodes,
        Section::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Dashboard => "dashboard",
            Section::EdgeNodes => "edge-nodes",
            Section::IotNodes => "iot-nodes",
            Section::Other => "other",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown section '{0}' (expected dashboard, edge, iot or other)")]
pub struct UnknownSection(String);

impl FromStr for Section {
    type Err = UnknownSection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "dashboard" | "home" => Ok(Section::Dashboard),
            "edge" | "edge-nodes" => Ok(Section::EdgeNodes),
            "iot" | "iot-nodes" => Ok(Section::IotNodes),
            "other" => Ok(Section::Other),
            _ => Err(UnknownSection(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collection {
    Edge,
    Iot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Stored,
    Failed,
    Unauthorized,
}

#[derive(Default)]
struct Cache {
    edge: Vec<NodeRecord>,
    iot: Vec<NodeRecord>,
}

struct Timer {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Inner<A> {
    api: Arc<A>,
    tokens: TokenStore,
    view: ViewHandle,
    unauthorized: Arc<dyn UnauthorizedHandler>,
    interval: Duration,
    section: Mutex<Section>,
    cache: Mutex<Cache>,
    timer: Mutex<Option<Timer>>,
}

/// Keeps the visible node data fresh while a session exists.
pub struct ViewRefreshCoordinator<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for ViewRefreshCoordinator<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A: NodeApi> ViewRefreshCoordinator<A> {
    pub fn new(
        api: Arc<A>,
        tokens: TokenStore,
        view: ViewHandle,
        unauthorized: Arc<dyn UnauthorizedHandler>,
        interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                tokens,
                view,
                unauthorized,
                interval,
                section: Mutex::new(Section::default()),
                cache: Mutex::new(Cache::default()),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Arm the auto-refresh interval, replacing a previous one.
    pub fn start(&self) {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(auto_refresh(self.clone(), cancel.clone()));
        let previous = lock(&self.inner.timer).replace(Timer { cancel, task });
        if let Some(previous) = previous {
            previous.cancel.cancel();
            previous.task.abort();
        }
    }

    pub fn stop(&self) {
        if let Some(timer) = lock(&self.inner.timer).take() {
            timer.cancel.cancel();
            timer.task.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        lock(&self.inner.timer).is_some()
    }

    pub fn section(&self) -> Section {
        *lock(&self.inner.section)
    }

    /// Navigate and refresh the new section straight away.
    pub async fn set_section(&self, section: Section) {
        *lock(&self.inner.section) = section;
        debug!(%section, "section changed");
        self.refresh_section().await;
    }

    pub fn stats(&self) -> DashboardStats {
        let cache = lock(&self.inner.cache);
        DashboardStats::from_collections(&cache.edge, &cache.iot)
    }

    pub fn edge_nodes(&self) -> Vec<NodeRecord> {
        lock(&self.inner.cache).edge.clone()
    }

    pub fn iot_nodes(&self) -> Vec<NodeRecord> {
        lock(&self.inner.cache).iot.clone()
    }

    /// Re-fetch what the current section displays.
    pub async fn refresh_section(&self) {
        let section = self.section();
        let Some(token) = self.token() else {
            return;
        };

        let settled = match section {
            Section::Dashboard => {
                let (edge, iot) = self.fetch_both(&token, section).await;
                if edge == Settled::Stored || iot == Settled::Stored {
                    self.inner.view.send(ViewUpdate::Stats(self.stats()));
                }
                [edge, iot]
            }
            Section::EdgeNodes => {
                let edge = self.fetch(&token, Collection::Edge, section).await;
                if edge == Settled::Stored {
                    self.emit_listing(Collection::Edge);
                }
                [edge, edge]
            }
            Section::IotNodes => {
                let iot = self.fetch(&token, Collection::Iot, section).await;
                if iot == Settled::Stored {
                    self.emit_listing(Collection::Iot);
                }
                [iot, iot]
            }
            Section::Other => return,
        };

        if settled.contains(&Settled::Unauthorized) {
            self.inner.unauthorized.handle_unauthorized();
        }
    }

    /// Re-fetch both collections regardless of the visible section and emit
    /// stats and both listings.
    pub async fn refresh_all(&self) {
        let Some(token) = self.token() else {
            return;
        };

        let (edge, iot) = tokio::join!(
            self.fetch(&token, Collection::Edge, Section::EdgeNodes),
            self.fetch(&token, Collection::Iot, Section::IotNodes),
        );
        if edge == Settled::Unauthorized || iot == Settled::Unauthorized {
            self.inner.unauthorized.handle_unauthorized();
            return;
        }

        if edge == Settled::Stored {
            self.emit_listing(Collection::Edge);
        }
        if iot == Settled::Stored {
            self.emit_listing(Collection::Iot);
        }
        if edge == Settled::Stored || iot == Settled::Stored {
            self.inner.view.send(ViewUpdate::Stats(self.stats()));
        }
    }

    /// The stored token, or the unauthenticated placeholder when there is
    /// none.
    fn token(&self) -> Option<String> {
        let token = self.inner.tokens.get();
        if token.is_none() {
            debug!("no token, showing login placeholder");
            self.inner.view.send(ViewUpdate::Unauthenticated);
        }
        token
    }

    async fn fetch_both(&self, token: &str, section: Section) -> (Settled, Settled) {
        tokio::join!(
            self.fetch(token, Collection::Edge, section),
            self.fetch(token, Collection::Iot, section),
        )
    }

    async fn fetch(&self, token: &str, collection: Collection, section: Section) -> Settled {
        let result = match collection {
            Collection::Edge => self.inner.api.edge_nodes(token).await,
            Collection::Iot => self.inner.api.iot_nodes(token).await,
        };
        self.settle(collection, section, result)
    }

    fn settle(
        &self,
        collection: Collection,
        section: Section,
        result: api::Result<Vec<NodeRecord>>,
    ) -> Settled {
        match result {
            Ok(nodes) => {
                let mut cache = lock(&self.inner.cache);
                match collection {
                    Collection::Edge => cache.edge = nodes,
                    Collection::Iot => cache.iot = nodes,
                }
                Settled::Stored
            }
            Err(e) if e.is_unauthorized() => Settled::Unauthorized,
            Err(e) => {
                warn!(?collection, error = %e, "node listing failed");
                self.inner.view.send(ViewUpdate::ListingError {
                    section,
                    message: e.to_string(),
                });
                Settled::Failed
            }
        }
    }

    fn emit_listing(&self, collection: Collection) {
        let update = match collection {
            Collection::Edge => ViewUpdate::EdgeNodes(self.edge_nodes()),
            Collection::Iot => ViewUpdate::IotNodes(self.iot_nodes()),
        };
        self.inner.view.send(update);
    }
}

impl<A: NodeApi> ListingRefresh for ViewRefreshCoordinator<A> {
    fn refresh_listings(&self) -> BoxFuture<'static, ()> {
        let this = self.clone();
        Box::pin(async move { this.refresh_all().await })
    }
}

async fn auto_refresh<A: NodeApi>(coordinator: ViewRefreshCoordinator<A>, cancel: CancellationToken) {
    let period = coordinator.inner.interval;
    let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticks.tick() => {}
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = coordinator.refresh_section() => {}
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
