//! The dashboard facade: wires the session, the deployment tracker, the
//! progress channel and the refresh coordinator around one token store and
//! one deployment flag, and exposes the user-facing operations.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::api::{ApiError, Backend, NewNode, Result};
use crate::auth::{SessionLifecycle, TokenStore, UnauthorizedHandler};
use crate::config::Timings;
use crate::nodes::is_protected_name;
use crate::progress::{DeploymentFlag, DeploymentTracker, ProgressChannel, ProgressTransport};
use crate::refresh::{Section, ViewRefreshCoordinator};
use crate::view::{ViewHandle, ViewUpdate};

pub struct Dashboard<B, T> {
    api: Arc<B>,
    tokens: TokenStore,
    flag: DeploymentFlag,
    view: ViewHandle,
    session: SessionLifecycle<B>,
    tracker: Arc<DeploymentTracker>,
    channel: ProgressChannel<T>,
    refresh: ViewRefreshCoordinator<B>,
    channel_settle: Duration,
}

impl<B, T> Clone for Dashboard<B, T> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            tokens: self.tokens.clone(),
            flag: self.flag.clone(),
            view: self.view.clone(),
            session: self.session.clone(),
            tracker: self.tracker.clone(),
            channel: self.channel.clone(),
            refresh: self.refresh.clone(),
            channel_settle: self.channel_settle,
        }
    }
}

impl<B: Backend, T: ProgressTransport> Dashboard<B, T> {
    pub fn new(api: B, transport: T, view: ViewHandle, timings: &Timings) -> Self {
        let api = Arc::new(api);
        let tokens = TokenStore::default();
        let flag = DeploymentFlag::default();

        let session =
            SessionLifecycle::new(api.clone(), tokens.clone(), view.clone(), timings.session());
        let refresh = ViewRefreshCoordinator::new(
            api.clone(),
            tokens.clone(),
            view.clone(),
            Arc::new(session.clone()),
            timings.auto_refresh(),
        );
        let tracker = Arc::new(
            DeploymentTracker::new(flag.clone(), view.clone(), timings.completion_refresh())
                .with_listings(Arc::new(refresh.clone())),
        );
        let channel = ProgressChannel::new(
            transport,
            tracker.clone(),
            flag.clone(),
            timings.reconnect_delay(),
        );

        Self {
            api,
            tokens,
            flag,
            view,
            session,
            tracker,
            channel,
            refresh,
            channel_settle: timings.channel_settle(),
        }
    }

    pub fn api(&self) -> &B {
        &self.api
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn flag(&self) -> &DeploymentFlag {
        &self.flag
    }

    pub fn session(&self) -> &SessionLifecycle<B> {
        &self.session
    }

    pub fn tracker(&self) -> &DeploymentTracker {
        &self.tracker
    }

    pub fn channel(&self) -> &ProgressChannel<T> {
        &self.channel
    }

    pub fn refresh(&self) -> &ViewRefreshCoordinator<B> {
        &self.refresh
    }

    /// Authenticate, arm the session and auto-refresh timers and load the
    /// current section.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        self.session.login(username, password).await?;
        self.refresh.start();
        self.refresh.refresh_section().await;
        Ok(())
    }

    /// Back to the login prompt. Leaves no timer armed and no reconnect
    /// pending.
    pub fn logout(&self) {
        self.session.logout();
        self.refresh.stop();
        self.flag.set(false);
        self.channel.cancel_reconnect();
        self.view.send(ViewUpdate::Unauthenticated);
    }

    /// Start a fresh deployment and trigger it on the backend. Progress
    /// arrives over the channel; this only reports whether the trigger was
    /// accepted.
    pub async fn deploy(&self) -> Result<Uuid> {
        let token = self.require_token()?;

        let id = self.tracker.begin();
        if self.channel.connect() {
            // Give the channel a moment to open before the first events fly.
            tokio::time::sleep(self.channel_settle).await;
        }

        match self.api.deploy_all(&token).await {
            Ok(ack) => {
                info!(
                    deployment = %id,
                    message = ack.message.as_deref().unwrap_or_default(),
                    "deployment accepted"
                );
                Ok(id)
            }
            Err(e) => {
                warn!(deployment = %id, error = %e, "deployment trigger failed");
                self.tracker.fail(&e.to_string());
                if e.is_unauthorized() {
                    self.session.handle_unauthorized();
                }
                Err(e)
            }
        }
    }

    pub async fn set_section(&self, section: Section) {
        self.refresh.set_section(section).await;
    }

    pub async fn extend_session(&self) -> Result<()> {
        self.session.extend_session().await
    }

    pub fn dismiss_warning(&self) {
        self.session.dismiss_warning();
    }

    pub async fn add_node(&self, node: NewNode) -> Result<String> {
        let token = self.require_token()?;
        let result = self.api.add_node(&token, &node).await;
        self.settle_mutation(result).await
    }

    pub async fn add_edge_node(&self, node: NewNode) -> Result<String> {
        let token = self.require_token()?;
        let result = self.api.add_edge_node(&token, &node).await;
        self.settle_mutation(result).await
    }

    /// Control-plane nodes are refused before anything is sent.
    pub async fn delete_node(&self, name: &str) -> Result<String> {
        if is_protected_name(name) {
            let err = ApiError::ProtectedNode(name.to_string());
            self.view.send(ViewUpdate::Notice(err.to_string()));
            return Err(err);
        }

        let token = self.require_token()?;
        let result = self.api.delete_node(&token, name).await;
        self.settle_mutation(result).await
    }

    /// Stop every timer and close the channel.
    pub fn shutdown(&self) {
        self.session.stop();
        self.refresh.stop();
        self.channel.shutdown();
    }

    fn require_token(&self) -> Result<String> {
        self.tokens.get().ok_or_else(|| {
            self.view.send(ViewUpdate::LoginRequired);
            ApiError::NotAuthenticated
        })
    }

    async fn settle_mutation(&self, result: Result<String>) -> Result<String> {
        match result {
            Ok(message) => {
                info!(%message, "node change accepted");
                self.view.send(ViewUpdate::Notice(message.clone()));
                self.refresh.refresh_all().await;
                Ok(message)
            }
            Err(e) => {
                if e.is_unauthorized() {
                    self.session.handle_unauthorized();
                } else {
                    warn!(error = %e, "node change failed");
                    self.view.send(ViewUpdate::Notice(format!("Error: {}", e)));
                }
                Err(e)
            }
        }
    }
}
