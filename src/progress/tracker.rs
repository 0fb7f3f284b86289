//! Turns progress events into step/percentage view state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::channel::{ChannelNotice, ProgressHandler};
use super::event::ProgressEvent;
use super::steps::{Applied, DeploymentSession};
use super::DeploymentFlag;
use crate::view::{ViewHandle, ViewUpdate};

/// Something that can re-fetch the node listings once a deployment finishes.
pub trait ListingRefresh: Send + Sync {
    fn refresh_listings(&self) -> BoxFuture<'static, ()>;
}

pub struct DeploymentTracker {
    session: Mutex<Option<DeploymentSession>>,
    flag: DeploymentFlag,
    view: ViewHandle,
    listings: Option<Arc<dyn ListingRefresh>>,
    completion_refresh_delay: Duration,
}

impl DeploymentTracker {
    pub fn new(flag: DeploymentFlag, view: ViewHandle, completion_refresh_delay: Duration) -> Self {
        Self {
            session: Mutex::new(None),
            flag,
            view,
            listings: None,
            completion_refresh_delay,
        }
    }

    pub fn with_listings(mut self, listings: Arc<dyn ListingRefresh>) -> Self {
        self.listings = Some(listings);
        self
    }

    /// Replace any previous deployment with a fresh one and mark a deployment
    /// as in progress.
    pub fn begin(&self) -> Uuid {
        let session = DeploymentSession::start();
        let id = session.id();

        self.view.send(ViewUpdate::DeploymentStarted { id });
        self.view.send(ViewUpdate::Progress {
            percent: session.percent(),
            message: session.message().to_string(),
        });
        self.view.send(ViewUpdate::Steps(session.steps().statuses()));
        for line in session.log() {
            self.view.send(ViewUpdate::Log(line.clone()));
        }

        *self.lock() = Some(session);
        self.flag.set(true);
        info!(deployment = %id, "deployment started");
        id
    }

    pub fn apply(&self, event: ProgressEvent) {
        self.transition(|session| session.apply(&event));
    }

    /// Terminal failure that did not come from the channel, e.g. the trigger
    /// call itself failing.
    pub fn fail(&self, reason: &str) {
        self.transition(|session| session.fail(reason));
    }

    /// Append a line to the current deployment's log.
    pub fn note(&self, text: &str) {
        let mut guard = self.lock();
        let Some(session) = guard.as_mut() else {
            return;
        };
        session.note(text);
        if let Some(line) = session.log().last() {
            self.view.send(ViewUpdate::Log(line.clone()));
        }
    }

    pub fn snapshot(&self) -> Option<DeploymentSession> {
        self.lock().clone()
    }

    pub fn in_progress(&self) -> bool {
        self.flag.get()
    }

    fn transition(&self, apply: impl FnOnce(&mut DeploymentSession) -> Applied) {
        let mut guard = self.lock();
        let Some(session) = guard.as_mut() else {
            debug!("progress event with no deployment session, dropping");
            return;
        };

        let seen = session.log().len();
        let applied = apply(session);
        if applied == Applied::Ignored {
            debug!(deployment = %session.id(), "deployment already finished, ignoring event");
            return;
        }

        self.view.send(ViewUpdate::Progress {
            percent: session.percent(),
            message: session.message().to_string(),
        });
        self.view.send(ViewUpdate::Steps(session.steps().statuses()));
        for line in &session.log()[seen..] {
            self.view.send(ViewUpdate::Log(line.clone()));
        }

        match applied {
            Applied::Completed => {
                info!(deployment = %session.id(), "deployment completed");
                self.finish(session);
                self.schedule_listing_refresh();
            }
            Applied::Failed => {
                warn!(deployment = %session.id(), reason = session.message(), "deployment failed");
                self.finish(session);
            }
            Applied::Updated | Applied::Ignored => {}
        }
    }

    fn finish(&self, session: &DeploymentSession) {
        self.flag.set(false);
        if let Some(outcome) = session.outcome() {
            self.view.send(ViewUpdate::DeploymentFinished(outcome.clone()));
        }
    }

    fn schedule_listing_refresh(&self) {
        let Some(listings) = self.listings.clone() else {
            return;
        };
        let delay = self.completion_refresh_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            listings.refresh_listings().await;
        });
    }

    fn lock(&self) -> MutexGuard<'_, Option<DeploymentSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProgressHandler for DeploymentTracker {
    fn on_event(&self, event: ProgressEvent) {
        self.apply(event);
    }

    fn on_notice(&self, notice: ChannelNotice) {
        self.note(notice.text());
    }
}
