//! Deployment progress: wire events, step state, the tracker that applies
//! events, and the push channel that delivers them.

pub mod channel;
pub mod event;
pub mod steps;
pub mod tracker;
pub mod transport;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use channel::{
    ChannelError, ChannelNotice, ChannelState, FrameStream, ProgressChannel, ProgressHandler,
    ProgressTransport,
};
pub use event::{ActiveStep, DeploymentDetails, ProgressEvent, ProgressUpdate, StepId};
pub use steps::{Applied, DeploymentSession, LogLine, Outcome, StepBoard, StepStatus};
pub use tracker::{DeploymentTracker, ListingRefresh};
pub use transport::WebSocketTransport;

/// "A deployment is in progress". Written by the deployment trigger and the
/// tracker, read by the channel's reconnect policy.
#[derive(Debug, Clone, Default)]
pub struct DeploymentFlag(Arc<AtomicBool>);

impl DeploymentFlag {
    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, in_progress: bool) {
        self.0.store(in_progress, Ordering::SeqCst);
    }
}
