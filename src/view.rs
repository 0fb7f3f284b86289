//! Updates emitted by the core for whatever renders them.
//!
//! Components never draw anything themselves. They push `ViewUpdate`s into an
//! unbounded channel and keep going; a renderer on the other end (the terminal
//! renderer in `cli::render`, or a test) consumes them in order.

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::nodes::{DashboardStats, NodeRecord};
use crate::progress::{LogLine, Outcome, StepStatus};
use crate::refresh::Section;

#[derive(Debug, Clone, PartialEq)]
pub enum ViewUpdate {
    /// A new deployment began: hide close controls, clear the log.
    DeploymentStarted { id: Uuid },
    Progress { percent: u8, message: String },
    Steps([StepStatus; 4]),
    Log(LogLine),
    /// Terminal outcome: reveal close controls.
    DeploymentFinished(Outcome),

    SessionWarningShown,
    SessionExtended,
    SessionWarningCleared,
    LoginRequired,
    /// Replace every data display with the "please login" placeholder.
    Unauthenticated,

    Stats(DashboardStats),
    EdgeNodes(Vec<NodeRecord>),
    IotNodes(Vec<NodeRecord>),
    ListingError { section: Section, message: String },

    /// One-off message for the user (mutation results and the like).
    Notice(String),
}

/// Sending half of the view channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ViewHandle {
    tx: mpsc::UnboundedSender<ViewUpdate>,
}

impl ViewHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ViewUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, update: ViewUpdate) {
        // The renderer may already be gone during shutdown.
        let _ = self.tx.send(update);
    }
}
