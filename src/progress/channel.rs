//! The progress channel: one logical push connection to the deployment
//! backend, reopened on a fixed delay while a deployment is running.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::event::ProgressEvent;
use super::DeploymentFlag;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to connect to progress channel: {0}")]
    Connect(String),

    #[error("Progress channel transport error: {0}")]
    Transport(String),
}

/// Inbound text frames. The stream ending means the connection closed.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, ChannelError>> + Send>>;

pub trait ProgressTransport: Send + Sync + 'static {
    fn open(&self) -> impl Future<Output = Result<FrameStream, ChannelError>> + Send;
}

/// Connectivity changes worth showing in the deployment log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelNotice {
    Connected,
    Lost,
    Error,
}

impl ChannelNotice {
    pub fn text(self) -> &'static str {
        match self {
            ChannelNotice::Connected => "Connected to progress tracker",
            ChannelNotice::Lost => "Progress connection lost",
            ChannelNotice::Error => "Progress connection error",
        }
    }
}

/// Receives every parsed event, in arrival order.
pub trait ProgressHandler: Send + Sync {
    fn on_event(&self, event: ProgressEvent);

    fn on_notice(&self, _notice: ChannelNotice) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Closed,
}

#[derive(Default)]
struct Slot {
    state: ChannelState,
    // Bumped on every connect and on shutdown; a reader only acts while its
    // generation is current.
    generation: u64,
    reader: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
    // Bumped whenever a reconnect timer is scheduled or cancelled; a timer
    // only acts while its tag is current.
    reconnect_tag: u64,
}

struct Inner<T> {
    transport: T,
    handler: Arc<dyn ProgressHandler>,
    flag: DeploymentFlag,
    reconnect_delay: Duration,
    slot: Mutex<Slot>,
}

pub struct ProgressChannel<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ProgressChannel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: ProgressTransport> ProgressChannel<T> {
    pub fn new(
        transport: T,
        handler: Arc<dyn ProgressHandler>,
        flag: DeploymentFlag,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                handler,
                flag,
                reconnect_delay,
                slot: Mutex::new(Slot::default()),
            }),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.inner.lock().state
    }

    pub fn reconnect_pending(&self) -> bool {
        self.inner.lock().reconnect.is_some()
    }

    /// Open the channel unless it is already open or opening. Returns whether
    /// a new connection attempt was started.
    pub fn connect(&self) -> bool {
        connect(&self.inner)
    }

    /// Drop a scheduled reconnect, if any.
    pub fn cancel_reconnect(&self) {
        let mut slot = self.inner.lock();
        slot.reconnect_tag += 1;
        if let Some(timer) = slot.reconnect.take() {
            timer.abort();
            debug!("cancelled pending progress channel reconnect");
        }
    }

    /// Tear the channel down completely.
    pub fn shutdown(&self) {
        let mut slot = self.inner.lock();
        slot.generation += 1;
        slot.reconnect_tag += 1;
        slot.state = ChannelState::Disconnected;
        if let Some(reader) = slot.reader.take() {
            reader.abort();
        }
        if let Some(timer) = slot.reconnect.take() {
            timer.abort();
        }
    }
}

impl<T> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_open(&self, generation: u64) -> bool {
        let mut slot = self.lock();
        if slot.generation != generation {
            return false;
        }
        slot.state = ChannelState::Open;
        true
    }

    /// Release the reconnect slot for the timer tagged `tag`. False when a
    /// newer timer or a cancellation has taken over since.
    fn take_reconnect(&self, tag: u64) -> bool {
        let mut slot = self.lock();
        if slot.reconnect_tag != tag {
            return false;
        }
        slot.reconnect = None;
        true
    }

    fn dispatch(&self, text: &str) {
        match ProgressEvent::parse(text) {
            Ok(event) => {
                debug!(?event, "progress event");
                self.handler.on_event(event);
            }
            Err(e) => warn!(error = %e, payload = text, "dropping malformed progress message"),
        }
    }
}

fn connect<T: ProgressTransport>(inner: &Arc<Inner<T>>) -> bool {
    let mut slot = inner.lock();
    if matches!(slot.state, ChannelState::Open | ChannelState::Connecting) {
        debug!(state = ?slot.state, "progress channel already active");
        return false;
    }

    slot.state = ChannelState::Connecting;
    slot.generation += 1;
    let generation = slot.generation;
    let task_inner = inner.clone();
    slot.reader = Some(tokio::spawn(read_frames(task_inner, generation)));
    true
}

async fn read_frames<T: ProgressTransport>(inner: Arc<Inner<T>>, generation: u64) {
    debug!(generation, "opening progress channel");

    match inner.transport.open().await {
        Ok(mut frames) => {
            if !inner.mark_open(generation) {
                return;
            }
            info!("progress channel connected");
            inner.handler.on_notice(ChannelNotice::Connected);

            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(text) => inner.dispatch(&text),
                    Err(e) => {
                        // The stream ending below is what drives reconnection.
                        error!(error = %e, "progress channel error");
                        inner.handler.on_notice(ChannelNotice::Error);
                        break;
                    }
                }
            }
        }
        Err(e) => {
            error!(error = %e, "progress channel error");
            inner.handler.on_notice(ChannelNotice::Error);
        }
    }

    on_close(&inner, generation);
}

fn on_close<T: ProgressTransport>(inner: &Arc<Inner<T>>, generation: u64) {
    {
        let mut slot = inner.lock();
        if slot.generation != generation {
            return;
        }
        slot.state = ChannelState::Closed;
        slot.reader = None;
    }

    info!("progress channel closed");
    inner.handler.on_notice(ChannelNotice::Lost);

    if !inner.flag.get() {
        debug!("no deployment in progress, staying disconnected");
        return;
    }

    let mut slot = inner.lock();
    if slot.reconnect.is_some() {
        debug!("reconnect already scheduled");
        return;
    }

    let delay = inner.reconnect_delay;
    info!(delay_ms = delay.as_millis() as u64, "scheduling progress channel reconnect");
    slot.reconnect_tag += 1;
    let tag = slot.reconnect_tag;
    let timer_inner = inner.clone();
    slot.reconnect = Some(tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if !timer_inner.take_reconnect(tag) {
            debug!("reconnect timer superseded");
            return;
        }
        if !timer_inner.flag.get() {
            debug!("deployment ended during reconnect delay");
            return;
        }
        connect(&timer_inner);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Script {
        /// Deliver the frames, then close.
        Close(Vec<&'static str>),
        /// Deliver the frames and stay open.
        Hold(Vec<&'static str>),
    }

    struct ScriptedTransport {
        opens: Arc<AtomicUsize>,
        scripts: Mutex<VecDeque<Script>>,
    }

    impl ScriptedTransport {
        fn new(scripts: Vec<Script>) -> Self {
            Self {
                opens: Arc::new(AtomicUsize::new(0)),
                scripts: Mutex::new(scripts.into()),
            }
        }
    }

    impl ProgressTransport for ScriptedTransport {
        async fn open(&self) -> Result<FrameStream, ChannelError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let script = self.scripts.lock().unwrap().pop_front();
            let frames = |texts: Vec<&'static str>| {
                stream::iter(
                    texts
                        .into_iter()
                        .map(|t| Ok::<_, ChannelError>(t.to_string())),
                )
            };
            match script {
                Some(Script::Close(texts)) => Ok(Box::pin(frames(texts))),
                Some(Script::Hold(texts)) => Ok(Box::pin(frames(texts).chain(stream::pending()))),
                None => Err(ChannelError::Connect("connection refused".to_string())),
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<ProgressEvent>>,
        notices: Mutex<Vec<ChannelNotice>>,
    }

    impl ProgressHandler for Recorder {
        fn on_event(&self, event: ProgressEvent) {
            self.events.lock().unwrap().push(event);
        }

        fn on_notice(&self, notice: ChannelNotice) {
            self.notices.lock().unwrap().push(notice);
        }
    }

    fn channel(
        scripts: Vec<Script>,
        in_progress: bool,
    ) -> (
        ProgressChannel<ScriptedTransport>,
        Arc<AtomicUsize>,
        Arc<Recorder>,
        DeploymentFlag,
    ) {
        let transport = ScriptedTransport::new(scripts);
        let opens = transport.opens.clone();
        let recorder = Arc::new(Recorder::default());
        let flag = DeploymentFlag::default();
        flag.set(in_progress);
        let channel = ProgressChannel::new(
            transport,
            recorder.clone(),
            flag.clone(),
            Duration::from_secs(3),
        );
        (channel, opens, recorder, flag)
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_idempotent_while_open() {
        let (channel, opens, recorder, _flag) = channel(vec![Script::Hold(vec![])], false);

        assert!(channel.connect());
        assert!(!channel.connect());
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(channel.state(), ChannelState::Open);
        assert!(!channel.connect());
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(
            *recorder.notices.lock().unwrap(),
            vec![ChannelNotice::Connected]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frames_are_dropped() {
        let (channel, _opens, recorder, _flag) = channel(
            vec![Script::Hold(vec![
                r#"{"type":"progress","percent":10,"message":"a"}"#,
                "{not json",
                r#"{"type":"mystery"}"#,
                r#"{"type":"error","message":"b"}"#,
            ])],
            true,
        );

        channel.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], ProgressEvent::error("b"));
        assert_eq!(channel.state(), ChannelState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_without_deployment_stays_closed() {
        let (channel, opens, recorder, _flag) = channel(vec![Script::Close(vec![])], false);

        channel.connect();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(!channel.reconnect_pending());
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert!(recorder
            .notices
            .lock()
            .unwrap()
            .contains(&ChannelNotice::Lost));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_during_deployment_reconnects_after_delay() {
        let (channel, opens, _recorder, _flag) = channel(
            vec![Script::Close(vec![]), Script::Hold(vec![])],
            true,
        );

        channel.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(channel.reconnect_pending());

        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert_eq!(opens.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(opens.load(Ordering::SeqCst), 2);
        assert_eq!(channel.state(), ChannelState::Open);
        assert!(!channel.reconnect_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_reconnect_per_close_while_backend_is_down() {
        let (channel, opens, _recorder, flag) = channel(vec![], true);

        channel.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(opens.load(Ordering::SeqCst), 1);

        // Each failed attempt closes and schedules exactly one more.
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(opens.load(Ordering::SeqCst), 4);

        flag.set(false);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(opens.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flag_cleared_during_delay_prevents_reconnect() {
        let (channel, opens, _recorder, flag) = channel(vec![Script::Close(vec![])], true);

        channel.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(channel.reconnect_pending());

        flag.set(false);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_during_pending_reconnect_does_not_double_open() {
        let (channel, opens, _recorder, _flag) = channel(
            vec![Script::Close(vec![]), Script::Hold(vec![])],
            true,
        );

        channel.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(channel.reconnect_pending());

        // A deploy trigger asks for the channel before the timer fires.
        assert!(channel.connect());
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(opens.load(Ordering::SeqCst), 2);
        assert_eq!(channel.state(), ChannelState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_close_while_timer_pending_schedules_nothing_more() {
        let (channel, opens, _recorder, _flag) = channel(
            vec![
                Script::Close(vec![]),
                Script::Close(vec![]),
                Script::Hold(vec![]),
            ],
            true,
        );

        channel.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(channel.reconnect_pending());

        // This connection closes as well while the first timer is pending.
        assert!(channel.connect());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(opens.load(Ordering::SeqCst), 2);
        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(channel.reconnect_pending());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(opens.load(Ordering::SeqCst), 3);
        assert_eq!(channel.state(), ChannelState::Open);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(opens.load(Ordering::SeqCst), 3);
        assert!(!channel.reconnect_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_reconnect_timer_leaves_newer_one_alone() {
        let (channel, _opens, _recorder, _flag) = channel(vec![Script::Close(vec![])], true);

        channel.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let stale = channel.inner.lock().reconnect_tag;

        // Cancelled and replaced before the stale timer got to run.
        channel.cancel_reconnect();
        {
            let mut slot = channel.inner.lock();
            slot.reconnect_tag += 1;
            slot.reconnect = Some(tokio::spawn(std::future::pending::<()>()));
        }

        assert!(!channel.inner.take_reconnect(stale));
        assert!(channel.reconnect_pending());

        let current = channel.inner.lock().reconnect_tag;
        assert!(channel.inner.take_reconnect(current));
        assert!(!channel.reconnect_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_reconnect() {
        let (channel, opens, _recorder, _flag) = channel(vec![Script::Close(vec![])], true);

        channel.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        channel.shutdown();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(channel.state(), ChannelState::Disconnected);
        assert!(!channel.reconnect_pending());
    }
}
