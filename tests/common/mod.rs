//! In-memory backend and progress transport shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use zsm_console::api::{
    ApiError, AuthApi, DeployAck, DeployApi, NewNode, NodeApi, Result as ApiResult,
};
use zsm_console::config::Timings;
use zsm_console::nodes::{NodeRecord, NodeStatus};
use zsm_console::progress::{ChannelError, FrameStream, ProgressTransport};
use zsm_console::{Dashboard, ViewHandle, ViewUpdate};

/// How a fake endpoint answers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reply {
    Ok,
    Unauthorized,
    Failed,
}

impl Reply {
    fn into_result<T>(self, ok: T) -> ApiResult<T> {
        match self {
            Reply::Ok => Ok(ok),
            Reply::Unauthorized => Err(ApiError::Unauthorized),
            Reply::Failed => Err(ApiError::Rejected {
                status: 500,
                detail: "No nodes found in database. Please add nodes first.".to_string(),
            }),
        }
    }
}

pub struct FakeBackend {
    pub refresh: Mutex<Reply>,
    pub listing: Mutex<Reply>,
    pub deploy: Mutex<Reply>,
    pub mutation: Mutex<Reply>,
    pub refresh_calls: AtomicUsize,
    pub edge_calls: AtomicUsize,
    pub iot_calls: AtomicUsize,
    pub deploy_calls: AtomicUsize,
    pub deleted: Mutex<Vec<String>>,
    pub added: Mutex<Vec<NewNode>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            refresh: Mutex::new(Reply::Ok),
            listing: Mutex::new(Reply::Ok),
            deploy: Mutex::new(Reply::Ok),
            mutation: Mutex::new(Reply::Ok),
            refresh_calls: AtomicUsize::new(0),
            edge_calls: AtomicUsize::new(0),
            iot_calls: AtomicUsize::new(0),
            deploy_calls: AtomicUsize::new(0),
            deleted: Mutex::new(Vec::new()),
            added: Mutex::new(Vec::new()),
        }
    }
}

impl FakeBackend {
    pub fn set(slot: &Mutex<Reply>, reply: Reply) {
        *slot.lock().unwrap() = reply;
    }

    fn get(slot: &Mutex<Reply>) -> Reply {
        *slot.lock().unwrap()
    }

    pub fn listing_calls(&self) -> (usize, usize) {
        (
            self.edge_calls.load(Ordering::SeqCst),
            self.iot_calls.load(Ordering::SeqCst),
        )
    }
}

pub fn node(name: &str, cpu: &str) -> NodeRecord {
    NodeRecord {
        name: name.to_string(),
        ip: Some("192.168.0.150".to_string()),
        status: NodeStatus::Online,
        cpu: Some(cpu.to_string()),
        memory: Some("4Gi".to_string()),
        role: None,
        rtsp_url: None,
    }
}

impl AuthApi for FakeBackend {
    async fn login(&self, _username: &str, password: &str) -> ApiResult<String> {
        if password == "admin" {
            Ok("token-0".to_string())
        } else {
            Err(ApiError::InvalidCredentials)
        }
    }

    async fn refresh_token(&self, _token: &str) -> ApiResult<String> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Self::get(&self.refresh).into_result(format!("token-{}", n))
    }
}

impl NodeApi for FakeBackend {
    async fn edge_nodes(&self, _token: &str) -> ApiResult<Vec<NodeRecord>> {
        self.edge_calls.fetch_add(1, Ordering::SeqCst);
        Self::get(&self.listing).into_result(vec![node("nuc2", "10%"), node("lim-1", "20%")])
    }

    async fn iot_nodes(&self, _token: &str) -> ApiResult<Vec<NodeRecord>> {
        self.iot_calls.fetch_add(1, Ordering::SeqCst);
        Self::get(&self.listing).into_result(vec![node("rpi-1", "30%")])
    }

    async fn add_node(&self, _token: &str, node: &NewNode) -> ApiResult<String> {
        let reply = Self::get(&self.mutation);
        if reply == Reply::Ok {
            self.added.lock().unwrap().push(node.clone());
        }
        reply.into_result(format!("Node {} added successfully", node.name))
    }

    async fn add_edge_node(&self, token: &str, node: &NewNode) -> ApiResult<String> {
        self.add_node(token, node).await
    }

    async fn delete_node(&self, _token: &str, name: &str) -> ApiResult<String> {
        let reply = Self::get(&self.mutation);
        if reply == Reply::Ok {
            self.deleted.lock().unwrap().push(name.to_string());
        }
        reply.into_result(format!("Node {} deleted successfully", name))
    }
}

impl DeployApi for FakeBackend {
    async fn deploy_all(&self, _token: &str) -> ApiResult<DeployAck> {
        self.deploy_calls.fetch_add(1, Ordering::SeqCst);
        Self::get(&self.deploy).into_result(DeployAck {
            message: Some("Deployment started".to_string()),
            success: Some(true),
        })
    }
}

type Frame = Result<String, ChannelError>;

/// Each `open` hands out a fresh connection whose frames the test pushes
/// through [`FakeTransport::push`]. Dropping the sender with
/// [`FakeTransport::close`] ends the stream, which the channel sees as a
/// close.
#[derive(Clone, Default)]
pub struct FakeTransport {
    inner: Arc<TransportState>,
}

#[derive(Default)]
struct TransportState {
    opens: AtomicUsize,
    refuse: AtomicBool,
    current: Mutex<Option<UnboundedSender<Frame>>>,
}

impl FakeTransport {
    pub fn opens(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    pub fn refuse(&self, refuse: bool) {
        self.inner.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn push(&self, text: &str) {
        if let Some(tx) = self.inner.current.lock().unwrap().as_ref() {
            let _ = tx.send(Ok(text.to_string()));
        }
    }

    pub fn close(&self) {
        self.inner.current.lock().unwrap().take();
    }
}

impl ProgressTransport for FakeTransport {
    async fn open(&self) -> Result<FrameStream, ChannelError> {
        self.inner.opens.fetch_add(1, Ordering::SeqCst);
        if self.inner.refuse.load(Ordering::SeqCst) {
            return Err(ChannelError::Connect("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel::<Frame>();
        *self.inner.current.lock().unwrap() = Some(tx);
        let frames = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        });
        Ok(Box::pin(frames))
    }
}

pub struct Harness {
    pub dashboard: Dashboard<FakeBackend, FakeTransport>,
    pub transport: FakeTransport,
    pub rx: UnboundedReceiver<ViewUpdate>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_backend(FakeBackend::default())
    }

    pub fn with_backend(backend: FakeBackend) -> Self {
        let transport = FakeTransport::default();
        let (view, rx) = ViewHandle::channel();
        let dashboard = Dashboard::new(backend, transport.clone(), view, &Timings::default());
        Self {
            dashboard,
            transport,
            rx,
        }
    }

    pub fn backend(&self) -> &FakeBackend {
        self.dashboard.api()
    }

    pub async fn login(&mut self) {
        self.dashboard.login("admin", "admin").await.unwrap();
        self.drain();
    }

    pub fn drain(&mut self) -> Vec<ViewUpdate> {
        let mut out = Vec::new();
        while let Ok(update) = self.rx.try_recv() {
            out.push(update);
        }
        out
    }
}

/// Let spawned tasks run; with paused time this also auto-advances idle
/// timers by at most `ms`.
pub async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
