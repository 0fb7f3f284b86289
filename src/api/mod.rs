//! REST collaborators: authentication, node listings and mutations, and the
//! deployment trigger.
//!
//! The core only talks to these through the traits below so that timers and
//! refresh logic can run against in-memory fakes.

pub mod client;
pub mod error;

use std::future::Future;

use serde::{Deserialize, Serialize};

pub use client::ApiClient;
pub use error::{ApiError, Result};

use crate::nodes::NodeRecord;

pub trait AuthApi: Send + Sync + 'static {
    /// Exchange credentials for an access token.
    fn login(&self, username: &str, password: &str) -> impl Future<Output = Result<String>> + Send;

    /// Exchange a still-valid token for a fresh one.
    fn refresh_token(&self, token: &str) -> impl Future<Output = Result<String>> + Send;
}

pub trait NodeApi: Send + Sync + 'static {
    fn edge_nodes(&self, token: &str) -> impl Future<Output = Result<Vec<NodeRecord>>> + Send;

    fn iot_nodes(&self, token: &str) -> impl Future<Output = Result<Vec<NodeRecord>>> + Send;

    fn add_node(&self, token: &str, node: &NewNode) -> impl Future<Output = Result<String>> + Send;

    fn add_edge_node(
        &self,
        token: &str,
        node: &NewNode,
    ) -> impl Future<Output = Result<String>> + Send;

    fn delete_node(&self, token: &str, name: &str) -> impl Future<Output = Result<String>> + Send;
}

pub trait DeployApi: Send + Sync + 'static {
    /// Kick off a full cluster deployment. Progress arrives over the progress
    /// channel, not in this response.
    fn deploy_all(&self, token: &str) -> impl Future<Output = Result<DeployAck>> + Send;
}

/// Everything the dashboard needs from the backend.
pub trait Backend: AuthApi + NodeApi + DeployApi {}

impl<T: AuthApi + NodeApi + DeployApi> Backend for T {}

/// Registration payload for a new node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewNode {
    pub name: String,
    pub ip: String,
    pub ssh_username: String,
    pub ssh_password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_master: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeployAck {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
}
