//! HTTP implementation of the REST collaborators.

use std::time::Duration;

use reqwest::{header, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::error::{ApiError, Result};
use super::{AuthApi, DeployAck, DeployApi, NewNode, NodeApi};
use crate::nodes::NodeRecord;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_FAILED: &str = "Request failed";
const DEPLOYMENT_FAILED: &str = "Deployment failed";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct MessageResponse {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    /// `base` is the server root, e.g. `http://192.168.0.147:8080`.
    pub fn new(base: Url) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("zsm-console/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base: with_trailing_slash(base),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    async fn get_nodes(&self, token: &str, path: &str) -> Result<Vec<NodeRecord>> {
        let response = self
            .http
            .get(self.endpoint(path)?)
            .bearer_auth(token)
            .send()
            .await?;
        read_json(response, REQUEST_FAILED).await
    }

    async fn post_node(&self, token: &str, path: &str, node: &NewNode) -> Result<String> {
        let response = self
            .http
            .post(self.endpoint(path)?)
            .bearer_auth(token)
            .json(node)
            .send()
            .await?;
        let body: MessageResponse = read_json(response, REQUEST_FAILED).await?;
        Ok(body
            .message
            .unwrap_or_else(|| format!("Node {} added successfully", node.name)))
    }
}

impl AuthApi for ApiClient {
    async fn login(&self, username: &str, password: &str) -> Result<String> {
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("username", username)
            .append_pair("password", password)
            .finish();

        let response = self
            .http
            .post(self.endpoint("token")?)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form)
            .send()
            .await?;
        // A 401 here means bad credentials, not an expired session.
        let token: TokenResponse = read_json(response, REQUEST_FAILED)
            .await
            .map_err(|e| match e {
                ApiError::Unauthorized => ApiError::InvalidCredentials,
                other => other,
            })?;
        Ok(token.access_token)
    }

    async fn refresh_token(&self, token: &str) -> Result<String> {
        let response = self
            .http
            .post(self.endpoint("api/refresh-token")?)
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, "application/json")
            .send()
            .await?;
        let token: TokenResponse = read_json(response, REQUEST_FAILED).await?;
        Ok(token.access_token)
    }
}

impl NodeApi for ApiClient {
    async fn edge_nodes(&self, token: &str) -> Result<Vec<NodeRecord>> {
        self.get_nodes(token, "api/edge-nodes").await
    }

    async fn iot_nodes(&self, token: &str) -> Result<Vec<NodeRecord>> {
        self.get_nodes(token, "api/iot-nodes").await
    }

    async fn add_node(&self, token: &str, node: &NewNode) -> Result<String> {
        self.post_node(token, "api/nodes/add", node).await
    }

    async fn add_edge_node(&self, token: &str, node: &NewNode) -> Result<String> {
        self.post_node(token, "api/edge-nodes/add", node).await
    }

    async fn delete_node(&self, token: &str, name: &str) -> Result<String> {
        let mut url = self.endpoint("api/nodes/")?;
        url.path_segments_mut()
            .map_err(|_| ApiError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push(name);

        let response = self.http.delete(url).bearer_auth(token).send().await?;
        let body: MessageResponse = read_json(response, REQUEST_FAILED).await?;
        Ok(body
            .message
            .unwrap_or_else(|| format!("Node {} deleted successfully", name)))
    }
}

impl DeployApi for ApiClient {
    async fn deploy_all(&self, token: &str) -> Result<DeployAck> {
        let response = self
            .http
            .post(self.endpoint("api/deploy/all")?)
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, "application/json")
            .send()
            .await?;
        read_json(response, DEPLOYMENT_FAILED).await
    }
}

/// `failure` prefixes the fallback reason when the body carries none.
async fn read_json<T: DeserializeOwned>(response: Response, failure: &str) -> Result<T> {
    let status = response.status();
    debug!(url = %response.url(), %status, "api response");

    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Rejected {
            status: status.as_u16(),
            detail: error_detail(&body)
                .unwrap_or_else(|| format!("{} with status: {}", failure, status.as_u16())),
        });
    }

    Ok(response.json().await?)
}

/// Pull a human-readable reason out of an error body. The backend uses
/// `detail`; some handlers use `error` or `message`.
fn error_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["detail", "error", "message"]
        .into_iter()
        .find_map(|key| match value.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
