//! Configuration file handling.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

use crate::auth::SessionTimings;

pub const DEFAULT_API_URL: &str = "http://192.168.0.147:8080";
const PROGRESS_PATH: &str = "ws/progress";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// REST server root.
    pub api_url: String,

    /// Progress channel endpoint. Derived from `api_url` when unset.
    pub progress_url: Option<String>,

    pub timings: Timings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            progress_url: None,
            timings: Timings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Timings {
    pub reconnect_delay_secs: u64,
    pub token_refresh_secs: u64,
    pub session_warning_secs: u64,
    pub extend_notice_secs: u64,
    pub completion_refresh_secs: u64,
    pub auto_refresh_secs: u64,
    pub channel_settle_secs: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: 3,
            token_refresh_secs: 25 * 60,
            session_warning_secs: 25 * 60,
            extend_notice_secs: 3,
            completion_refresh_secs: 2,
            auto_refresh_secs: 30,
            channel_settle_secs: 1,
        }
    }
}

impl Timings {
    /// Floored at one second so a down backend is not hammered.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs.max(1))
    }

    pub fn completion_refresh(&self) -> Duration {
        Duration::from_secs(self.completion_refresh_secs)
    }

    /// Zero would make the interval spin, so it is floored at one second.
    pub fn auto_refresh(&self) -> Duration {
        Duration::from_secs(self.auto_refresh_secs.max(1))
    }

    pub fn channel_settle(&self) -> Duration {
        Duration::from_secs(self.channel_settle_secs)
    }

    pub fn session(&self) -> SessionTimings {
        SessionTimings {
            refresh_interval: Duration::from_secs(self.token_refresh_secs.max(1)),
            warning_after: Duration::from_secs(self.session_warning_secs),
            extend_notice: Duration::from_secs(self.extend_notice_secs),
        }
    }
}

impl Config {
    /// Default location: `<config_dir>/zsm/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("zsm").join("config.toml"))
    }

    /// Load from `path`, or from the default location. A missing file yields
    /// the defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn api_url(&self) -> Result<Url> {
        Url::parse(&self.api_url).with_context(|| format!("Invalid api_url '{}'", self.api_url))
    }

    /// The explicit progress URL, or `ws[s]://<host>/ws/progress` built from
    /// the API URL.
    pub fn progress_url(&self) -> Result<Url> {
        if let Some(url) = &self.progress_url {
            return Url::parse(url).with_context(|| format!("Invalid progress_url '{}'", url));
        }

        let mut url = self.api_url()?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => anyhow::bail!("Cannot derive a progress URL from a {} URL", other),
        };
        url.set_scheme(scheme)
            .map_err(|_| anyhow::anyhow!("Cannot derive a progress URL from {}", self.api_url))?;
        url.set_path(PROGRESS_PATH);
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }
}
