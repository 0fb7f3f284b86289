//! Command-line interface for the `zsm` binary.

pub mod completion;
pub mod console;
pub mod deploy;
pub mod nodes;
pub mod render;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::api::ApiClient;
use crate::config::Config;
use crate::dashboard::Dashboard;
use crate::progress::WebSocketTransport;
use crate::view::{ViewHandle, ViewUpdate};

#[derive(Parser)]
#[command(name = "zsm")]
#[command(about = "Deploy ZSM clusters and watch their nodes from the terminal")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone, Debug, Default)]
pub struct GlobalArgs {
    /// REST server root (overrides the config file)
    #[arg(long, global = true, env = "ZSM_API_URL")]
    pub api_url: Option<String>,

    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "ZSM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Login name; prompted for when missing
    #[arg(short, long, global = true, env = "ZSM_USERNAME")]
    pub username: Option<String>,

    /// Login password; prompted for when missing
    #[arg(long, global = true, env = "ZSM_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Enable debug logging on stderr
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive dashboard: deploy, watch progress, manage nodes
    Console(console::ConsoleArgs),

    /// Run a full deployment and follow it to completion
    Deploy(deploy::DeployArgs),

    /// List, add and remove nodes
    Nodes(nodes::NodesArgs),

    /// Generate shell completions
    Completion(completion::CompletionArgs),
}

pub type ConsoleDashboard = Dashboard<ApiClient, WebSocketTransport>;

impl GlobalArgs {
    /// The config file with command-line overrides applied.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(url) = &self.api_url {
            config.api_url = url.clone();
        }
        Ok(config)
    }

    /// Username and password from flags/env, prompting for whatever is
    /// missing.
    pub fn credentials(&self) -> Result<(String, String)> {
        let username = match &self.username {
            Some(username) => username.clone(),
            None => prompt("Username: ")?,
        };
        let password = match &self.password {
            Some(password) => password.clone(),
            None => prompt("Password: ")?,
        };
        if username.is_empty() {
            bail!("A username is required");
        }
        Ok((username, password))
    }
}

/// Build a dashboard against the configured server.
pub fn connect(global: &GlobalArgs) -> Result<(ConsoleDashboard, UnboundedReceiver<ViewUpdate>)> {
    let config = global.load_config()?;
    let api = ApiClient::new(config.api_url()?)?;
    let transport = WebSocketTransport::new(config.progress_url()?);
    tracing::debug!(api = %api.base_url(), progress = %transport.url(), "connecting");

    let (view, rx) = ViewHandle::channel();
    Ok((Dashboard::new(api, transport, view, &config.timings), rx))
}

pub async fn login(dashboard: &ConsoleDashboard, global: &GlobalArgs) -> Result<()> {
    let (username, password) = global.credentials()?;
    dashboard
        .login(&username, &password)
        .await
        .context("Login failed")?;
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
