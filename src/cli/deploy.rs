//! `zsm deploy` command implementation

use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;
use tokio::sync::mpsc::UnboundedReceiver;

use super::{render, GlobalArgs};
use crate::progress::Outcome;
use crate::view::ViewUpdate;

#[derive(Args)]
pub struct DeployArgs {
    /// Give up waiting after this many seconds (the deployment keeps running
    /// on the server)
    #[arg(long)]
    timeout: Option<u64>,
}

pub async fn run(global: &GlobalArgs, args: DeployArgs) -> Result<()> {
    let (dashboard, mut rx) = super::connect(global)?;
    super::login(&dashboard, global).await?;

    let trigger = {
        let dashboard = dashboard.clone();
        tokio::spawn(async move { dashboard.deploy().await })
    };

    let outcome = match args.timeout {
        Some(secs) => {
            match tokio::time::timeout(Duration::from_secs(secs), follow(&mut rx)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    dashboard.shutdown();
                    bail!("Timed out after {}s waiting for the deployment to finish", secs);
                }
            }
        }
        None => follow(&mut rx).await,
    };

    dashboard.shutdown();
    trigger.abort();

    match outcome {
        Some(Outcome::Succeeded) => Ok(()),
        Some(Outcome::Failed { reason }) => bail!("Deployment failed: {}", reason),
        None => bail!("Deployment ended without a result"),
    }
}

/// Print deployment updates until the deployment reaches a terminal state.
async fn follow(rx: &mut UnboundedReceiver<ViewUpdate>) -> Option<Outcome> {
    while let Some(update) = rx.recv().await {
        if !is_deployment_update(&update) {
            continue;
        }
        if let Some(text) = render::render(&update) {
            println!("{}", text);
        }
        if let ViewUpdate::DeploymentFinished(outcome) = update {
            return Some(outcome);
        }
    }
    None
}

fn is_deployment_update(update: &ViewUpdate) -> bool {
    matches!(
        update,
        ViewUpdate::DeploymentStarted { .. }
            | ViewUpdate::Progress { .. }
            | ViewUpdate::Steps(_)
            | ViewUpdate::Log(_)
            | ViewUpdate::DeploymentFinished(_)
            | ViewUpdate::LoginRequired
    )
}
