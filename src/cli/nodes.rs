//! `zsm nodes` command implementation

use std::io::{self, Write};

use anyhow::{bail, Result};
use clap::{Args, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;

use super::{render, GlobalArgs};
use crate::api::NewNode;
use crate::nodes::{is_protected_name, DashboardStats, NodeRecord};
use crate::view::ViewUpdate;

#[derive(Args)]
pub struct NodesArgs {
    #[command(subcommand)]
    command: NodesCommand,
}

#[derive(Subcommand)]
enum NodesCommand {
    /// List edge and IoT nodes with summary stats
    List {
        /// Only list one kind of node
        #[arg(long, value_enum)]
        kind: Option<NodeKind>,

        /// Print JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// Register an IoT node
    Add(NodeSpec),

    /// Register an edge node
    AddEdge {
        #[command(flatten)]
        spec: NodeSpec,

        /// Join the node as a control-plane master
        #[arg(long)]
        master: bool,
    },

    /// Delete a node by name
    Remove {
        name: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum NodeKind {
    Edge,
    Iot,
}

#[derive(Args)]
struct NodeSpec {
    /// Node name
    name: String,

    /// Node IP address
    ip: String,

    /// SSH user the server logs in with
    #[arg(long, default_value = "pi")]
    ssh_username: String,

    /// SSH password for that user
    #[arg(long, env = "ZSM_SSH_PASSWORD", hide_env_values = true)]
    ssh_password: String,
}

impl NodeSpec {
    fn into_new_node(self, is_master: Option<bool>) -> NewNode {
        NewNode {
            name: self.name,
            ip: self.ip,
            ssh_username: self.ssh_username,
            ssh_password: self.ssh_password,
            is_master,
        }
    }
}

#[derive(Serialize)]
struct Listing<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    edge_nodes: Option<&'a [NodeRecord]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    iot_nodes: Option<&'a [NodeRecord]>,
    total_nodes: usize,
    avg_cpu: String,
}

pub async fn run(global: &GlobalArgs, args: NodesArgs) -> Result<()> {
    // Refuse protected deletions before asking for credentials.
    if let NodesCommand::Remove { name, .. } = &args.command {
        if is_protected_name(name) {
            bail!("Refusing to delete protected node: {}", name);
        }
    }

    let (dashboard, mut rx) = super::connect(global)?;
    super::login(&dashboard, global).await?;

    let result = match args.command {
        NodesCommand::List { kind, json } => {
            // login already loaded the dashboard; only listing errors matter
            drain(&mut rx);
            dashboard.refresh().refresh_all().await;
            check_listing(&mut rx)?;

            let edge = dashboard.refresh().edge_nodes();
            let iot = dashboard.refresh().iot_nodes();
            let stats = DashboardStats::from_collections(&edge, &iot);
            print_listing(&edge, &iot, &stats, kind, json)
        }
        NodesCommand::Add(spec) => report(dashboard.add_node(spec.into_new_node(None)).await),
        NodesCommand::AddEdge { spec, master } => {
            report(dashboard.add_edge_node(spec.into_new_node(Some(master))).await)
        }
        NodesCommand::Remove { name, force } => {
            if !force && !confirm(&name)? {
                println!("Cancelled.");
                dashboard.shutdown();
                return Ok(());
            }
            report(dashboard.delete_node(&name).await)
        }
    };

    dashboard.shutdown();
    result
}

fn report(result: crate::api::Result<String>) -> Result<()> {
    let message = result?;
    println!("✓ {}", message);
    Ok(())
}

fn confirm(name: &str) -> Result<bool> {
    print!("Delete node '{}'? [y/N] ", name);
    io::stdout().flush()?;

    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    let response = response.trim().to_lowercase();
    Ok(response == "y" || response == "yes")
}

fn drain(rx: &mut UnboundedReceiver<ViewUpdate>) -> Vec<ViewUpdate> {
    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    updates
}

/// Turn listing failures reported through the view into an error.
fn check_listing(rx: &mut UnboundedReceiver<ViewUpdate>) -> Result<()> {
    for update in drain(rx) {
        match update {
            ViewUpdate::ListingError { section, message } => {
                bail!("Failed to load {}: {}", section, message)
            }
            ViewUpdate::Unauthenticated | ViewUpdate::LoginRequired => {
                bail!("Session expired. Please login again.")
            }
            _ => {}
        }
    }
    Ok(())
}

fn print_listing(
    edge: &[NodeRecord],
    iot: &[NodeRecord],
    stats: &DashboardStats,
    kind: Option<NodeKind>,
    json: bool,
) -> Result<()> {
    let show_edge = !matches!(kind, Some(NodeKind::Iot));
    let show_iot = !matches!(kind, Some(NodeKind::Edge));

    if json {
        let listing = Listing {
            edge_nodes: show_edge.then_some(edge),
            iot_nodes: show_iot.then_some(iot),
            total_nodes: stats.total_nodes,
            avg_cpu: stats.avg_cpu_display(),
        };
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("{}", render::stats_line(stats));
    if show_edge {
        println!();
        println!("{}", render::node_table("Edge nodes", edge));
    }
    if show_iot {
        println!();
        println!("{}", render::node_table("IoT nodes", iot));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::Section;
    use crate::view::ViewHandle;

    #[test]
    fn test_check_listing_surfaces_errors() {
        let (view, mut rx) = ViewHandle::channel();
        view.send(ViewUpdate::EdgeNodes(Vec::new()));
        view.send(ViewUpdate::ListingError {
            section: Section::IotNodes,
            message: "Request failed with status: 502".to_string(),
        });

        let err = check_listing(&mut rx).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to load iot-nodes: Request failed with status: 502"
        );
    }

    #[test]
    fn test_check_listing_ok() {
        let (view, mut rx) = ViewHandle::channel();
        view.send(ViewUpdate::EdgeNodes(Vec::new()));
        view.send(ViewUpdate::Stats(DashboardStats::default()));
        assert!(check_listing(&mut rx).is_ok());
    }

    #[test]
    fn test_node_spec_conversion() {
        let spec = NodeSpec {
            name: "lim-4".to_string(),
            ip: "192.168.0.152".to_string(),
            ssh_username: "pi".to_string(),
            ssh_password: "raspberry".to_string(),
        };
        let node = spec.into_new_node(Some(false));
        assert_eq!(node.is_master, Some(false));
        assert_eq!(node.ssh_username, "pi");
    }
}
