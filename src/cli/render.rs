//! Plain-text terminal rendering of view updates.

use tokio::sync::mpsc::UnboundedReceiver;

use crate::nodes::{DashboardStats, NodeRecord};
use crate::progress::{Outcome, StepId, StepStatus};
use crate::view::ViewUpdate;

/// Text for one update, or `None` for updates with nothing to print.
pub fn render(update: &ViewUpdate) -> Option<String> {
    let text = match update {
        ViewUpdate::DeploymentStarted { id } => format!("Deployment {} started", id),
        ViewUpdate::Progress { percent, message } => format!("[{:>3}%] {}", percent, message),
        ViewUpdate::Steps(statuses) => steps_line(statuses),
        ViewUpdate::Log(line) => format!("  {} {}", line.at.format("%H:%M:%S"), line.text),
        ViewUpdate::DeploymentFinished(Outcome::Succeeded) => {
            "✓ Deployment finished".to_string()
        }
        ViewUpdate::DeploymentFinished(Outcome::Failed { reason }) => {
            format!("✗ Deployment failed: {}", reason)
        }

        ViewUpdate::SessionWarningShown => {
            "⚠ Your session expires soon. Type 'extend' to stay logged in or 'dismiss' to hide this."
                .to_string()
        }
        ViewUpdate::SessionExtended => "✓ Session extended".to_string(),
        ViewUpdate::SessionWarningCleared => return None,
        ViewUpdate::LoginRequired => "Login required. Type 'login <user> <password>'.".to_string(),
        ViewUpdate::Unauthenticated => "Please login to view data".to_string(),

        ViewUpdate::Stats(stats) => stats_line(stats),
        ViewUpdate::EdgeNodes(nodes) => node_table("Edge nodes", nodes),
        ViewUpdate::IotNodes(nodes) => node_table("IoT nodes", nodes),
        ViewUpdate::ListingError { section, message } => {
            format!("Failed to load {}: {}", section, message)
        }
        ViewUpdate::Notice(message) => message.clone(),
    };
    Some(text)
}

/// Print updates until every sender is gone.
pub async fn run(mut rx: UnboundedReceiver<ViewUpdate>) {
    while let Some(update) = rx.recv().await {
        if let Some(text) = render(&update) {
            println!("{}", text);
        }
    }
}

fn status_marker(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => "·",
        StepStatus::Active => "▶",
        StepStatus::Completed => "✓",
        StepStatus::Failed => "✗",
    }
}

fn steps_line(statuses: &[StepStatus; 4]) -> String {
    let parts: Vec<String> = StepId::ALL
        .iter()
        .map(|step| format!("{} {}", status_marker(statuses[step.index()]), step.label()))
        .collect();
    format!("  {}", parts.join("  "))
}

pub fn stats_line(stats: &DashboardStats) -> String {
    format!(
        "Nodes: {} total, {} edge, {} IoT | avg CPU {}",
        stats.total_nodes,
        stats.edge_nodes,
        stats.iot_nodes,
        stats.avg_cpu_display()
    )
}

pub fn node_table(title: &str, nodes: &[NodeRecord]) -> String {
    let mut out = format!("{} ({})\n", title, nodes.len());
    if nodes.is_empty() {
        out.push_str("  No nodes found");
        return out;
    }

    out.push_str(&format!(
        "  {:<20} {:<16} {:<8} {:>7} {:>8}",
        "NAME", "IP", "STATUS", "CPU", "MEMORY"
    ));
    for node in nodes {
        let marker = if node.is_protected() { " (protected)" } else { "" };
        out.push_str(&format!(
            "\n  {:<20} {:<16} {:<8} {:>7} {:>8}{}",
            node.name,
            node.ip.as_deref().unwrap_or("-"),
            node.status.to_string(),
            node.cpu.as_deref().unwrap_or("-"),
            node.memory.as_deref().unwrap_or("-"),
            marker
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::NodeStatus;
    use crate::refresh::Section;

    #[test]
    fn test_progress_and_steps() {
        assert_eq!(
            render(&ViewUpdate::Progress {
                percent: 5,
                message: "Starting deployment...".to_string()
            })
            .unwrap(),
            "[  5%] Starting deployment..."
        );

        let steps = render(&ViewUpdate::Steps([
            StepStatus::Completed,
            StepStatus::Active,
            StepStatus::Pending,
            StepStatus::Pending,
        ]))
        .unwrap();
        assert!(steps.contains("✓ Setting up master node"));
        assert!(steps.contains("▶ Setting up worker nodes"));
        assert!(steps.contains("· Finalizing deployment"));
    }

    #[test]
    fn test_warning_cleared_prints_nothing() {
        assert_eq!(render(&ViewUpdate::SessionWarningCleared), None);
    }

    #[test]
    fn test_node_table() {
        let nodes = vec![NodeRecord {
            name: "nuc2".to_string(),
            ip: Some("192.168.0.147".to_string()),
            status: NodeStatus::Online,
            cpu: Some("12%".to_string()),
            memory: None,
            role: None,
            rtsp_url: None,
        }];
        let table = node_table("Edge nodes", &nodes);
        assert!(table.starts_with("Edge nodes (1)"));
        assert!(table.contains("192.168.0.147"));
        assert!(table.contains("online"));
        assert!(table.contains("(protected)"));

        assert!(node_table("IoT nodes", &[]).contains("No nodes found"));
    }

    #[test]
    fn test_listing_error() {
        let text = render(&ViewUpdate::ListingError {
            section: Section::IotNodes,
            message: "database unavailable".to_string(),
        })
        .unwrap();
        assert_eq!(text, "Failed to load iot-nodes: database unavailable");
    }
}
