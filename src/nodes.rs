//! Managed node records and the aggregates derived from them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Warning,
    #[default]
    #[serde(other)]
    Offline,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Online => write!(f, "online"),
            NodeStatus::Warning => write!(f, "warning"),
            NodeStatus::Offline => write!(f, "offline"),
        }
    }
}

/// A node as returned by the listing endpoints. Edge nodes report `ip`, IoT
/// nodes report `ip_address`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    #[serde(default, alias = "ip_address")]
    pub ip: Option<String>,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(default)]
    pub cpu: Option<String>,
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtsp_url: Option<String>,
}

const PROTECTED_MARKERS: [&str; 3] = ["nuc2", "master", "control-plane"];

impl NodeRecord {
    /// CPU usage as a number; missing or unparseable values count as zero.
    pub fn cpu_percent(&self) -> f64 {
        self.cpu
            .as_deref()
            .map(|cpu| cpu.trim().trim_end_matches('%').trim())
            .and_then(|cpu| cpu.parse::<f64>().ok())
            .filter(|cpu| cpu.is_finite())
            .unwrap_or(0.0)
    }

    /// Control-plane nodes cannot be removed from the client.
    pub fn is_protected(&self) -> bool {
        is_protected_name(&self.name)
    }
}

pub fn is_protected_name(name: &str) -> bool {
    let name = name.to_lowercase();
    PROTECTED_MARKERS.iter().any(|marker| name.contains(marker))
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DashboardStats {
    pub total_nodes: usize,
    pub edge_nodes: usize,
    pub iot_nodes: usize,
    pub avg_cpu: f64,
}

impl DashboardStats {
    pub fn from_collections(edge: &[NodeRecord], iot: &[NodeRecord]) -> Self {
        let total_nodes = edge.len() + iot.len();
        let cpu_sum: f64 = edge.iter().chain(iot).map(NodeRecord::cpu_percent).sum();
        let avg_cpu = if total_nodes > 0 {
            cpu_sum / total_nodes as f64
        } else {
            0.0
        };

        Self {
            total_nodes,
            edge_nodes: edge.len(),
            iot_nodes: iot.len(),
            avg_cpu,
        }
    }

    pub fn avg_cpu_display(&self) -> String {
        format!("{:.1}%", self.avg_cpu)
    }
}
