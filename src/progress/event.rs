//! Progress events delivered over the progress channel.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// The four fixed deployment phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepId {
    #[serde(rename = "step-master", alias = "master")]
    Master,
    #[serde(rename = "step-workers", alias = "workers")]
    Workers,
    #[serde(rename = "step-apps", alias = "apps")]
    Apps,
    #[serde(rename = "step-complete", alias = "complete")]
    Complete,
}

impl StepId {
    pub const ALL: [StepId; 4] = [
        StepId::Master,
        StepId::Workers,
        StepId::Apps,
        StepId::Complete,
    ];

    /// Position in the fixed step order.
    pub fn index(self) -> usize {
        match self {
            StepId::Master => 0,
            StepId::Workers => 1,
            StepId::Apps => 2,
            StepId::Complete => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StepId::Master => "Setting up master node",
            StepId::Workers => "Setting up worker nodes",
            StepId::Apps => "Deploying applications",
            StepId::Complete => "Finalizing deployment",
        }
    }
}

/// Step named by a progress event. Names the backend invents later are kept
/// instead of failing the whole payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ActiveStep {
    Known(StepId),
    Unknown(String),
}

impl ActiveStep {
    pub fn step(&self) -> Option<StepId> {
        match self {
            ActiveStep::Known(step) => Some(*step),
            ActiveStep::Unknown(_) => None,
        }
    }
}

impl From<StepId> for ActiveStep {
    fn from(step: StepId) -> Self {
        ActiveStep::Known(step)
    }
}

/// An empty step name means "no step", same as a missing one.
fn present_step<'de, D>(deserializer: D) -> Result<Option<ActiveStep>, D::Error>
where
    D: Deserializer<'de>,
{
    let step = Option::<ActiveStep>::deserialize(deserializer)?;
    Ok(step.filter(|s| !matches!(s, ActiveStep::Unknown(name) if name.trim().is_empty())))
}

/// Free-form completion summary. Values are shown as-is.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeploymentDetails {
    #[serde(default)]
    pub master_setup: Option<Value>,
    #[serde(default)]
    pub worker_nodes_joined: Option<Value>,
    #[serde(default)]
    pub new_nodes_added: Option<Value>,
    #[serde(default)]
    pub manifests_applied: Option<Value>,
}

impl DeploymentDetails {
    /// Human-readable summary lines for the fields that are present.
    pub fn summary_lines(&self) -> Vec<String> {
        [
            ("Master setup", &self.master_setup),
            ("Worker nodes joined", &self.worker_nodes_joined),
            ("New nodes added", &self.new_nodes_added),
            ("Manifests applied", &self.manifests_applied),
        ]
        .into_iter()
        .filter_map(|(label, value)| {
            value
                .as_ref()
                .map(|v| format!("{}: {}", label, display_value(v)))
        })
        .collect()
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProgressUpdate {
    #[serde(default)]
    percent: u32,
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "present_step")]
    pub active_step: Option<ActiveStep>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub details: Option<DeploymentDetails>,
}

impl ProgressUpdate {
    pub fn new(percent: u32, message: impl Into<String>) -> Self {
        Self {
            percent,
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_step(mut self, step: impl Into<ActiveStep>) -> Self {
        self.active_step = Some(step.into());
        self
    }

    pub fn with_details(mut self, details: DeploymentDetails) -> Self {
        self.details = Some(details);
        self
    }

    pub fn completed(mut self) -> Self {
        self.completed = true;
        self
    }

    /// Reported percentage, clamped to 100.
    pub fn percent(&self) -> u8 {
        self.percent.min(100) as u8
    }
}

/// A single message from the deployment backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Progress(ProgressUpdate),
    Error {
        #[serde(default)]
        message: String,
    },
}

impl ProgressEvent {
    /// Parse a text frame. Anything that is not a known JSON event is an error.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn error(message: impl Into<String>) -> Self {
        ProgressEvent::Error {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            ProgressEvent::Progress(update) => update.completed,
            ProgressEvent::Error { .. } => true,
        }
    }
}

impl From<ProgressUpdate> for ProgressEvent {
    fn from(update: ProgressUpdate) -> Self {
        ProgressEvent::Progress(update)
    }
}
