//! Step state for a single deployment.

use chrono::{DateTime, Local};
use serde::Serialize;
use uuid::Uuid;

use super::event::{ProgressEvent, ProgressUpdate, StepId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Active,
    Completed,
    Failed,
}

/// Display status of the four deployment steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepBoard([StepStatus; 4]);

impl StepBoard {
    pub fn status(&self, step: StepId) -> StepStatus {
        self.0[step.index()]
    }

    pub fn statuses(&self) -> [StepStatus; 4] {
        self.0
    }

    pub fn active(&self) -> Option<StepId> {
        StepId::ALL
            .into_iter()
            .find(|step| self.status(*step) == StepStatus::Active)
    }

    fn reset(&mut self) {
        self.0 = [StepStatus::Pending; 4];
    }

    /// Reset, then mark `step` active and everything before it completed.
    /// `None` (a step name we don't know) leaves every step pending.
    fn activate(&mut self, step: Option<StepId>) {
        self.reset();
        if let Some(step) = step {
            for earlier in &StepId::ALL[..step.index()] {
                self.0[earlier.index()] = StepStatus::Completed;
            }
            self.0[step.index()] = StepStatus::Active;
        }
    }

    fn complete(&mut self) {
        for status in self.0.iter_mut() {
            if *status == StepStatus::Active {
                *status = StepStatus::Completed;
            }
        }
        self.0[StepId::Complete.index()] = StepStatus::Completed;
    }

    fn fail_all(&mut self) {
        self.0 = [StepStatus::Failed; 4];
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub at: DateTime<Local>,
    pub text: String,
}

impl LogLine {
    fn now(text: impl Into<String>) -> Self {
        Self {
            at: Local::now(),
            text: text.into(),
        }
    }
}

/// What applying an event did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Updated,
    Completed,
    Failed,
    /// The session had already reached a terminal state.
    Ignored,
}

pub const STARTING_MESSAGE: &str = "Starting deployment...";
pub const COMPLETED_MESSAGE: &str = "Deployment completed successfully!";

/// One deployment, from trigger to terminal event.
#[derive(Debug, Clone)]
pub struct DeploymentSession {
    id: Uuid,
    steps: StepBoard,
    percent: u8,
    message: String,
    log: Vec<LogLine>,
    outcome: Option<Outcome>,
}

impl DeploymentSession {
    /// A fresh session: every step pending except `master`, which is active.
    pub fn start() -> Self {
        let mut steps = StepBoard::default();
        steps.activate(Some(StepId::Master));

        Self {
            id: Uuid::new_v4(),
            steps,
            percent: 0,
            message: STARTING_MESSAGE.to_string(),
            log: vec![LogLine::now(STARTING_MESSAGE)],
            outcome: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn steps(&self) -> &StepBoard {
        &self.steps
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn log(&self) -> &[LogLine] {
        &self.log
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn note(&mut self, text: impl Into<String>) {
        self.log.push(LogLine::now(text));
    }

    pub fn apply(&mut self, event: &ProgressEvent) -> Applied {
        if self.is_terminal() {
            return Applied::Ignored;
        }

        match event {
            ProgressEvent::Progress(update) => self.apply_progress(update),
            ProgressEvent::Error { message } => self.fail(message),
        }
    }

    /// Terminal failure of every step. Used for `error` events and for a
    /// failed deployment trigger alike.
    pub fn fail(&mut self, reason: &str) -> Applied {
        if self.is_terminal() {
            return Applied::Ignored;
        }

        self.steps.fail_all();
        self.message = format!("Deployment failed: {}", reason);
        self.note(self.message.clone());
        self.outcome = Some(Outcome::Failed {
            reason: reason.to_string(),
        });
        Applied::Failed
    }

    fn apply_progress(&mut self, update: &ProgressUpdate) -> Applied {
        self.percent = update.percent();
        self.message = update.message.clone();
        if !update.message.is_empty() {
            self.note(update.message.clone());
        }

        if let Some(active) = &update.active_step {
            self.steps.activate(active.step());
        }

        if !update.completed {
            return Applied::Updated;
        }

        self.percent = 100;
        self.message = COMPLETED_MESSAGE.to_string();
        self.steps.complete();
        self.note(COMPLETED_MESSAGE);
        if let Some(details) = &update.details {
            for line in details.summary_lines() {
                self.note(line);
            }
        }
        self.outcome = Some(Outcome::Succeeded);
        Applied::Completed
    }
}
