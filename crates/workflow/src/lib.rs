//! Workflow runner: ordered multi-step jobs outside the message bus.
//!
//! A [`Workflow`] is a list of steps executed strictly one after another by a
//! [`StepExecutor`]. Each step sees the outputs of the steps before it. The
//! first failure stops the run and every step after it is marked skipped.
//!
//! Progress is reported as [`WorkflowEvent`]s on an optional channel, so a
//! CLI or UI can follow along while the run is in flight.

pub mod blueprint;
pub mod llm;

pub use blueprint::mobile_app_blueprint;
pub use llm::LlmStepExecutor;

use agentbus_core::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Workflow errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    #[error("Step '{0}' produced no output")]
    EmptyOutput(String),
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub name: String,
    /// What the step must produce; becomes the executor's instruction.
    pub description: String,
    pub status: StepStatus,
    /// Output of a completed step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            status: StepStatus::Pending,
            output: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub steps: Vec<WorkflowStep>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, steps: Vec<WorkflowStep>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            steps,
        }
    }

    /// Completed steps and total steps.
    pub fn progress(&self) -> (usize, usize) {
        let done = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count();
        (done, self.steps.len())
    }
}

/// A finished step, as seen by the steps after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    pub step_id: String,
    pub name: String,
    pub output: String,
}

/// What an executor knows while running one step.
pub struct WorkflowContext {
    pub workflow_name: String,
    /// 1-based position of the current step.
    pub position: usize,
    pub total: usize,
    /// Outputs of the completed steps, in order.
    pub previous: Vec<StepResult>,
    step_id: String,
    events: Option<mpsc::Sender<WorkflowEvent>>,
}

impl WorkflowContext {
    /// Forward a piece of streamed output. Dropped if the receiver lags.
    pub fn emit_output(&self, chunk: &str) {
        if let Some(events) = &self.events {
            let event = WorkflowEvent::StepOutput {
                step_id: self.step_id.clone(),
                chunk: chunk.to_string(),
            };
            if events.try_send(event).is_err() {
                debug!(step_id = %self.step_id, "Workflow event receiver lagging, chunk dropped");
            }
        }
    }
}

/// Runs one step.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, step: &WorkflowStep, context: &WorkflowContext) -> Result<String>;
}

/// Progress of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    StepStarted { step_id: String, name: String },
    StepOutput { step_id: String, chunk: String },
    StepCompleted { step_id: String },
    StepFailed { step_id: String, error: String },
    StepSkipped { step_id: String },
    Finished { completed: usize, total: usize, success: bool },
}

/// Outcome of [`WorkflowRunner::run`].
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub workflow_id: String,
    pub completed: usize,
    pub skipped: usize,
    /// The step that stopped the run, with its error.
    pub failure: Option<(String, String)>,
    pub results: Vec<StepResult>,
}

impl WorkflowReport {
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Default)]
pub struct WorkflowRunner {
    events: Option<mpsc::Sender<WorkflowEvent>>,
}

impl WorkflowRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report progress on `events`.
    pub fn with_events(mut self, events: mpsc::Sender<WorkflowEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Run every pending step in order.
    ///
    /// Steps already completed are kept and their outputs fed forward, so a
    /// workflow can be resumed after fixing the cause of a failure.
    pub async fn run(&self, workflow: &mut Workflow, executor: &dyn StepExecutor) -> WorkflowReport {
        info!(workflow = %workflow.name, steps = workflow.steps.len(), "Workflow started");
        let total = workflow.steps.len();
        let mut results: Vec<StepResult> = Vec::new();
        let mut failure: Option<(String, String)> = None;

        for index in 0..total {
            let step = &mut workflow.steps[index];

            if step.status == StepStatus::Completed {
                results.push(StepResult {
                    step_id: step.id.clone(),
                    name: step.name.clone(),
                    output: step.output.clone().unwrap_or_default(),
                });
                continue;
            }
            if failure.is_some() {
                step.status = StepStatus::Skipped;
                self.emit(WorkflowEvent::StepSkipped {
                    step_id: step.id.clone(),
                })
                .await;
                continue;
            }

            step.status = StepStatus::Running;
            self.emit(WorkflowEvent::StepStarted {
                step_id: step.id.clone(),
                name: step.name.clone(),
            })
            .await;

            let context = WorkflowContext {
                workflow_name: workflow.name.clone(),
                position: index + 1,
                total,
                previous: results.clone(),
                step_id: step.id.clone(),
                events: self.events.clone(),
            };
            let step = &mut workflow.steps[index];
            let outcome = match executor.execute(step, &context).await {
                Ok(output) if output.trim().is_empty() => {
                    Err(WorkflowError::EmptyOutput(step.name.clone()))
                }
                other => other,
            };

            match outcome {
                Ok(output) => {
                    debug!(step = %step.name, bytes = output.len(), "Step completed");
                    step.status = StepStatus::Completed;
                    step.output = Some(output.clone());
                    results.push(StepResult {
                        step_id: step.id.clone(),
                        name: step.name.clone(),
                        output,
                    });
                    self.emit(WorkflowEvent::StepCompleted {
                        step_id: step.id.clone(),
                    })
                    .await;
                }
                Err(e) => {
                    warn!(step = %step.name, "Step failed: {e}");
                    step.status = StepStatus::Failed;
                    self.emit(WorkflowEvent::StepFailed {
                        step_id: step.id.clone(),
                        error: e.to_string(),
                    })
                    .await;
                    failure = Some((step.id.clone(), e.to_string()));
                }
            }
        }

        let skipped = workflow
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Skipped)
            .count();
        let report = WorkflowReport {
            workflow_id: workflow.id.clone(),
            completed: results.len(),
            skipped,
            failure,
            results,
        };
        self.emit(WorkflowEvent::Finished {
            completed: report.completed,
            total,
            success: report.success(),
        })
        .await;
        info!(workflow = %workflow.name, completed = report.completed, total, "Workflow finished");
        report
    }

    async fn emit(&self, event: WorkflowEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event).await;
        }
    }
}
