//! Response reconciliation
//!
//! A remote agent answers `message/send` with a direct message, with
//! artifacts, or with a task that finishes later. [`Reconciler`] turns any of
//! the three into one final text answer, polling tasks until they settle.
//!
//! Internally the outcome keeps the reason an answer is missing
//! ([`PollOutcome`]); callers that only care about the text use
//! [`PollOutcome::into_text`], where every failure is `None`.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use carelink_core::PollingConfig;

use crate::error::A2aError;
use crate::protocol::{Message, ResponseEnvelope, Role, Task, TaskState, new_text_message};

/// The two remote calls the reconciler needs
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn send_message(&self, message: Message) -> Result<ResponseEnvelope, A2aError>;
    async fn get_task(&self, task_id: &str) -> Result<Task, A2aError>;
}

#[async_trait]
impl<T: AgentTransport + ?Sized> AgentTransport for Arc<T> {
    async fn send_message(&self, message: Message) -> Result<ResponseEnvelope, A2aError> {
        (**self).send_message(message).await
    }

    async fn get_task(&self, task_id: &str) -> Result<Task, A2aError> {
        (**self).get_task(task_id).await
    }
}

/// How a reconciliation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Final text answer
    Answer(String),
    /// Completed, but there was no agent-authored text to return
    EmptyResult,
    /// The task reached `failed` or `rejected`
    TerminalFailure,
    /// The task reached `canceled`
    TerminalCancellation,
    /// Querying the task failed
    Unreachable(String),
    /// The caller's deadline passed before the task settled
    DeadlineExceeded,
    /// The caller cancelled polling
    Aborted,
}

impl PollOutcome {
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Answer(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_answer(&self) -> bool {
        matches!(self, Self::Answer(_))
    }
}

/// Polling cadence
///
/// Defaults to a 1 second interval and no deadline: polling continues until
/// the task settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub deadline: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            deadline: None,
        }
    }
}

impl From<&PollingConfig> for PollOptions {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: config.interval(),
            deadline: config.timeout(),
        }
    }
}

/// Text of the first part of a message
fn first_part_text(message: &Message) -> Option<String> {
    message
        .parts
        .first()
        .and_then(|p| p.as_text())
        .map(str::to_string)
}

/// Text carried directly by an envelope: the first part of a message, or the
/// first part of the first artifact. Task envelopes carry none.
pub fn extract_first_text(envelope: &ResponseEnvelope) -> Option<String> {
    match envelope {
        ResponseEnvelope::Message(message) => first_part_text(message),
        ResponseEnvelope::Artifact { artifacts, .. } => artifacts
            .first()
            .and_then(|a| a.parts.first())
            .and_then(|p| p.as_text())
            .map(str::to_string),
        ResponseEnvelope::Task(_) => None,
    }
}

/// Outcome for a task, or `None` while it is still in progress
///
/// `input-required`, `auth-required` and `unknown` count as in progress.
pub fn settle(task: &Task) -> Option<PollOutcome> {
    match task.status.state {
        TaskState::Completed => Some(
            task.history
                .last()
                .filter(|m| m.role == Role::Agent)
                .and_then(Message::text)
                .map_or(PollOutcome::EmptyResult, PollOutcome::Answer),
        ),
        TaskState::Failed | TaskState::Rejected => Some(PollOutcome::TerminalFailure),
        TaskState::Cancelled => Some(PollOutcome::TerminalCancellation),
        TaskState::Submitted
        | TaskState::Working
        | TaskState::InputRequired
        | TaskState::AuthRequired
        | TaskState::Unknown => None,
    }
}

/// Sends prompts to one agent and reconciles its responses
pub struct Reconciler<T> {
    transport: T,
    options: PollOptions,
    cancel: Option<CancellationToken>,
}

impl<T: AgentTransport> Reconciler<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            options: PollOptions::default(),
            cancel: None,
        }
    }

    pub fn with_options(mut self, options: PollOptions) -> Self {
        self.options = options;
        self
    }

    /// Stop polling as soon as `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send `prompt` as a user message and return the final answer, if any.
    /// Only the send itself can fail; everything after is folded into `None`.
    pub async fn ask(&self, prompt: &str) -> Result<Option<String>, A2aError> {
        Ok(self.ask_outcome(prompt).await?.into_text())
    }

    /// Like [`ask`](Self::ask), keeping the reason an answer is missing.
    /// Cancellation also abandons a send that is still waiting for the agent.
    pub async fn ask_outcome(&self, prompt: &str) -> Result<PollOutcome, A2aError> {
        let message = new_text_message(Role::User, prompt);
        let message_id = message.message_id.clone();
        debug!("Sending message {}", message_id);

        let send = self.transport.send_message(message);
        let envelope = match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!("Message {} abandoned before the agent answered", message_id);
                    return Ok(PollOutcome::Aborted);
                }
                result = send => result?,
            },
            None => send.await?,
        };
        Ok(self.resolve(envelope).await)
    }

    /// Answer text of an envelope, `None` if there is none
    pub async fn answer(&self, envelope: ResponseEnvelope) -> Option<String> {
        self.resolve(envelope).await.into_text()
    }

    /// Dispatch on the envelope's kind; only task envelopes are polled
    pub async fn resolve(&self, envelope: ResponseEnvelope) -> PollOutcome {
        let task = match envelope {
            ResponseEnvelope::Task(task) => task,
            direct => {
                match &direct {
                    ResponseEnvelope::Message(message) => {
                        info!("Message ID: {}", message.message_id)
                    }
                    ResponseEnvelope::Artifact { artifacts, .. } => {
                        if let Some(artifact) = artifacts.first() {
                            info!("Artifact ID: {}", artifact.artifact_id);
                        }
                    }
                    ResponseEnvelope::Task(_) => {}
                }
                return text_outcome(extract_first_text(&direct));
            }
        };

        info!("Task {} accepted (state: {})", task.id, task.status.state);
        self.poll_task(&task.id).await
    }

    /// Query the task until it settles, the deadline passes, or polling is
    /// cancelled. The first query is immediate.
    pub async fn poll_task(&self, task_id: &str) -> PollOutcome {
        // A deadline too far out to represent is no deadline
        let deadline = self
            .options
            .deadline
            .and_then(|d| Instant::now().checked_add(d));
        let mut polls: u32 = 0;

        loop {
            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                info!("Polling of task {} cancelled after {} polls", task_id, polls);
                return PollOutcome::Aborted;
            }

            polls += 1;
            let task = match self.query(task_id, deadline).await {
                Ok(task) => task,
                Err(outcome) => return outcome,
            };

            debug!(
                "Task {} poll #{}: {} (at {:?})",
                task_id,
                polls,
                task.status.state,
                task.status.timestamp()
            );

            if let Some(outcome) = settle(&task) {
                report(task_id, polls, &outcome);
                return outcome;
            }

            let mut pause = self.options.interval;
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    warn!("Task {} still {} at deadline", task_id, task.status.state);
                    return PollOutcome::DeadlineExceeded;
                }
                pause = pause.min(remaining);
            }

            match &self.cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            info!("Polling of task {} cancelled after {} polls", task_id, polls);
                            return PollOutcome::Aborted;
                        }
                        _ = tokio::time::sleep(pause) => {}
                    }
                }
                None => tokio::time::sleep(pause).await,
            }
        }
    }

    async fn query(&self, task_id: &str, deadline: Option<Instant>) -> Result<Task, PollOutcome> {
        let result = match deadline {
            Some(deadline) => {
                match tokio::time::timeout_at(deadline, self.transport.get_task(task_id)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("Task {} status query ran past the deadline", task_id);
                        return Err(PollOutcome::DeadlineExceeded);
                    }
                }
            }
            None => self.transport.get_task(task_id).await,
        };

        result.map_err(|e| {
            warn!("Failed to query task {}: {}", task_id, e);
            PollOutcome::Unreachable(e.to_string())
        })
    }
}

fn text_outcome(text: Option<String>) -> PollOutcome {
    text.map_or(PollOutcome::EmptyResult, PollOutcome::Answer)
}

fn report(task_id: &str, polls: u32, outcome: &PollOutcome) {
    match outcome {
        PollOutcome::Answer(_) => info!("Task {} completed after {} polls", task_id, polls),
        PollOutcome::EmptyResult => {
            warn!("Task {} completed without an agent answer", task_id)
        }
        PollOutcome::TerminalFailure => warn!("Task {} failed", task_id),
        PollOutcome::TerminalCancellation => warn!("Task {} cancelled", task_id),
        _ => {}
    }
}
