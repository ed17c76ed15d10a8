//! A2A (Agent-to-Agent) protocol support for Carelink
//!
//! Sends messages to remote agents over JSON-RPC and reconciles whatever they
//! answer with (a direct message, an artifact, or a task to poll) into one
//! final text answer.

pub mod client;
pub mod error;
pub mod protocol;
pub mod reconcile;
pub mod tool;
pub mod workflow;

pub use client::A2aClient;
pub use error::A2aError;
pub use protocol::{
    AgentCard, Artifact, Message, Part, ResponseEnvelope, Role, Task, TaskState, TaskStatus,
};
pub use reconcile::{AgentTransport, PollOptions, PollOutcome, Reconciler};
pub use tool::DelegateToAgentTool;
pub use workflow::{NamedAgent, StepAnswer};
