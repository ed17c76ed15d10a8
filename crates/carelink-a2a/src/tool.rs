//! `delegate_to_agent` tool: asks a remote A2A agent and returns its answer

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use carelink_core::tools::{ToolHandler, json_schema};
use carelink_core::{AgentConfig, HttpConfig};

use crate::client::A2aClient;
use crate::error::A2aError;
use crate::reconcile::{AgentTransport, PollOptions, PollOutcome, Reconciler};

/// Delegates a question to a configured agent (or any agent URL)
pub struct DelegateToAgentTool {
    http: Client,
    peers: Vec<AgentConfig>,
    options: PollOptions,
}

impl DelegateToAgentTool {
    pub fn new(peers: Vec<AgentConfig>, http: &HttpConfig, options: PollOptions) -> Result<Self> {
        let http = Client::builder()
            .timeout(http.timeout())
            .build()
            .map_err(A2aError::Client)?;
        Ok(Self {
            http,
            peers,
            options,
        })
    }
}

#[async_trait]
impl ToolHandler for DelegateToAgentTool {
    fn name(&self) -> &str {
        "delegate_to_agent"
    }

    fn description(&self) -> &str {
        "Ask a peer healthcare agent over the A2A protocol and return its final answer. \
         Use the policy agent for insurance coverage, the health agent for general \
         health questions and the providers agent to find doctors."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "agent": {
                    "type": "string",
                    "description": format!(
                        "Name of a known agent ({}) or the agent's full URL",
                        self.peers.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", ")
                    )
                },
                "task": {
                    "type": "string",
                    "description": "Question or task for the agent"
                }
            }),
            vec!["agent", "task"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let agent_name = input
            .get("agent")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("Missing 'agent' parameter"))?;
        let task = input
            .get("task")
            .and_then(|v| v.as_str())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| anyhow!("Missing 'task' parameter"))?;

        let agent = AgentConfig::resolve(&self.peers, agent_name)?;
        debug!(
            "Delegating to {} at {}: {}",
            agent.name,
            agent.url,
            task.chars().take(100).collect::<String>()
        );

        let client = A2aClient::with_http(self.http.clone(), agent);
        let reconciler = Reconciler::new(client).with_options(self.options.clone());
        delegate(&reconciler, agent_name, task).await
    }
}

/// Ask through `reconciler` and describe the outcome for the calling model
async fn delegate<T: AgentTransport>(
    reconciler: &Reconciler<T>,
    agent_name: &str,
    task: &str,
) -> Result<String> {
    Ok(match reconciler.ask_outcome(task).await? {
        PollOutcome::Answer(text) => text,
        PollOutcome::EmptyResult => format!("Agent '{}' finished without an answer", agent_name),
        PollOutcome::TerminalFailure => format!("Agent '{}' failed the task", agent_name),
        PollOutcome::TerminalCancellation => format!("Agent '{}' cancelled the task", agent_name),
        PollOutcome::Unreachable(reason) => {
            format!("Lost contact with agent '{}': {}", agent_name, reason)
        }
        PollOutcome::DeadlineExceeded => {
            format!("Agent '{}' did not finish in time", agent_name)
        }
        PollOutcome::Aborted => format!("Request to agent '{}' was cancelled", agent_name),
    })
}
