//! Multi-agent composition
//!
//! A sequential chain feeds each agent's answer into the next agent's prompt;
//! a fan-out asks every agent the same question concurrently.

use anyhow::{Context, Result};
use futures_util::future::join_all;
use tracing::{info, warn};

use crate::reconcile::{AgentTransport, Reconciler};

/// Follow-up used when a chain step hands its answer to the next agent
pub const DEFAULT_FOLLOW_UP: &str = "Give information about the coverage for this treatment.";

pub struct NamedAgent<T> {
    pub name: String,
    pub reconciler: Reconciler<T>,
}

impl<T: AgentTransport> NamedAgent<T> {
    pub fn new(name: impl Into<String>, reconciler: Reconciler<T>) -> Self {
        Self {
            name: name.into(),
            reconciler,
        }
    }
}

/// One agent's contribution to a workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepAnswer {
    pub agent: String,
    pub answer: Option<String>,
}

pub fn follow_up_prompt(previous: &str, follow_up: &str) -> String {
    format!("Context: {} {}", previous, follow_up)
}

/// Run `agents` in order. The first receives `prompt`; each later agent
/// receives the previous answer as context plus `follow_up`.
///
/// A step without an answer ends the chain early; its entry is still
/// returned. A failed send aborts the chain with an error.
pub async fn run_sequential<T: AgentTransport>(
    agents: &[NamedAgent<T>],
    prompt: &str,
    follow_up: &str,
) -> Result<Vec<StepAnswer>> {
    let mut steps = Vec::with_capacity(agents.len());
    let mut next_prompt = prompt.to_string();

    for (i, agent) in agents.iter().enumerate() {
        info!("Chain step {}/{}: {}", i + 1, agents.len(), agent.name);

        let answer = agent
            .reconciler
            .ask(&next_prompt)
            .await
            .with_context(|| format!("Agent '{}' failed", agent.name))?;

        let exhausted = answer.is_none();
        if let Some(text) = &answer {
            next_prompt = follow_up_prompt(text, follow_up);
        }
        steps.push(StepAnswer {
            agent: agent.name.clone(),
            answer,
        });

        if exhausted {
            warn!("Agent '{}' gave no answer, stopping chain", agent.name);
            break;
        }
    }

    Ok(steps)
}

/// Ask every agent `prompt` concurrently; answers come back in input order.
/// A failed send is logged and reported as no answer.
pub async fn run_parallel<T: AgentTransport>(
    agents: &[NamedAgent<T>],
    prompt: &str,
) -> Vec<StepAnswer> {
    let asks = agents.iter().map(|agent| async move {
        let answer = match agent.reconciler.ask(prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Agent '{}' failed: {}", agent.name, e);
                None
            }
        };
        StepAnswer {
            agent: agent.name.clone(),
            answer,
        }
    });

    let steps = join_all(asks).await;
    info!(
        "Fan-out complete: {}/{} agents answered",
        steps.iter().filter(|s| s.answer.is_some()).count(),
        steps.len()
    );
    steps
}
