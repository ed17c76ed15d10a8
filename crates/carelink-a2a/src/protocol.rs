//! A2A (Agent-to-Agent) protocol types
//!
//! JSON-RPC 2.0 envelopes plus the message, task and agent card shapes used by
//! `message/send`, `tasks/get` and `tasks/cancel`. Field names follow the
//! camelCase wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::A2aError;

/// JSON-RPC method names
pub mod methods {
    pub const MESSAGE_SEND: &str = "message/send";
    pub const TASKS_GET: &str = "tasks/get";
    pub const TASKS_CANCEL: &str = "tasks/cancel";
}

/// Well-known agent card locations, current first
pub const AGENT_CARD_PATHS: [&str; 2] = ["/.well-known/agent-card.json", "/.well-known/agent.json"];

// ── JSON-RPC ──

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<P> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: P,
}

impl<P> JsonRpcRequest<P> {
    pub fn new(id: u64, method: &'static str, params: P) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct MessageSendParams {
    pub message: Message,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskQueryParams {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_length: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct TaskIdParams {
    pub id: String,
}

// ── Messages ──

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// One content part, discriminated by `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
    File {
        file: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
    Data {
        data: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            metadata: None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } => Some(text),
            _ => None,
        }
    }
}

fn kind_message() -> String {
    "message".to_string()
}

fn kind_task() -> String {
    "task".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: String,
    pub role: Role,
    pub parts: Vec<Part>,
    #[serde(default = "kind_message")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl Message {
    /// All text parts joined by newlines, `None` when there are none
    pub fn text(&self) -> Option<String> {
        let texts: Vec<&str> = self.parts.iter().filter_map(Part::as_text).collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n"))
        }
    }
}

/// A single-part text message with a fresh hex message id
pub fn new_text_message(role: Role, text: impl Into<String>) -> Message {
    Message {
        message_id: Uuid::new_v4().simple().to_string(),
        role,
        parts: vec![Part::text(text)],
        kind: kind_message(),
        context_id: None,
        task_id: None,
    }
}

// ── Tasks ──

/// Task lifecycle state
///
/// `completed`, `failed`, `canceled` and `rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    AuthRequired,
    Completed,
    Failed,
    #[serde(rename = "canceled", alias = "cancelled")]
    Cancelled,
    Rejected,
    Unknown,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Rejected
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Submitted => "submitted",
            Self::Working => "working",
            Self::InputRequired => "input-required",
            Self::AuthRequired => "auth-required",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "canceled",
            Self::Rejected => "rejected",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl TaskStatus {
    pub fn new(state: TaskState) -> Self {
        Self {
            state,
            message: None,
            timestamp: None,
        }
    }

    /// Parsed `timestamp`, if present and RFC 3339
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub artifact_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    #[serde(default = "kind_task")]
    pub kind: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
}

/// `artifact-update` event payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactUpdate {
    #[serde(default)]
    task_id: Option<String>,
    artifact: Artifact,
}

// ── Response envelope ──

/// What a `message/send` call answered with; exactly one shape per response
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEnvelope {
    /// Direct final answer
    Message(Message),
    /// Output units already produced for a task
    Artifact {
        task_id: Option<String>,
        artifacts: Vec<Artifact>,
    },
    /// Asynchronous work to be polled
    Task(Task),
}

impl ResponseEnvelope {
    /// Decode a `message/send` result by its `kind` discriminator.
    ///
    /// A completed task that already carries artifacts is surfaced as
    /// `Artifact`; every other task is left for polling.
    pub fn from_result(value: Value) -> Result<Self, A2aError> {
        let kind = value
            .get("kind")
            .and_then(|k| k.as_str())
            .ok_or_else(|| A2aError::Decode("response is missing 'kind'".to_string()))?
            .to_string();

        let decode = |e: serde_json::Error| A2aError::Decode(format!("invalid {}: {}", kind, e));

        match kind.as_str() {
            "message" => Ok(Self::Message(
                serde_json::from_value(value).map_err(decode)?,
            )),
            "artifact-update" => {
                let update: ArtifactUpdate = serde_json::from_value(value).map_err(decode)?;
                Ok(Self::Artifact {
                    task_id: update.task_id,
                    artifacts: vec![update.artifact],
                })
            }
            "task" => {
                let task: Task = serde_json::from_value(value).map_err(decode)?;
                if task.status.state == TaskState::Completed && !task.artifacts.is_empty() {
                    Ok(Self::Artifact {
                        task_id: Some(task.id),
                        artifacts: task.artifacts,
                    })
                } else {
                    Ok(Self::Task(task))
                }
            }
            other => Err(A2aError::Decode(format!(
                "unknown response kind '{}', expected message, task or artifact-update",
                other
            ))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Artifact { .. } => "artifact",
            Self::Task(_) => "task",
        }
    }
}

// ── Agent card ──

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentCapabilities {
    #[serde(default)]
    pub streaming: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

/// Agent card, advertised at `/.well-known/agent-card.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub default_input_modes: Vec<String>,
    #[serde(default)]
    pub default_output_modes: Vec<String>,
    #[serde(default)]
    pub capabilities: AgentCapabilities,
    #[serde(default)]
    pub skills: Vec<AgentSkill>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn agent_message(text: &str) -> Value {
        json!({
            "kind": "message",
            "messageId": "m-1",
            "role": "agent",
            "parts": [{"kind": "text", "text": text}]
        })
    }

    #[test]
    fn test_text_message_wire_format() {
        let msg = new_text_message(Role::User, "How much would I pay for therapy?");
        assert_eq!(msg.message_id.len(), 32);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["kind"], "message");
        assert_eq!(json["parts"][0]["kind"], "text");
        assert_eq!(json["parts"][0]["text"], "How much would I pay for therapy?");
        assert!(json.get("contextId").is_none());
    }

    #[test]
    fn test_message_ids_are_unique() {
        let a = new_text_message(Role::User, "a");
        let b = new_text_message(Role::User, "a");
        assert_ne!(a.message_id, b.message_id);
    }

    #[test]
    fn test_message_text_joins_text_parts() {
        let msg = Message {
            message_id: "m".to_string(),
            role: Role::Agent,
            parts: vec![
                Part::text("first"),
                Part::Data {
                    data: json!({"x": 1}),
                    metadata: None,
                },
                Part::text("second"),
            ],
            kind: "message".to_string(),
            context_id: None,
            task_id: None,
        };
        assert_eq!(msg.text().as_deref(), Some("first\nsecond"));
    }

    #[test]
    fn test_task_state_wire_names() {
        let state: TaskState = serde_json::from_value(json!("input-required")).unwrap();
        assert_eq!(state, TaskState::InputRequired);
        let state: TaskState = serde_json::from_value(json!("canceled")).unwrap();
        assert_eq!(state, TaskState::Cancelled);
        let state: TaskState = serde_json::from_value(json!("cancelled")).unwrap();
        assert_eq!(state, TaskState::Cancelled);
        assert_eq!(serde_json::to_value(TaskState::Cancelled).unwrap(), "canceled");
        assert_eq!(TaskState::Working.to_string(), "working");
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
        assert!(TaskState::Rejected.is_terminal());
        assert!(!TaskState::Submitted.is_terminal());
        assert!(!TaskState::Working.is_terminal());
        assert!(!TaskState::InputRequired.is_terminal());
    }

    #[test]
    fn test_status_timestamp_parsing() {
        let mut status = TaskStatus::new(TaskState::Working);
        assert!(status.timestamp().is_none());
        status.timestamp = Some("2025-06-01T12:00:00+02:00".to_string());
        assert_eq!(
            status.timestamp().unwrap().to_rfc3339(),
            "2025-06-01T10:00:00+00:00"
        );
        status.timestamp = Some("yesterday".to_string());
        assert!(status.timestamp().is_none());
    }

    #[test]
    fn test_envelope_message() {
        let env = ResponseEnvelope::from_result(agent_message("hello")).unwrap();
        assert_eq!(env.kind(), "message");
        match env {
            ResponseEnvelope::Message(m) => assert_eq!(m.text().as_deref(), Some("hello")),
            other => panic!("expected message, got {:?}", other),
        }
    }

    #[test]
    fn test_envelope_working_task() {
        let env = ResponseEnvelope::from_result(json!({
            "kind": "task",
            "id": "t-1",
            "contextId": "c-1",
            "status": {"state": "working"}
        }))
        .unwrap();
        match env {
            ResponseEnvelope::Task(t) => {
                assert_eq!(t.id, "t-1");
                assert_eq!(t.status.state, TaskState::Working);
                assert!(t.history.is_empty());
            }
            other => panic!("expected task, got {:?}", other),
        }
    }

    #[test]
    fn test_envelope_completed_task_with_artifacts() {
        let env = ResponseEnvelope::from_result(json!({
            "kind": "task",
            "id": "t-2",
            "status": {"state": "completed"},
            "artifacts": [{
                "artifactId": "a-1",
                "parts": [{"kind": "text", "text": "| Doctor | City |"}]
            }]
        }))
        .unwrap();
        match env {
            ResponseEnvelope::Artifact { task_id, artifacts } => {
                assert_eq!(task_id.as_deref(), Some("t-2"));
                assert_eq!(artifacts[0].artifact_id, "a-1");
            }
            other => panic!("expected artifact, got {:?}", other),
        }
    }

    #[test]
    fn test_envelope_artifact_update() {
        let env = ResponseEnvelope::from_result(json!({
            "kind": "artifact-update",
            "taskId": "t-3",
            "artifact": {"artifactId": "a-9", "parts": [{"kind": "text", "text": "x"}]}
        }))
        .unwrap();
        assert_eq!(env.kind(), "artifact");
    }

    #[test]
    fn test_envelope_unknown_kind() {
        let err = ResponseEnvelope::from_result(json!({"kind": "status-update"})).unwrap_err();
        assert!(err.to_string().contains("status-update"));
    }

    #[test]
    fn test_envelope_missing_kind() {
        let err = ResponseEnvelope::from_result(json!({"id": "t"})).unwrap_err();
        assert!(err.to_string().contains("kind"));
    }

    #[test]
    fn test_envelope_malformed_message() {
        let err = ResponseEnvelope::from_result(json!({"kind": "message", "role": "agent"}))
            .unwrap_err();
        assert!(matches!(err, A2aError::Decode(_)));
    }

    #[test]
    fn test_agent_card_deserialization() {
        let card: AgentCard = serde_json::from_value(json!({
            "name": "Insurance Coverage Agent",
            "description": "Provides information about insurance coverage options and details.",
            "url": "http://localhost:9999/",
            "version": "1.0.0",
            "protocolVersion": "0.3.0",
            "defaultInputModes": ["text"],
            "defaultOutputModes": ["text"],
            "capabilities": {"streaming": true},
            "skills": [{
                "id": "insurance_coverage",
                "name": "Insurance coverage",
                "description": "Coverage details",
                "tags": ["insurance"],
                "examples": ["What does my policy cover?"]
            }]
        }))
        .unwrap();
        assert_eq!(card.protocol_version.as_deref(), Some("0.3.0"));
        assert!(card.capabilities.streaming);
        assert_eq!(card.skills[0].examples.len(), 1);
    }

    #[test]
    fn test_jsonrpc_request_serialization() {
        let req = JsonRpcRequest::new(
            7,
            methods::TASKS_GET,
            TaskQueryParams {
                id: "t-1".to_string(),
                history_length: None,
            },
        );
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 7);
        assert_eq!(json["method"], "tasks/get");
        assert_eq!(json["params"], json!({"id": "t-1"}));
    }
}
