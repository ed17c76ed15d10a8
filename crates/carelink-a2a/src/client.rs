//! A2A client: JSON-RPC over HTTP to one remote agent

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use carelink_core::{AgentConfig, HttpConfig};

use crate::error::A2aError;
use crate::protocol::*;
use crate::reconcile::AgentTransport;

/// Client for a single remote agent
///
/// Cloning is cheap and shares the connection pool and request id counter.
#[derive(Clone)]
pub struct A2aClient {
    http: Client,
    agent: AgentConfig,
    next_id: Arc<AtomicU64>,
}

impl A2aClient {
    pub fn new(agent: AgentConfig, settings: &HttpConfig) -> Result<Self, A2aError> {
        let http = Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(A2aError::Client)?;
        Ok(Self::with_http(http, agent))
    }

    /// Reuse an existing HTTP client, e.g. one pool for several agents
    pub fn with_http(http: Client, agent: AgentConfig) -> Self {
        Self {
            http,
            agent,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn agent(&self) -> &AgentConfig {
        &self.agent
    }

    fn base_url(&self) -> &str {
        self.agent.url.trim_end_matches('/')
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.agent.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Fetch the agent card, trying the current well-known path before the
    /// legacy one
    pub async fn fetch_agent_card(&self) -> Result<AgentCard, A2aError> {
        let mut not_found = None;

        for path in AGENT_CARD_PATHS {
            let url = format!("{}{}", self.base_url(), path);
            debug!("Fetching agent card from {}", url);

            let resp = self
                .authorize(self.http.get(&url))
                .send()
                .await
                .map_err(|source| A2aError::Connect {
                    url: url.clone(),
                    source,
                })?;

            if resp.status() == StatusCode::NOT_FOUND {
                debug!("No agent card at {}", url);
                not_found = Some(status_error(url, resp).await);
                continue;
            }
            if !resp.status().is_success() {
                return Err(status_error(url, resp).await);
            }

            let card: AgentCard = resp
                .json()
                .await
                .map_err(|e| A2aError::Decode(format!("invalid agent card: {}", e)))?;

            info!(
                "Fetched agent card: {} v{} ({} skills)",
                card.name,
                card.version,
                card.skills.len()
            );
            return Ok(card);
        }

        Err(not_found
            .unwrap_or_else(|| A2aError::Decode("no agent card location configured".to_string())))
    }

    /// Send a message and decode the response envelope
    pub async fn send_message(&self, message: Message) -> Result<ResponseEnvelope, A2aError> {
        let message_id = message.message_id.clone();
        let result: Value = self
            .call(methods::MESSAGE_SEND, MessageSendParams { message })
            .await?;
        let envelope = ResponseEnvelope::from_result(result)?;

        info!(
            "Message {} sent to {}: {} response",
            message_id,
            self.agent.name,
            envelope.kind()
        );
        Ok(envelope)
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Task, A2aError> {
        self.call(
            methods::TASKS_GET,
            TaskQueryParams {
                id: task_id.to_string(),
                history_length: None,
            },
        )
        .await
    }

    pub async fn cancel_task(&self, task_id: &str) -> Result<Task, A2aError> {
        let task: Task = self
            .call(
                methods::TASKS_CANCEL,
                TaskIdParams {
                    id: task_id.to_string(),
                },
            )
            .await?;
        info!("Task {} cancel requested (state: {})", task_id, task.status.state);
        Ok(task)
    }

    async fn call<P, R>(&self, method: &'static str, params: P) -> Result<R, A2aError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let url = self.agent.url.clone();
        debug!("A2A {} #{} -> {}", method, id, url);

        let request = JsonRpcRequest::new(id, method, params);
        let resp = self
            .authorize(self.http.post(&url).json(&request))
            .send()
            .await
            .map_err(|source| A2aError::Connect {
                url: url.clone(),
                source,
            })?;

        if !resp.status().is_success() {
            return Err(status_error(url, resp).await);
        }

        let body: JsonRpcResponse = resp
            .json()
            .await
            .map_err(|e| A2aError::Decode(format!("invalid JSON-RPC response: {}", e)))?;

        if body.id != Value::from(id) {
            warn!("A2A {} response id {} does not match request #{}", method, body.id, id);
        }

        if let Some(err) = body.error {
            return Err(A2aError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        let result = body.result.ok_or_else(|| {
            A2aError::Decode(format!("{} response has neither result nor error", method))
        })?;

        serde_json::from_value(result)
            .map_err(|e| A2aError::Decode(format!("invalid {} result: {}", method, e)))
    }
}

async fn status_error(url: String, resp: Response) -> A2aError {
    let status = resp.status().as_u16();
    let body: String = resp
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(500)
        .collect();
    A2aError::Status { url, status, body }
}

#[async_trait]
impl AgentTransport for A2aClient {
    async fn send_message(&self, message: Message) -> Result<ResponseEnvelope, A2aError> {
        A2aClient::send_message(self, message).await
    }

    async fn get_task(&self, task_id: &str) -> Result<Task, A2aError> {
        A2aClient::get_task(self, task_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    /// One-shot HTTP stub: answers each accepted connection with the next
    /// canned response and returns the raw requests it saw
    async fn stub_agent(responses: Vec<(u16, String)>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                seen.push(read_request(&mut socket).await);
                let reply = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    if status == 200 { "OK" } else { "Error" },
                    body.len(),
                    body
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
            seen
        });

        (format!("http://{}", addr), handle)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let len = headers
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn rpc_result(result: Value) -> String {
        serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": result}).to_string()
    }

    fn client_for(url: &str, token: Option<&str>) -> A2aClient {
        let mut agent = AgentConfig::new("policy_agent", url);
        agent.token = token.map(str::to_string);
        A2aClient::new(agent, &HttpConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_send_message_direct_answer() {
        let (url, server) = stub_agent(vec![(
            200,
            rpc_result(serde_json::json!({
                "kind": "message",
                "messageId": "resp-1",
                "role": "agent",
                "parts": [{"kind": "text", "text": "Therapy is covered after the deductible."}]
            })),
        )])
        .await;

        let client = client_for(&url, Some("t0k"));
        let envelope = client
            .send_message(new_text_message(Role::User, "Is therapy covered?"))
            .await
            .unwrap();

        match envelope {
            ResponseEnvelope::Message(m) => assert_eq!(m.message_id, "resp-1"),
            other => panic!("expected message, got {:?}", other),
        }

        let requests = server.await.unwrap();
        let raw = requests[0].to_lowercase();
        assert!(raw.starts_with("post "));
        assert!(raw.contains("authorization: bearer t0k"));
        assert!(raw.contains("\"method\":\"message/send\""));
        assert!(raw.contains("is therapy covered?"));
    }

    #[tokio::test]
    async fn test_get_task() {
        let (url, server) = stub_agent(vec![(
            200,
            rpc_result(serde_json::json!({
                "kind": "task",
                "id": "task-9",
                "status": {"state": "submitted"}
            })),
        )])
        .await;

        let task = client_for(&url, None).get_task("task-9").await.unwrap();
        assert_eq!(task.id, "task-9");
        assert_eq!(task.status.state, TaskState::Submitted);

        let requests = server.await.unwrap();
        assert!(requests[0].contains("\"method\":\"tasks/get\""));
        assert!(requests[0].contains("\"id\":\"task-9\""));
        assert!(!requests[0].to_lowercase().contains("authorization"));
    }

    #[tokio::test]
    async fn test_rpc_error() {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32001, "message": "Task not found"}
        })
        .to_string();
        let (url, _server) = stub_agent(vec![(200, body)]).await;

        let err = client_for(&url, None).get_task("missing").await.unwrap_err();
        match err {
            A2aError::Rpc { code, message } => {
                assert_eq!(code, -32001);
                assert_eq!(message, "Task not found");
            }
            other => panic!("expected rpc error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let (url, _server) = stub_agent(vec![(500, "{\"detail\":\"boom\"}".to_string())]).await;
        let err = client_for(&url, None).cancel_task("t").await.unwrap_err();
        match err {
            A2aError::Status { status, body, .. } => {
                assert_eq!(status, 500);
                assert!(body.contains("boom"));
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_result_is_decode_error() {
        let body = serde_json::json!({"jsonrpc": "2.0", "id": 1}).to_string();
        let (url, _server) = stub_agent(vec![(200, body)]).await;
        let err = client_for(&url, None).get_task("t").await.unwrap_err();
        assert!(matches!(err, A2aError::Decode(_)));
    }

    #[tokio::test]
    async fn test_agent_card_falls_back_to_legacy_path() {
        let card = serde_json::json!({
            "name": "HealthcareProviderAgent",
            "description": "Finds healthcare providers",
            "url": "http://localhost:8001/",
            "version": "1.0.0",
            "skills": []
        });
        let (url, server) = stub_agent(vec![
            (404, "{}".to_string()),
            (200, card.to_string()),
        ])
        .await;

        let fetched = client_for(&format!("{}/", url), None)
            .fetch_agent_card()
            .await
            .unwrap();
        assert_eq!(fetched.name, "HealthcareProviderAgent");

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("GET /.well-known/agent-card.json"));
        assert!(requests[1].starts_with("GET /.well-known/agent.json"));
    }

    #[tokio::test]
    async fn test_agent_card_not_found_anywhere() {
        let (url, _server) =
            stub_agent(vec![(404, "{}".to_string()), (404, "{}".to_string())]).await;
        let err = client_for(&url, None).fetch_agent_card().await.unwrap_err();
        assert!(matches!(err, A2aError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let client = client_for("http://127.0.0.1:1", None);
        let err = client
            .send_message(new_text_message(Role::User, "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, A2aError::Connect { .. }));
        assert!(err.to_string().contains("Failed to connect"));
    }

    #[test]
    fn test_clone_shares_request_ids() {
        let client = client_for("http://localhost:9999", None);
        let cloned = client.clone();
        client.next_id.fetch_add(5, Ordering::Relaxed);
        assert_eq!(cloned.next_id.load(Ordering::Relaxed), 6);
        assert_eq!(cloned.agent().name, "policy_agent");
    }
}
