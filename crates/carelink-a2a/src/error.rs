use thiserror::Error;

/// Failures talking to a remote agent
#[derive(Debug, Error)]
pub enum A2aError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Failed to connect to agent at {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Agent at {url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Agent returned JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed agent response: {0}")]
    Decode(String),
}
