//! `list_doctors` tool: searches the doctor directory by state and city

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::tools::{ToolHandler, json_schema};

const MISSING_CRITERIA: &str = "Search failed. Please provide at least a state or a city.";

/// Filters doctors by location from a JSON directory
///
/// The directory is a JSON object keyed by doctor id (an array is accepted
/// too); every entry carries `address.state` and `address.city`.
pub struct ListDoctorsTool {
    source: String,
    http: Client,
}

impl ListDoctorsTool {
    /// `source` is an http(s) URL or a local file path
    pub fn new(source: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            source: source.into(),
            http,
        })
    }

    async fn load_directory(&self) -> Result<Vec<Value>> {
        let raw: Value = if self.source.starts_with("http://") || self.source.starts_with("https://")
        {
            debug!("Fetching doctor directory from {}", self.source);
            self.http
                .get(&self.source)
                .send()
                .await
                .with_context(|| format!("Failed to fetch doctor directory from {}", self.source))?
                .error_for_status()
                .context("Doctor directory request failed")?
                .json()
                .await
                .context("Failed to parse doctor directory")?
        } else {
            debug!("Reading doctor directory from {}", self.source);
            let content = tokio::fs::read_to_string(&self.source)
                .await
                .with_context(|| format!("Failed to read doctor directory {}", self.source))?;
            serde_json::from_str(&content).context("Failed to parse doctor directory")?
        };

        match raw {
            Value::Object(map) => Ok(map.into_iter().map(|(_, doc)| doc).collect()),
            Value::Array(items) => Ok(items),
            other => Err(anyhow!(
                "Doctor directory must be a JSON object or array, got {}",
                json_kind(&other)
            )),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn address_field<'a>(doc: &'a Value, field: &str) -> &'a str {
    doc.get("address")
        .and_then(|a| a.get(field))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

/// Keep doctors whose address matches every given criterion, ignoring case
/// and surrounding whitespace in the criteria
pub fn filter_doctors(candidates: Vec<Value>, state: Option<&str>, city: Option<&str>) -> Vec<Value> {
    let state = state.map(|s| s.trim().to_uppercase());
    let city = city.map(|c| c.trim().to_lowercase());

    candidates
        .into_iter()
        .filter(|doc| {
            state
                .as_deref()
                .is_none_or(|s| address_field(doc, "state").to_uppercase() == s)
        })
        .filter(|doc| {
            city.as_deref()
                .is_none_or(|c| address_field(doc, "city").to_lowercase() == c)
        })
        .collect()
}

fn non_empty_str<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

#[async_trait]
impl ToolHandler for ListDoctorsTool {
    fn name(&self) -> &str {
        "list_doctors"
    }

    fn description(&self) -> &str {
        "Returns a list of doctors practicing in a specific location. The search is \
         case-insensitive. Provide a two-letter state code (e.g. \"CA\"), a city name \
         (e.g. \"Boston\"), or both. Returns a JSON array of matching doctors."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "state": {
                    "type": "string",
                    "description": "The two-letter state code (e.g., \"CA\" for California)"
                },
                "city": {
                    "type": "string",
                    "description": "The name of the city or town (e.g., \"Boston\")"
                }
            }),
            vec![],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let state = non_empty_str(&input, "state");
        let city = non_empty_str(&input, "city");

        if state.is_none() && city.is_none() {
            return Ok(serde_json::json!({ "error": MISSING_CRITERIA }).to_string());
        }

        let candidates = self.load_directory().await?;
        let total = candidates.len();
        let matches = filter_doctors(candidates, state, city);

        info!(
            "list_doctors state={:?} city={:?}: {} of {} doctors match",
            state,
            city,
            matches.len(),
            total
        );
        Ok(serde_json::to_string(&matches)?)
    }
}
