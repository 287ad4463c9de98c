use crate::errors::ErrorKind;
use crate::models::{
    CreatePipelineRequest, Pipeline, PipelineRunTicket, PipelineTemplate, ProviderCategory,
    StageId, StepExecution,
};
use crate::providers::stream::StreamOutcome;
use crate::providers::{ResultSource, Sourced, TextStreamer};
use crate::server::api::{ApiEnvelope, HealthResponse, PipelineList, TemplateList};
use crate::workflow::{CancellationToken, SessionSnapshot, StageTransition};
use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Failure reported by the server in its response envelope
#[derive(Debug, Clone, Error)]
#[error("Server error {status}: {message}")]
pub struct ApiError {
    pub status: u16,
    pub kind: Option<ErrorKind>,
    pub message: String,
}

/// Stage registry entry as served by `GET /api/v1/stages`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageInfo {
    pub id: StageId,
    pub title: String,
    pub description: String,
}

#[derive(Serialize)]
struct ExecuteStepPayload<'a> {
    step: &'a str,
    input: Value,
}

#[derive(Serialize)]
struct RunPipelinePayload {
    input: Value,
}

/// HTTP client for a creative hub server
pub struct HubClient {
    base_url: String,
    client: Client,
}

impl HubClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base = base_url.into();
        let base = base.trim_end_matches('/').to_string();
        Self {
            base_url: base,
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Decode the envelope, turning `success: false` into an [`ApiError`]
    async fn read_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<ApiEnvelope<T>> {
        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read server response")?;

        let envelope: ApiEnvelope<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(e).context("Failed to parse server response");
            }
            Err(_) => {
                return Err(ApiError {
                    status: status.as_u16(),
                    kind: None,
                    message: body.trim().to_string(),
                }
                .into())
            }
        };

        if !envelope.success || !status.is_success() {
            return Err(ApiError {
                status: status.as_u16(),
                kind: envelope.error_kind,
                message: envelope
                    .error
                    .or(envelope.message)
                    .unwrap_or_else(|| "request failed".to_string()),
            }
            .into());
        }
        Ok(envelope)
    }

    async fn read_data<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        Self::read_envelope(response)
            .await?
            .data
            .context("Server response carried no data")
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.client.get(self.endpoint(path)).send().await?;
        Self::read_data(response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T> {
        let response = self
            .client
            .post(self.endpoint(path))
            .json(body)
            .send()
            .await?;
        Self::read_data(response).await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("api/v1/health").await
    }

    pub async fn stages(&self) -> Result<Vec<StageInfo>> {
        self.get("api/v1/stages").await
    }

    pub async fn templates(&self) -> Result<Vec<PipelineTemplate>> {
        let list: TemplateList = self.get("api/v1/workflow?action=templates").await?;
        Ok(list.templates)
    }

    pub async fn list_pipelines(&self) -> Result<Vec<Pipeline>> {
        let list: PipelineList = self.get("api/v1/workflow").await?;
        Ok(list.workflows)
    }

    pub async fn create_pipeline(&self, request: &CreatePipelineRequest) -> Result<Pipeline> {
        self.post("api/v1/workflow", request).await
    }

    pub async fn get_pipeline(&self, id: &str) -> Result<Pipeline> {
        self.get(&format!("api/v1/workflow/{}", id)).await
    }

    /// Execute one step, looked up by id or type
    pub async fn execute_step(
        &self,
        id: &str,
        step: &str,
        input: Option<Value>,
    ) -> Result<StepExecution> {
        let payload = ExecuteStepPayload {
            step,
            input: input.unwrap_or_else(|| json!({})),
        };
        self.post(&format!("api/v1/workflow/{}", id), &payload).await
    }

    /// Start a background run of the remaining steps
    pub async fn run_pipeline(&self, id: &str, input: Option<Value>) -> Result<PipelineRunTicket> {
        let payload = RunPipelinePayload {
            input: input.unwrap_or_else(|| json!({})),
        };
        let response = self
            .client
            .put(self.endpoint(&format!("api/v1/workflow/{}", id)))
            .json(&payload)
            .send()
            .await?;
        Self::read_data(response).await
    }

    /// Category-level generation, tagged with where the result came from
    pub async fn generate(&self, category: ProviderCategory, payload: &Value) -> Result<Sourced<Value>> {
        let response = self
            .client
            .post(self.endpoint(&format!("api/v1/{}/generate", category)))
            .json(payload)
            .send()
            .await?;
        let envelope = Self::read_envelope::<Value>(response).await?;
        let value = envelope.data.unwrap_or(Value::Null);
        Ok(match envelope.source {
            Some(ResultSource::Fallback) => Sourced::Fallback {
                value,
                reason: envelope
                    .message
                    .map(|m| m.trim_start_matches("fallback: ").to_string())
                    .unwrap_or_default(),
            },
            _ => Sourced::Live(value),
        })
    }

    /// Stream an optimized prompt, calling `on_chunk` as text arrives
    pub async fn stream_prompt<F>(
        &self,
        prompt: &str,
        timeout: Duration,
        token: &CancellationToken,
        on_chunk: F,
    ) -> Result<StreamOutcome>
    where
        F: FnMut(&str) + Send,
    {
        let streamer = TextStreamer::new(timeout);
        let body = json!({ "type": "optimize", "prompt": prompt });
        let outcome = streamer
            .stream(&self.endpoint("api/v1/prompt/stream"), &body, token, on_chunk)
            .await?;
        Ok(outcome)
    }

    /// Create a session and run its first stage
    pub async fn start_session(&self, seed: &str) -> Result<SessionSnapshot> {
        self.post("api/v1/sessions", &json!({ "seed": seed })).await
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSnapshot>> {
        self.get("api/v1/sessions").await
    }

    pub async fn get_session(&self, id: Uuid) -> Result<SessionSnapshot> {
        self.get(&format!("api/v1/sessions/{}", id)).await
    }

    pub async fn session_history(&self, id: Uuid) -> Result<Vec<StageTransition>> {
        self.get(&format!("api/v1/sessions/{}/history", id)).await
    }

    /// Run a named session action (`confirm`, `retreat`, `reset`, ...)
    pub async fn session_action(&self, id: Uuid, action: &str, body: Value) -> Result<SessionSnapshot> {
        self.post(&format!("api/v1/sessions/{}/{}", id, action), &body)
            .await
    }

    pub async fn confirm(&self, id: Uuid) -> Result<SessionSnapshot> {
        self.session_action(id, "confirm", json!({})).await
    }

    pub async fn advance(&self, id: Uuid) -> Result<SessionSnapshot> {
        self.session_action(id, "advance", json!({})).await
    }

    pub async fn retreat(&self, id: Uuid) -> Result<SessionSnapshot> {
        self.session_action(id, "retreat", json!({})).await
    }

    pub async fn jump_to(&self, id: Uuid, stage: StageId) -> Result<SessionSnapshot> {
        self.session_action(id, "jump", json!({ "stage": stage }))
            .await
    }

    pub async fn modify(&self, id: Uuid, note: &str) -> Result<SessionSnapshot> {
        self.session_action(id, "modify", json!({ "note": note }))
            .await
    }

    pub async fn retry(&self, id: Uuid) -> Result<SessionSnapshot> {
        self.session_action(id, "retry", json!({})).await
    }

    pub async fn cancel(&self, id: Uuid) -> Result<SessionSnapshot> {
        self.session_action(id, "cancel", json!({})).await
    }

    pub async fn reset(&self, id: Uuid) -> Result<SessionSnapshot> {
        self.session_action(id, "reset", json!({})).await
    }

    pub async fn complete(&self, id: Uuid) -> Result<SessionSnapshot> {
        self.session_action(id, "complete", json!({})).await
    }

    pub async fn delete_session(&self, id: Uuid) -> Result<()> {
        let response = self
            .client
            .delete(self.endpoint(&format!("api/v1/sessions/{}", id)))
            .send()
            .await?;
        Self::read_envelope::<Value>(response).await?;
        Ok(())
    }
}

/// Error kind reported by the server, if `error` came from one
pub fn error_kind(error: &anyhow::Error) -> Option<ErrorKind> {
    error.downcast_ref::<ApiError>().and_then(|e| e.kind)
}
