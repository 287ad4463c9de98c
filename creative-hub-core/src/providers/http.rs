//! Live provider reached over HTTP

use crate::errors::{HubError, HubResult};
use crate::models::AuthScheme;
use crate::providers::registry::ActiveProvider;
use crate::providers::{GenerationProvider, GenerationRequest};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Calls `POST {base_url}/{category}/generate` with the provider's auth headers
pub struct HttpProvider {
    name: String,
    base_url: String,
    auth: AuthScheme,
    api_key: String,
    timeout: Duration,
    client: Client,
}

impl HttpProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        auth: AuthScheme,
        api_key: impl Into<String>,
        timeout: Duration,
        client: Client,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            api_key: api_key.into(),
            timeout,
            client,
        }
    }

    pub fn from_active(active: &ActiveProvider, timeout: Duration, client: Client) -> Self {
        Self::new(
            active.definition.id,
            active.base_url(),
            active.definition.auth,
            active.credential.api_key.clone(),
            timeout,
            client,
        )
    }

    fn endpoint(&self, request: &GenerationRequest) -> String {
        format!("{}/{}/generate", self.base_url, request.category)
    }
}

/// Unwrap `{success, data}` envelopes; other JSON bodies are returned as-is
fn unwrap_envelope(body: Value) -> HubResult<Value> {
    match body.get("success").and_then(Value::as_bool) {
        Some(true) => Ok(body.get("data").cloned().unwrap_or(Value::Null)),
        Some(false) => {
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("provider reported failure");
            Err(HubError::Upstream(message.to_string()))
        }
        None => Ok(body),
    }
}

#[async_trait]
impl GenerationProvider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerationRequest) -> HubResult<Value> {
        let mut builder = self
            .client
            .post(self.endpoint(request))
            .timeout(self.timeout)
            .json(request);
        for (header, value) in self.auth.headers(&self.api_key) {
            builder = builder.header(header, value);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                HubError::Timeout(self.timeout.as_millis() as u64)
            } else {
                HubError::Upstream(format!("{} request failed: {}", self.name, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HubError::Upstream(format!(
                "{} returned HTTP {}: {}",
                self.name,
                status.as_u16(),
                body.trim()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| HubError::Upstream(format!("{} sent a malformed body: {}", self.name, e)))?;
        unwrap_envelope(body)
    }
}
